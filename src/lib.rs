//! Meet-in-the-middle collision generation for 32-bit multiplicative hashes
//!
//! A multiplicative hash starts from an initial value and folds every input byte in as
//! `digest = digest * multiplier + byte (mod 2^32)`. When the multiplier is odd each step can be
//! undone, so the backward hashes of all short suffixes can be tabulated for a target digest. Random
//! prefixes whose forward hash lands in that table complete to inputs hashing to the target.

pub mod cancel;
pub mod error;
pub mod format;
pub mod hash;
pub mod search;
pub mod sink;
pub mod table;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use format::OutputFormat;
pub use hash::{modular_inverse, HashParameters, MultiplicativeHash};
pub use search::{SearchConfig, SearchReport, Searcher};
pub use sink::{CollisionSink, ProgressObserver, WriterSink};
pub use table::PrecomputationTable;
