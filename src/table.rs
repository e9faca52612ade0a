use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash::MultiplicativeHash;
use crate::sink::ProgressObserver;

/// Upper bound on the number of suffixes enumerated, in bits
pub const MAX_TABLE_BITS: u32 = 24;

/// Number of progress updates emitted over a full build
const PROGRESS_STEPS: u32 = 1000;

/// Number of `suffix_size`-byte suffixes the table enumerates: `min(2^24, 2^(8 * suffix_size))`
pub fn suffix_space(suffix_size: usize) -> u32 {
    let bits = (suffix_size as u64).saturating_mul(8).min(MAX_TABLE_BITS as u64);
    1 << bits
}

/// Writes `index` big-endian into `buf`, left-padding with zeros
pub fn encode_suffix_into(index: u32, buf: &mut [u8]) {
    let bytes = index.to_be_bytes();
    let len = buf.len();
    for (k, slot) in buf.iter_mut().enumerate() {
        let from_end = len - 1 - k;
        *slot = if from_end < bytes.len() { bytes[bytes.len() - 1 - from_end] } else { 0 };
    }
}

pub fn encode_suffix(index: u32, suffix_size: usize) -> Vec<u8> {
    let mut suffix = vec![0u8; suffix_size];
    encode_suffix_into(index, &mut suffix);
    suffix
}

/// Backward partial hashes of every enumerated suffix, anchored at one target digest
///
/// Maps each backward hash to the index of the suffix that produced it; the suffix bytes are
/// re-encoded on lookup rather than stored. When two suffixes share a key the one enumerated later
/// wins, for the sequential and the parallel build alike.
#[derive(Debug, Clone)]
pub struct PrecomputationTable {
    target: u32,
    suffix_size: usize,
    table_size: u32,
    entries: HashMap<u32, u32>,
}

impl PrecomputationTable {
    /// Builds the table on the current thread.
    pub fn build(
        hash: &MultiplicativeHash,
        target: u32,
        suffix_size: usize,
        observer: &mut dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<Self> {
        Self::build_chunked(target, suffix_size, observer, cancel, |start, end, keys| {
            let mut suffix = vec![0u8; suffix_size];
            keys.extend((start..end).map(|index| {
                encode_suffix_into(index, &mut suffix);
                hash.backward_partial_hash(&suffix, target)
            }));
        })
    }

    /// Builds the table with the rayon thread pool.
    ///
    /// Each chunk of suffix indices is hashed in parallel and then inserted in index order, so the
    /// result is identical to `build`.
    pub fn par_build(
        hash: &MultiplicativeHash,
        target: u32,
        suffix_size: usize,
        observer: &mut dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<Self> {
        Self::build_chunked(target, suffix_size, observer, cancel, |start, end, keys| {
            (start..end)
                .into_par_iter()
                .map_init(
                    || vec![0u8; suffix_size],
                    |suffix, index| {
                        encode_suffix_into(index, suffix);
                        hash.backward_partial_hash(suffix, target)
                    },
                )
                .collect_into_vec(keys);
        })
    }

    fn build_chunked<F>(
        target: u32,
        suffix_size: usize,
        observer: &mut dyn ProgressObserver,
        cancel: &CancelToken,
        hash_chunk: F,
    ) -> Result<Self>
    where
        F: Fn(u32, u32, &mut Vec<u32>),
    {
        if suffix_size == 0 {
            return Err(Error::InvalidArgument("suffix size must be positive".into()));
        }
        if suffix_size > 3 {
            warn!(
                "suffix size {} would need a table of 2^{} entries, enumerating only the first 2^{}",
                suffix_size,
                suffix_size * 8,
                MAX_TABLE_BITS
            );
        }

        let table_size = suffix_space(suffix_size);
        info!(
            "Building precomputation table with {} entries for target {}",
            table_size, target
        );

        // Pre-allocate so the map never rehashes while filling
        let mut entries: HashMap<u32, u32> = HashMap::with_capacity(table_size as usize);
        let chunk = (table_size / PROGRESS_STEPS).max(1);
        let mut keys: Vec<u32> = Vec::with_capacity(chunk as usize);

        let start_time = Instant::now();
        let mut start = 0u32;
        while start < table_size {
            cancel.check()?;

            let end = start.saturating_add(chunk).min(table_size);
            keys.clear();
            hash_chunk(start, end, &mut keys);
            for (index, key) in (start..end).zip(keys.iter()) {
                entries.insert(*key, index);
            }

            observer.precompute_progress(end as u64, table_size as u64);
            start = end;
        }

        let seconds = start_time.elapsed().as_secs_f32();
        info!(
            "Done precomputing {} entries ({} distinct keys) in {:.2} seconds, {:.0} entries / s",
            table_size,
            entries.len(),
            seconds,
            table_size as f32 / seconds
        );

        Ok(PrecomputationTable { target, suffix_size, table_size, entries })
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn suffix_size(&self) -> usize {
        self.suffix_size
    }

    /// Number of suffixes enumerated while building
    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    /// Number of distinct backward hashes stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().cloned()
    }

    pub fn suffix_index(&self, key: u32) -> Option<u32> {
        self.entries.get(&key).cloned()
    }

    /// Suffix that walks the hash from `key` to the target, if one was enumerated
    pub fn get(&self, key: u32) -> Option<Vec<u8>> {
        self.suffix_index(key).map(|index| encode_suffix(index, self.suffix_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashParameters;
    use std::collections::HashSet;

    fn default_hash() -> MultiplicativeHash {
        MultiplicativeHash::new(HashParameters { initial_value: 5387, multiplier: 31 }).unwrap()
    }

    struct Recorder(Vec<(u64, u64)>);

    impl ProgressObserver for Recorder {
        fn precompute_progress(&mut self, current: u64, total: u64) {
            self.0.push((current, total));
        }
    }

    #[test]
    fn test_suffix_space() {
        assert_eq!(suffix_space(1), 1 << 8);
        assert_eq!(suffix_space(2), 1 << 16);
        assert_eq!(suffix_space(3), 1 << 24);
        assert_eq!(suffix_space(4), 1 << 24);
        assert_eq!(suffix_space(64), 1 << 24);
        assert_eq!(suffix_space(usize::MAX), 1 << 24);
    }

    #[test]
    fn test_encode_suffix() {
        assert_eq!(encode_suffix(0x01, 1), vec![0x01]);
        assert_eq!(encode_suffix(0x0102, 2), vec![0x01, 0x02]);
        assert_eq!(encode_suffix(0x0102, 3), vec![0x00, 0x01, 0x02]);
        assert_eq!(encode_suffix(0x00ab_cdef, 5), vec![0x00, 0x00, 0xab, 0xcd, 0xef]);
    }

    #[test]
    fn test_entries_lead_back_to_target() {
        let hash = default_hash();
        let target = 123456789;
        let table = PrecomputationTable::build(&hash, target, 2, &mut (), &CancelToken::new()).unwrap();

        assert_eq!(table.table_size(), 1 << 16);
        assert!(!table.is_empty());
        for key in table.keys() {
            let suffix = table.get(key).unwrap();
            assert_eq!(suffix.len(), 2);
            assert_eq!(hash.backward_partial_hash(&suffix, target), key);
        }
    }

    #[test]
    fn test_last_write_wins() {
        // With multiplier 1 the backward hash of a suffix only depends on the sum of its bytes, so
        // many suffixes share a key and the highest index for each key must be kept.
        let hash = MultiplicativeHash::new(HashParameters { initial_value: 0, multiplier: 1 }).unwrap();
        let target = 1000;
        let table = PrecomputationTable::build(&hash, target, 2, &mut (), &CancelToken::new()).unwrap();

        let mut expected: HashMap<u32, u32> = HashMap::new();
        for index in 0..suffix_space(2) {
            expected.insert(hash.backward_partial_hash(&encode_suffix(index, 2), target), index);
        }
        assert_eq!(table.len(), expected.len());
        assert_eq!(table.len(), 511);
        for (key, index) in expected {
            assert_eq!(table.suffix_index(key), Some(index));
        }
        // Byte sum 0 only comes from [0, 0]; byte sum 1 last comes from [1, 0]
        assert_eq!(table.get(target), Some(vec![0x00, 0x00]));
        assert_eq!(table.get(target - 1), Some(vec![0x01, 0x00]));
    }

    #[test]
    fn test_build_is_deterministic() {
        let hash = default_hash();
        let first = PrecomputationTable::build(&hash, 42, 2, &mut (), &CancelToken::new()).unwrap();
        let second = PrecomputationTable::build(&hash, 42, 2, &mut (), &CancelToken::new()).unwrap();
        let parallel = PrecomputationTable::par_build(&hash, 42, 2, &mut (), &CancelToken::new()).unwrap();

        let keys: HashSet<u32> = first.keys().collect();
        assert_eq!(keys, second.keys().collect::<HashSet<u32>>());
        assert_eq!(keys, parallel.keys().collect::<HashSet<u32>>());
        for key in keys {
            assert_eq!(first.suffix_index(key), second.suffix_index(key));
            assert_eq!(first.suffix_index(key), parallel.suffix_index(key));
        }
    }

    #[test]
    fn test_parallel_build_keeps_last_write() {
        let hash = MultiplicativeHash::new(HashParameters { initial_value: 0, multiplier: 1 }).unwrap();
        let sequential = PrecomputationTable::build(&hash, 7, 2, &mut (), &CancelToken::new()).unwrap();
        let parallel = PrecomputationTable::par_build(&hash, 7, 2, &mut (), &CancelToken::new()).unwrap();
        assert_eq!(sequential.len(), parallel.len());
        for key in sequential.keys() {
            assert_eq!(sequential.suffix_index(key), parallel.suffix_index(key));
        }
    }

    #[test]
    fn test_progress_reports_reach_total() {
        let hash = default_hash();
        let mut recorder = Recorder(Vec::new());
        PrecomputationTable::build(&hash, 0, 2, &mut recorder, &CancelToken::new()).unwrap();

        let total = 1u64 << 16;
        assert!(recorder.0.len() >= 1000);
        assert!(recorder.0.iter().all(|&(_, t)| t == total));
        assert!(recorder.0.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(recorder.0.last(), Some(&(total, total)));
    }

    #[test]
    fn test_small_table_progress() {
        let hash = default_hash();
        let mut recorder = Recorder(Vec::new());
        let table = PrecomputationTable::build(&hash, 0, 1, &mut recorder, &CancelToken::new()).unwrap();
        assert_eq!(table.table_size(), 256);
        assert_eq!(recorder.0.len(), 256);
    }

    #[test]
    fn test_zero_suffix_rejected() {
        let hash = default_hash();
        let result = PrecomputationTable::build(&hash, 0, 0, &mut (), &CancelToken::new());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_cancelled_build_is_interrupted() {
        let hash = default_hash();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = PrecomputationTable::par_build(&hash, 0, 2, &mut (), &cancel);
        assert!(matches!(result, Err(Error::Interrupted)));
    }
}
