use crate::error::{Error, Result};

/// Parameters of a 32-bit multiplicative hash.
///
/// The digest starts at `initial_value` and every input byte `b` updates it as
/// `digest = digest * multiplier + b (mod 2^32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParameters {
    pub initial_value: u32,
    pub multiplier: u32,
}

/// Inverse of `m` modulo 2^32, if there is one.
///
/// Only odd values are units mod 2^32. Newton's iteration doubles the number of correct low bits
/// each round, and an odd `m` is already its own inverse mod 8, so four rounds reach 48 bits.
pub fn modular_inverse(m: u32) -> Option<u32> {
    if m % 2 == 0 {
        return None;
    }

    let mut inverse = m;
    for _ in 0..4 {
        inverse = inverse.wrapping_mul(2u32.wrapping_sub(m.wrapping_mul(inverse)));
    }
    Some(inverse)
}

/// A multiplicative hash together with the inverse of its multiplier
///
/// Both are fixed at construction. The inverse lets the hash recurrence be walked backwards over a
/// suffix, which is what the meet-in-the-middle search is built on.
#[derive(Debug, Clone, Copy)]
pub struct MultiplicativeHash {
    params: HashParameters,
    inverse_multiplier: u32,
}

impl MultiplicativeHash {
    pub fn new(params: HashParameters) -> Result<Self> {
        let inverse_multiplier = modular_inverse(params.multiplier).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "multiplier {} is even and has no inverse mod 2^32",
                params.multiplier
            ))
        })?;

        Ok(MultiplicativeHash { params, inverse_multiplier })
    }

    pub fn params(&self) -> HashParameters {
        self.params
    }

    pub fn inverse_multiplier(&self) -> u32 {
        self.inverse_multiplier
    }

    /// The real hash function. An empty input hashes to the initial value.
    pub fn forward_hash(&self, bytes: &[u8]) -> u32 {
        bytes.iter().fold(self.params.initial_value, |digest, &b| {
            digest.wrapping_mul(self.params.multiplier).wrapping_add(b as u32)
        })
    }

    /// Digest the hash must have reached before `suffix` so that hashing the rest ends on `target`
    ///
    /// Undoes one step of `forward_hash` per suffix byte, last byte first:
    /// `h = (h' - b) * inverse_multiplier (mod 2^32)`. For any prefix,
    /// `forward_hash(prefix ++ suffix) == target` exactly when
    /// `forward_hash(prefix) == backward_partial_hash(suffix, target)`.
    pub fn backward_partial_hash(&self, suffix: &[u8], target: u32) -> u32 {
        suffix.iter().rev().fold(target, |value, &b| {
            value.wrapping_sub(b as u32).wrapping_mul(self.inverse_multiplier)
        })
    }
}
