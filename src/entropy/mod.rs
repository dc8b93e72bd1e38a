//! Entropy capability and its quality battery.
//!
//! The probe core never draws from here; the battery runs before the link
//! comes up and contributes to the final verdict only.

mod battery;

use std::fmt;

use log::debug;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub use battery::{BatteryReport, BatteryStats, EntropyBattery, StageReport};

/// A source that hands out random bytes and accepts extra seed material.
pub trait EntropySource {
    /// Fill `buf` with random bytes.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError>;

    /// Fold `seed` into the source, crediting `estimated_bits` of entropy.
    fn mix(&mut self, seed: &[u8], estimated_bits: usize) -> Result<(), EntropyError>;
}

/// Errors from an entropy source.
#[derive(Debug)]
pub enum EntropyError {
    /// The platform generator failed.
    Source(rand_core::Error),
    /// No seed material supplied.
    EmptySeed,
    /// More bits credited than the seed holds.
    OverEstimate { bits: usize, max: usize },
}

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "platform RNG failed: {}", e),
            Self::EmptySeed => write!(f, "empty seed"),
            Self::OverEstimate { bits, max } => {
                write!(f, "{} bits credited, seed holds at most {}", bits, max)
            }
        }
    }
}

impl std::error::Error for EntropyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            _ => None,
        }
    }
}

/// Platform RNG output whitened through a SHA-256 pool.
///
/// Each 32-byte output block is `SHA-256(pool || counter || os_block)`.
/// The pool is ratcheted after every fill, so earlier outputs cannot be
/// recomputed from a later pool state.
pub struct EntropyPool {
    pool: Zeroizing<[u8; 32]>,
    counter: u64,
    credited_bits: usize,
}

impl EntropyPool {
    /// Seed a new pool from the platform generator.
    pub fn new() -> Result<Self, EntropyError> {
        let mut pool = Zeroizing::new([0u8; 32]);
        OsRng.try_fill_bytes(&mut pool[..]).map_err(EntropyError::Source)?;
        Ok(Self {
            pool,
            counter: 0,
            credited_bits: 0,
        })
    }

    /// Bits credited through [`mix`](EntropySource::mix) so far.
    pub fn credited_bits(&self) -> usize {
        self.credited_bits
    }

    fn ratchet(&mut self) {
        let next: [u8; 32] = Sha256::new()
            .chain_update(b"ratchet")
            .chain_update(&self.pool[..])
            .chain_update(self.counter.to_be_bytes())
            .finalize()
            .into();
        *self.pool = next;
    }
}

impl EntropySource for EntropyPool {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
        let mut os_block = Zeroizing::new([0u8; 32]);
        for chunk in buf.chunks_mut(32) {
            OsRng
                .try_fill_bytes(&mut os_block[..])
                .map_err(EntropyError::Source)?;
            let block: [u8; 32] = Sha256::new()
                .chain_update(b"output")
                .chain_update(&self.pool[..])
                .chain_update(self.counter.to_be_bytes())
                .chain_update(&os_block[..])
                .finalize()
                .into();
            chunk.copy_from_slice(&block[..chunk.len()]);
            self.counter = self.counter.wrapping_add(1);
        }
        self.ratchet();
        Ok(())
    }

    fn mix(&mut self, seed: &[u8], estimated_bits: usize) -> Result<(), EntropyError> {
        if seed.is_empty() {
            return Err(EntropyError::EmptySeed);
        }
        let max = seed.len() * 8;
        if estimated_bits > max {
            return Err(EntropyError::OverEstimate {
                bits: estimated_bits,
                max,
            });
        }

        let next: [u8; 32] = Sha256::new()
            .chain_update(b"mix")
            .chain_update(&self.pool[..])
            .chain_update(seed)
            .finalize()
            .into();
        *self.pool = next;
        self.credited_bits = self.credited_bits.saturating_add(estimated_bits);
        debug!("mixed {} seed bytes ({} bits credited)", seed.len(), estimated_bits);
        Ok(())
    }
}
