//! Cryptographically secure randomness for salts and nonces.

use crate::error::{ErrorKind, PipelineError, PipelineResult};

/// Supplier of cryptographically secure random bytes.
///
/// Implementations must be backed by an operating-system-grade generator
/// and must fail with [`ErrorKind::RandomSourceUnavailable`] instead of
/// degrading to a weaker source.
pub trait RandomSource: Send + Sync {
    /// Fill `buf` entirely with random bytes.
    fn fill(&self, buf: &mut [u8]) -> PipelineResult<()>;

    /// Return `n` fresh random bytes.
    fn random_bytes(&self, n: usize) -> PipelineResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }
}

/// The operating system generator (`getrandom`).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> PipelineResult<()> {
        getrandom::fill(buf).map_err(|e| {
            PipelineError::new(
                ErrorKind::RandomSourceUnavailable,
                format!("OS random generator unavailable: {e}"),
            )
        })
    }
}
