//! Error types for engine configuration.
//!
//! Only [`set_impulse`](crate::DirectEngine::set_impulse) and friends can fail.
//! The streaming calls (`add`, `avail`, `get`, `advance`) never return errors.

use std::collections::TryReserveError;
use thiserror::Error;

/// Errors that can occur while configuring a convolution engine.
///
/// When configuration fails the engine keeps whatever impulse it had before
/// the call (or stays silent if it was never configured).
#[derive(Debug, Error)]
pub enum ConvolutionError {
    /// The impulse store has no channels.
    #[error("impulse has no channels")]
    NoChannels,

    /// No impulse samples remain after applying the offset and length limit.
    #[error("impulse is empty (offset {offset}, {length} samples available)")]
    EmptyImpulse {
        /// Requested start offset into the impulse.
        offset: usize,
        /// Total impulse length in samples.
        length: usize,
    },

    /// Requested block size cannot be used for partitioning.
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// Transforming an impulse partition failed.
    #[error("FFT failed: {0}")]
    Fft(#[from] realfft::FftError),

    /// Buffer allocation failed while preparing partitions.
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Convenience result type for engine configuration.
pub type Result<T> = std::result::Result<T, ConvolutionError>;

/// Allocates a vector of `len` copies of `value`, reporting failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len)?;
    buffer.resize(len, value);
    Ok(buffer)
}
