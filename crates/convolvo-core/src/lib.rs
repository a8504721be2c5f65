//! Convolvo Core - streaming partitioned convolution
//!
//! This crate convolves multichannel audio with arbitrarily long impulse
//! responses in real time. Output matches direct time-domain convolution, while
//! the work per sample stays close to that of one large FFT convolution.
//!
//! # Engines
//!
//! All engines implement [`Convolver`]: queue input with `add`, ask how much is
//! ready with `avail`, read it zero-copy with `get`, release it with `advance`.
//!
//! - [`DirectEngine`] - One segment of the impulse at one block size, by brute
//!   force or uniformly partitioned FFT. Latency is half the FFT size.
//! - [`CompositeEngine`] - Several direct stages of growing block size. The
//!   first stage sets the latency, down to zero.
//! - [`ThreadedEngine`] - A composite engine whose largest stage runs on a
//!   background worker (`thread` feature).
//!
//! # Supporting Types
//!
//! - [`ImpulseStore`] - Owned or borrowed per-channel impulse data
//! - [`SampleFifo`] - Contiguous FIFO used for engine input and output
//! - [`Fft`] - Real FFT plans with preallocated scratch
//!
//! # Example
//!
//! ```rust
//! use convolvo_core::{CompositeEngine, Convolver, ImpulseStore};
//!
//! // A short stereo room: direct sound plus one reflection per side
//! let mut left = vec![0.0; 4800];
//! let mut right = vec![0.0; 4800];
//! left[0] = 1.0;
//! right[0] = 1.0;
//! left[1200] = 0.4;
//! right[1700] = 0.4;
//! let impulse = ImpulseStore::from_channels(vec![left, right]);
//!
//! let mut engine = CompositeEngine::new();
//! let latency = engine.set_impulse(&impulse, 0, 256, 0, 0, 0).unwrap();
//! assert_eq!(latency, 0);
//!
//! let block = vec![0.1; 256];
//! engine.add(&[&block, &block], 256);
//! let ready = engine.avail(256);
//! let out = engine.get();
//! assert_eq!(out.channel(0)[..ready].len(), 256);
//! engine.advance(ready);
//! ```
//!
//! # Features
//!
//! - `thread` (default) - [`ThreadedEngine`], using `parking_lot` for the handoff
//! - `full-precision-impulse` - Keep impulse spectra in `f64` instead of `f32`
//! - `tracing` - Configuration and worker lifecycle events via `tracing`
//!
//! # Design Principles
//!
//! - **Real-time safe**: `add`/`avail`/`get`/`advance` never fail, and buffers
//!   are reserved at configuration so steady-state calls do not allocate
//! - **Transactional configuration**: a failed `set_impulse` leaves the previous
//!   impulse in place
//! - **Silence aware**: all-zero input blocks and impulse partitions are skipped

pub mod composite;
pub mod convolver;
pub mod direct;
pub mod error;
pub mod fft;
pub mod fifo;
pub mod impulse;
#[cfg(feature = "thread")]
pub mod threaded;

/// Caller-facing audio sample.
pub type Sample = f32;

/// Transform precision.
pub type FftReal = f64;

/// Storage precision of impulse spectra.
#[cfg(not(feature = "full-precision-impulse"))]
pub type ImpulseReal = f32;

/// Storage precision of impulse spectra.
#[cfg(feature = "full-precision-impulse")]
pub type ImpulseReal = f64;

// Re-export main types at crate root
pub use composite::{CompositeEngine, MIN_CHUNK, StagePlan, plan_partitions};
pub use convolver::{Convolver, Output, drain_into};
pub use direct::{BRUTE_FORCE_MAX_TAPS, DirectEngine, MAX_FFT_SIZE, MIN_FFT_SIZE};
pub use error::{ConvolutionError, Result};
pub use fft::Fft;
pub use fifo::SampleFifo;
pub use impulse::{DEFAULT_SAMPLE_RATE, ImpulseStore};
#[cfg(feature = "thread")]
pub use threaded::{MAX_THREAD_CHANNELS, ThreadedEngine};
