//! Multi-stage ("divided") convolution for long impulses at low latency.
//!
//! The impulse is split into consecutive segments of growing block size. The
//! head of the impulse runs on the smallest (or brute-force) stage, so the
//! engine's latency is that of the first stage; later segments run on larger
//! FFTs whose extra latency is hidden by their distance from the impulse start.
//!
//! ```text
//! impulse  |b|--c--|----2c----|--------4c--------|-------- ... rest
//! stage     0   1       2              3                 last
//! ```
//!
//! Every stage sees the same input. Stage `i` is fed `lead_in` samples of
//! leading silence after each configure/reset so that its output lines up with
//! the first stage: `lead_in = offset + latency - chunk`, where `chunk` is the
//! stage's partition size. Because each stage starts at least one partition
//! into the impulse, the lead-in is never negative.

use crate::convolver::Convolver;
use crate::direct::{DirectEngine, FIFO_HEADROOM, MAX_FFT_SIZE, MIN_FFT_SIZE};
use crate::error::{ConvolutionError, Result};
use crate::fifo::SampleFifo;
use crate::{ImpulseStore, Sample};

/// Smallest partition size of any FFT stage, and the brute-force stage size
/// used when the caller block size is unknown.
pub const MIN_CHUNK: usize = MIN_FFT_SIZE;

/// Layout of one stage of a partitioned engine.
///
/// Offsets are relative to the first impulse sample the engine was configured
/// with (its `impulse_offset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    /// First impulse sample covered by the stage.
    pub offset: usize,
    /// Number of impulse samples covered.
    pub len: usize,
    /// FFT size, or 0 for brute force.
    pub block_size: usize,
    /// The stage's own latency (`block_size / 2`).
    pub latency: usize,
    /// Leading silence fed to the stage after configure/reset.
    pub lead_in: usize,
}

impl StagePlan {
    /// Returns `true` for a time-domain stage.
    pub fn is_brute_force(&self) -> bool {
        self.block_size == 0
    }

    /// One past the last impulse sample covered.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Largest power of two not above `n` (`n > 0`).
fn prev_power_of_two(n: usize) -> usize {
    1 << (usize::BITS - 1 - n.leading_zeros())
}

/// Resolves a caller maximum FFT size: 0 selects [`MAX_FFT_SIZE`], anything
/// else is rounded up to a power of two of at least `2 * MIN_CHUNK`.
pub(crate) fn resolve_max_fft(max_fft_size: usize) -> usize {
    if max_fft_size == 0 {
        MAX_FFT_SIZE
    } else {
        max_fft_size
            .min(1 << 30)
            .next_power_of_two()
            .max(2 * MIN_CHUNK)
    }
}

/// Splits `len` impulse samples into stages.
///
/// With `allowed_latency >= MIN_CHUNK` the first stage is an FFT stage whose
/// partition is the largest power of two not above `allowed_latency`.
/// Otherwise the first stage is brute force with zero latency, sized to the
/// caller block (`known_block_size` rounded down to a power of two, at least
/// [`MIN_CHUNK`]); it takes the whole impulse when that is at most twice its size.
///
/// Each following stage doubles the partition size and covers two partitions,
/// until partitions reach `max_fft_size / 2` or the remainder fits in three
/// partitions, at which point one stage takes everything left.
pub fn plan_partitions(
    len: usize,
    max_fft_size: usize,
    known_block_size: usize,
    allowed_latency: usize,
) -> Vec<StagePlan> {
    let mut plans = Vec::new();
    if len == 0 {
        return plans;
    }

    let cap = resolve_max_fft(max_fft_size) / 2;
    let (mut offset, mut chunk, latency) = if allowed_latency >= MIN_CHUNK {
        let first = prev_power_of_two(allowed_latency).min(cap);
        (0, first, first)
    } else {
        let chunk = prev_power_of_two(known_block_size.max(MIN_CHUNK)).min(cap);
        let take = if len <= 2 * chunk { len } else { chunk };
        plans.push(StagePlan {
            offset: 0,
            len: take,
            block_size: 0,
            latency: 0,
            lead_in: 0,
        });
        (take, chunk, 0)
    };

    while offset < len {
        let remaining = len - offset;
        let take = if remaining <= 3 * chunk || chunk >= cap {
            remaining
        } else {
            2 * chunk
        };

        debug_assert!(offset + latency >= chunk, "stage starts inside its own latency");
        plans.push(StagePlan {
            offset,
            len: take,
            block_size: 2 * chunk,
            latency: chunk,
            lead_in: offset + latency - chunk,
        });

        offset += take;
        chunk = (2 * chunk).min(cap);
    }

    plans
}

/// Convolver that divides the impulse across several [`DirectEngine`] stages.
///
/// # Example
///
/// ```rust
/// use convolvo_core::{CompositeEngine, Convolver, ImpulseStore};
///
/// let impulse = ImpulseStore::mono(vec![0.01; 48_000]);
/// let mut engine = CompositeEngine::new();
/// let latency = engine.set_impulse(&impulse, 0, 64, 0, 0, 0).unwrap();
/// assert_eq!(latency, 0);
/// assert!(engine.stages().len() > 2);
///
/// let block = vec![0.5; 64];
/// engine.add(&[&block], 64);
/// assert_eq!(engine.avail(64), 64);
/// engine.advance(64);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompositeEngine {
    stages: Vec<DirectEngine>,
    plans: Vec<StagePlan>,
    impulse_len: usize,
    latency: usize,
    /// Stages still need their lead-in silence.
    need_prime: bool,
    num_channels: usize,
    /// Mixed output, used when there is more than one stage.
    output: Vec<SampleFifo<Sample>>,
}

impl CompositeEngine {
    /// Creates an unconfigured engine that passes silence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the engine.
    ///
    /// # Arguments
    ///
    /// * `max_fft_size` - Largest FFT any stage may use; 0 means [`MAX_FFT_SIZE`].
    /// * `known_block_size` - Typical samples per `add` call; 0 if unknown.
    /// * `max_len` - Impulse length limit; 0 means up to the end.
    /// * `impulse_offset` - First impulse sample to use.
    /// * `allowed_latency` - Latency the caller accepts; below [`MIN_CHUNK`]
    ///   the engine runs with zero latency.
    ///
    /// Returns the engine latency. On error the previous configuration stays.
    pub fn set_impulse(
        &mut self,
        impulse: &ImpulseStore<'_>,
        max_fft_size: usize,
        known_block_size: usize,
        max_len: usize,
        impulse_offset: usize,
        allowed_latency: usize,
    ) -> Result<usize> {
        if impulse.num_channels() == 0 {
            return Err(ConvolutionError::NoChannels);
        }
        let available = impulse.len().saturating_sub(impulse_offset);
        let len = if max_len > 0 {
            available.min(max_len)
        } else {
            available
        };
        if len == 0 {
            return Err(ConvolutionError::EmptyImpulse {
                offset: impulse_offset,
                length: impulse.len(),
            });
        }

        let plans = plan_partitions(len, max_fft_size, known_block_size, allowed_latency);
        let mut stages = Vec::new();
        stages.try_reserve_exact(plans.len())?;
        for plan in &plans {
            let mut stage = DirectEngine::new();
            stage.set_impulse(
                impulse,
                plan.block_size,
                impulse_offset + plan.offset,
                plan.len,
                plan.is_brute_force(),
            )?;
            stages.push(stage);
        }

        #[cfg(feature = "tracing")]
        for (index, plan) in plans.iter().enumerate() {
            tracing::debug!(
                stage = index,
                offset = plan.offset,
                len = plan.len,
                block_size = plan.block_size,
                lead_in = plan.lead_in,
                "composite stage"
            );
        }

        self.latency = plans.first().map_or(0, |plan| plan.latency);
        self.stages = stages;
        self.plans = plans;
        self.impulse_len = len;
        self.need_prime = true;
        let capacity = self.output_capacity();
        for fifo in &mut self.output {
            fifo.clear();
            fifo.reserve(capacity);
        }

        Ok(self.latency)
    }

    /// Partition layout of the configured impulse.
    pub fn stages(&self) -> &[StagePlan] {
        &self.plans
    }

    /// Number of impulse samples the engine convolves with.
    pub fn impulse_len(&self) -> usize {
        self.impulse_len
    }

    /// Returns `true` once an impulse has been set.
    pub fn is_configured(&self) -> bool {
        !self.stages.is_empty()
    }

    /// Single-stage engines expose their stage's output directly.
    fn single(&self) -> Option<&DirectEngine> {
        match self.stages.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Mixed output a channel can hold without reallocating.
    fn output_capacity(&self) -> usize {
        let largest = self.plans.iter().map(|plan| plan.block_size).max().unwrap_or(0);
        2 * largest + FIFO_HEADROOM
    }

    fn ready(&self) -> usize {
        self.output
            .iter()
            .take(self.num_channels)
            .map(SampleFifo::available)
            .min()
            .unwrap_or(0)
    }
}

impl Convolver for CompositeEngine {
    fn latency(&self) -> usize {
        self.latency
    }

    fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
        for fifo in &mut self.output {
            fifo.clear();
        }
        self.need_prime = true;
    }

    fn add(&mut self, input: &[&[Sample]], len: usize) {
        let channels = input.len();
        self.num_channels = channels;
        if self.output.len() < channels {
            let capacity = self.output_capacity();
            self.output
                .resize_with(channels, || SampleFifo::with_capacity(capacity));
        }

        if self.stages.is_empty() {
            for fifo in &mut self.output[..channels] {
                fifo.push_silence(len);
            }
            return;
        }

        if self.need_prime {
            for (stage, plan) in self.stages.iter_mut().zip(&self.plans) {
                if plan.lead_in > 0 {
                    stage.add_silence(plan.lead_in, channels);
                }
            }
            self.need_prime = false;
        }

        for stage in &mut self.stages {
            stage.add(input, len);
        }
    }

    fn avail(&mut self, want: usize) -> usize {
        if let [only] = self.stages.as_mut_slice() {
            return only.avail(want);
        }

        let ready = self.ready();
        if self.stages.is_empty() || ready >= want {
            return ready;
        }

        let need = want - ready;
        let mixable = self
            .stages
            .iter_mut()
            .map(|stage| stage.avail(need))
            .min()
            .unwrap_or(0);
        if mixable == 0 {
            return ready;
        }

        let channels = self.num_channels;
        let Self { stages, output, .. } = self;
        for (ch, fifo) in output.iter_mut().take(channels).enumerate() {
            fifo.push_with(mixable, |i| {
                stages
                    .iter()
                    .map(|stage| stage.output_channel(ch).get(i).copied().unwrap_or(0.0))
                    .sum()
            });
        }
        for stage in stages.iter_mut() {
            stage.advance(mixable);
        }

        ready + mixable
    }

    fn num_channels(&self) -> usize {
        self.single()
            .map_or(self.num_channels, DirectEngine::num_channels)
    }

    fn output_channel(&self, channel: usize) -> &[Sample] {
        if let Some(only) = self.single() {
            return only.output_channel(channel);
        }
        if channel >= self.num_channels {
            return &[];
        }
        self.output.get(channel).map_or(&[][..], SampleFifo::peek)
    }

    fn advance(&mut self, len: usize) {
        if let [only] = self.stages.as_mut_slice() {
            only.advance(len);
            return;
        }
        for fifo in self.output.iter_mut().take(self.num_channels) {
            fifo.advance(len);
        }
    }
}
