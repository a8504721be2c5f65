//! Single-stage convolution engine.
//!
//! [`DirectEngine`] convolves a multichannel stream with one segment of an
//! impulse response, either by brute force (short segments) or by uniformly
//! partitioned FFT convolution with a frequency-domain delay line.
//!
//! # FFT path
//!
//! With a transform of `block_size` points the impulse is cut into partitions
//! of `block_size / 2` samples, each transformed once at configuration time.
//! Input is consumed in blocks of the same size: every block is transformed,
//! multiplied against all partitions (pairing partition `j` with the input
//! block from `j` blocks ago), inverse transformed and overlap-added. Blocks
//! and partitions that are entirely silent are flagged and skipped.
//!
//! | Path | Latency | Cost per sample |
//! |------|---------|-----------------|
//! | Brute force | 0 | `O(len)` |
//! | FFT | `block_size / 2` | `O(log block_size + len / block_size)` |

use rustfft::num_complex::Complex;

use crate::convolver::Convolver;
use crate::error::{ConvolutionError, Result, try_filled};
use crate::fft::{Fft, complex_size, multiply_accumulate, store_spectrum};
use crate::fifo::SampleFifo;
use crate::{FftReal, ImpulseReal, ImpulseStore, Sample};

/// Smallest FFT size chosen automatically.
pub const MIN_FFT_SIZE: usize = 32;

/// Largest FFT size chosen automatically.
pub const MAX_FFT_SIZE: usize = 32768;

/// Segments up to this many samples use brute force when the block size is automatic.
pub const BRUTE_FORCE_MAX_TAPS: usize = 32;

/// Extra FIFO capacity reserved beyond one block, so typical caller chunks
/// never reallocate.
pub(crate) const FIFO_HEADROOM: usize = 4096;

/// Sizes shared by every channel of a configured engine.
#[derive(Debug, Clone, Copy, Default)]
struct Layout {
    /// Input block (partition) size; 0 for brute force.
    chunk: usize,
    /// Complex bins per transformed block.
    bins: usize,
    /// Partitions per impulse channel.
    blocks: usize,
    /// Brute-force taps; 0 on the FFT path.
    taps: usize,
}

impl Layout {
    fn is_brute(&self) -> bool {
        self.chunk == 0
    }
}

/// Impulse data for one impulse channel, prepared for processing.
#[derive(Debug, Clone)]
struct ImpulseChannel {
    /// Time-reversed taps (brute force).
    taps: Vec<FftReal>,
    /// Partition spectra, `blocks * bins`, partition-major (FFT).
    spectra: Vec<Complex<ImpulseReal>>,
    /// Partition is entirely zero.
    silent: Vec<bool>,
}

/// Streaming state of one processing channel.
#[derive(Debug, Clone)]
struct ChannelState {
    input: SampleFifo<Sample>,
    output: SampleFifo<Sample>,
    /// Spectra of recent input blocks, `blocks * bins`, used as a ring.
    history: Vec<Complex<FftReal>>,
    /// Matching ring slot held a silent block.
    history_silent: Vec<bool>,
    /// Second half of the previous inverse transform.
    overlap: Vec<FftReal>,
    /// Ring slot that receives the next input block.
    position: usize,
}

impl ChannelState {
    fn new(layout: Layout) -> Result<Self> {
        let unit = layout.chunk.max(layout.taps);
        let mut state = Self {
            input: SampleFifo::with_capacity(2 * unit + FIFO_HEADROOM),
            output: SampleFifo::with_capacity(2 * unit + FIFO_HEADROOM),
            history: try_filled(layout.blocks * layout.bins, Complex::new(0.0, 0.0))?,
            history_silent: try_filled(layout.blocks, true)?,
            overlap: try_filled(layout.chunk, 0.0)?,
            position: 0,
        };
        state.prime(layout);
        Ok(state)
    }

    /// Returns the channel to silence, with the engine's latency queued as
    /// leading input.
    fn prime(&mut self, layout: Layout) {
        self.input.clear();
        self.output.clear();
        self.history_silent.fill(true);
        self.overlap.fill(0.0);
        self.position = 0;

        if layout.is_brute() {
            // Zero history so the first real sample sees a full window.
            self.input.push_silence(layout.taps.saturating_sub(1));
        } else {
            self.input.push_silence(layout.chunk);
        }
    }
}

/// Single-stage brute-force or uniformly partitioned FFT convolver.
///
/// # Example
///
/// ```rust
/// use convolvo_core::{Convolver, DirectEngine, ImpulseStore};
///
/// let impulse = ImpulseStore::mono(vec![0.5; 300]);
/// let mut engine = DirectEngine::new();
/// let latency = engine.set_impulse(&impulse, 256, 0, 0, false).unwrap();
/// assert_eq!(latency, 128);
///
/// let input = vec![1.0; 128];
/// engine.add(&[&input], input.len());
/// let ready = engine.avail(128);
/// assert!(ready >= 128);
/// engine.advance(ready);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirectEngine {
    impulse_len: usize,
    layout: Layout,
    impulses: Vec<ImpulseChannel>,
    channels: Vec<ChannelState>,
    fft: Option<Fft>,
    /// Real-domain work buffer, `block_size` long.
    time: Vec<FftReal>,
    /// Multiply-accumulate target, `bins` long.
    accum: Vec<Complex<FftReal>>,
}

impl DirectEngine {
    /// Creates an unconfigured engine. Until [`set_impulse`](Self::set_impulse)
    /// succeeds it passes silence with zero latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the engine for a segment of `impulse`.
    ///
    /// # Arguments
    ///
    /// * `block_size` - FFT size (rounded up to a power of two); 0 picks one
    ///   from the segment length, using brute force for very short segments.
    /// * `offset` - First impulse sample of the segment.
    /// * `max_len` - Segment length limit; 0 means up to the end of the impulse.
    /// * `force_brute` - Always convolve in the time domain.
    ///
    /// Returns the latency in samples (`block_size / 2`, or 0 for brute force).
    /// On error the previous configuration is left untouched.
    pub fn set_impulse(
        &mut self,
        impulse: &ImpulseStore<'_>,
        block_size: usize,
        offset: usize,
        max_len: usize,
        force_brute: bool,
    ) -> Result<usize> {
        let num_impulses = impulse.num_channels();
        if num_impulses == 0 {
            return Err(ConvolutionError::NoChannels);
        }

        let available = impulse.len().saturating_sub(offset);
        let len = if max_len > 0 {
            available.min(max_len)
        } else {
            available
        };
        if len == 0 {
            return Err(ConvolutionError::EmptyImpulse {
                offset,
                length: impulse.len(),
            });
        }

        let brute = force_brute || (block_size == 0 && len <= BRUTE_FORCE_MAX_TAPS);
        let fft_size = if brute {
            0
        } else if block_size == 0 {
            auto_fft_size(len)
        } else {
            match block_size.checked_next_power_of_two() {
                Some(size) if size >= 2 => size,
                _ => return Err(ConvolutionError::InvalidBlockSize(block_size)),
            }
        };

        let layout = if brute {
            Layout {
                chunk: 0,
                bins: 0,
                blocks: 0,
                taps: len,
            }
        } else {
            let chunk = fft_size / 2;
            Layout {
                chunk,
                bins: complex_size(fft_size),
                blocks: len.div_ceil(chunk),
                taps: 0,
            }
        };

        let mut fft = (!brute).then(|| Fft::new(fft_size));
        let mut time = try_filled(fft_size, 0.0)?;
        let mut spectrum = try_filled(layout.bins, Complex::new(0.0, 0.0))?;

        let mut impulses = Vec::new();
        impulses.try_reserve_exact(num_impulses)?;
        for ch in 0..num_impulses {
            let segment = &impulse.channel(ch)[offset..offset + len];
            let prepared = match fft.as_mut() {
                None => {
                    let mut taps = try_filled(len, 0.0)?;
                    for (tap, &s) in taps.iter_mut().zip(segment.iter().rev()) {
                        *tap = FftReal::from(s);
                    }
                    ImpulseChannel {
                        taps,
                        spectra: Vec::new(),
                        silent: Vec::new(),
                    }
                }
                Some(fft) => {
                    let mut spectra =
                        try_filled(layout.blocks * layout.bins, Complex::new(0.0, 0.0))?;
                    let mut silent = try_filled(layout.blocks, true)?;

                    for (part, samples) in segment.chunks(layout.chunk).enumerate() {
                        if samples.iter().all(|&s| s == 0.0) {
                            continue;
                        }
                        silent[part] = false;

                        time.fill(0.0);
                        for (t, &s) in time.iter_mut().zip(samples) {
                            *t = FftReal::from(s);
                        }
                        fft.forward(&mut time, &mut spectrum)?;
                        let bins = layout.bins;
                        store_spectrum(&mut spectra[part * bins..(part + 1) * bins], &spectrum);
                    }

                    ImpulseChannel {
                        taps: Vec::new(),
                        spectra,
                        silent,
                    }
                }
            };
            impulses.push(prepared);
        }

        let mut channels = Vec::new();
        channels.try_reserve_exact(num_impulses)?;
        for _ in 0..num_impulses {
            channels.push(ChannelState::new(layout)?);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            offset,
            len,
            fft_size,
            blocks = layout.blocks,
            brute,
            "direct engine configured"
        );

        *self = Self {
            impulse_len: len,
            layout,
            impulses,
            channels,
            fft,
            time,
            accum: spectrum,
        };

        Ok(self.latency())
    }

    /// FFT size in use; 0 when convolving by brute force or unconfigured.
    pub fn block_size(&self) -> usize {
        self.fft.as_ref().map_or(0, Fft::size)
    }

    /// Length of the impulse segment this engine convolves with.
    pub fn impulse_len(&self) -> usize {
        self.impulse_len
    }

    /// Returns `true` if the segment is convolved in the time domain.
    pub fn is_brute_force(&self) -> bool {
        self.is_configured() && self.layout.is_brute()
    }

    /// Returns `true` once an impulse has been set.
    pub fn is_configured(&self) -> bool {
        !self.impulses.is_empty()
    }

    /// Queues `len` samples of silence on `channels` channels.
    ///
    /// Used to delay this engine relative to others sharing the same input.
    pub fn add_silence(&mut self, len: usize, channels: usize) {
        self.ensure_channels(channels);
        let configured = self.is_configured();
        for state in &mut self.channels {
            if configured {
                state.input.push_silence(len);
            } else {
                state.output.push_silence(len);
            }
        }
    }

    /// Grows or shrinks the processing channel set. New channels start primed.
    fn ensure_channels(&mut self, channels: usize) {
        if channels < self.channels.len() {
            self.channels.truncate(channels);
        }
        while self.channels.len() < channels {
            match ChannelState::new(self.layout) {
                Ok(state) => self.channels.push(state),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        error = %_err,
                        channels = self.channels.len(),
                        requested = channels,
                        "could not allocate channel state, extra channels stay silent"
                    );
                    break;
                }
            }
        }
        debug_assert_eq!(
            self.channels.len(),
            channels,
            "processing channel state could not be allocated"
        );
    }

    /// Convolves up to `want - ready` pending samples per channel.
    fn process_brute(&mut self, want: usize) {
        let history = self.layout.taps.saturating_sub(1);
        let num_impulses = self.impulses.len();

        for (ch, state) in self.channels.iter_mut().enumerate() {
            let taps = &self.impulses[ch % num_impulses].taps;
            let pending = state.input.available().saturating_sub(history);
            let todo = pending.min(want.saturating_sub(state.output.available()));
            if todo == 0 {
                continue;
            }

            let x = state.input.peek();
            state.output.push_with(todo, |i| {
                x[i..i + taps.len()]
                    .iter()
                    .zip(taps)
                    .map(|(&s, &h)| FftReal::from(s) * h)
                    .sum::<FftReal>() as Sample
            });
            state.input.advance(todo);
        }
    }

    /// Runs whole blocks until each channel has `want` samples or input runs out.
    fn process_fft(&mut self, want: usize) {
        let Self {
            layout,
            impulses,
            channels,
            fft,
            time,
            accum,
            ..
        } = self;
        let Some(fft) = fft.as_mut() else {
            return;
        };
        let num_impulses = impulses.len();

        for (ch, state) in channels.iter_mut().enumerate() {
            let impulse = &impulses[ch % num_impulses];
            while state.output.available() < want && state.input.available() >= layout.chunk {
                process_block(*layout, fft, time, accum, impulse, state);
            }
        }
    }
}

/// Transforms one input block, accumulates it against every partition and
/// overlap-adds the result into the channel output.
fn process_block(
    layout: Layout,
    fft: &mut Fft,
    time: &mut [FftReal],
    accum: &mut [Complex<FftReal>],
    impulse: &ImpulseChannel,
    state: &mut ChannelState,
) {
    let Layout {
        chunk,
        bins,
        blocks,
        ..
    } = layout;
    let slot = state.position;

    let block = &state.input.peek()[..chunk];
    let mut silent = block.iter().all(|&s| s == 0.0);
    if !silent {
        for (t, &s) in time.iter_mut().zip(block) {
            *t = FftReal::from(s);
        }
        time[chunk..].fill(0.0);
        let spectrum = &mut state.history[slot * bins..(slot + 1) * bins];
        silent = fft.forward(time, spectrum).is_err();
    }
    state.history_silent[slot] = silent;
    state.input.advance(chunk);

    accum.fill(Complex::new(0.0, 0.0));
    let mut any = false;
    for part in 0..blocks {
        let source = (slot + blocks - part) % blocks;
        if impulse.silent[part] || state.history_silent[source] {
            continue;
        }
        multiply_accumulate(
            accum,
            &state.history[source * bins..(source + 1) * bins],
            &impulse.spectra[part * bins..(part + 1) * bins],
        );
        any = true;
    }

    if !any || fft.inverse(accum, time).is_err() {
        time.fill(0.0);
    }

    let overlap = &state.overlap;
    state
        .output
        .push_with(chunk, |i| (time[i] + overlap[i]) as Sample);
    state.overlap.copy_from_slice(&time[chunk..]);

    state.position = (slot + 1) % blocks;
}

/// FFT size for a segment of `len` samples: at least twice the segment,
/// clamped to the automatic range.
fn auto_fft_size(len: usize) -> usize {
    let mut size = MIN_FFT_SIZE;
    while size < len * 2 && size < MAX_FFT_SIZE {
        size *= 2;
    }
    size
}

impl Convolver for DirectEngine {
    fn latency(&self) -> usize {
        self.block_size() / 2
    }

    fn reset(&mut self) {
        let layout = self.layout;
        for state in &mut self.channels {
            state.prime(layout);
        }
    }

    fn add(&mut self, input: &[&[Sample]], len: usize) {
        self.ensure_channels(input.len());
        let configured = self.is_configured();
        for (state, samples) in self.channels.iter_mut().zip(input) {
            debug_assert!(samples.len() >= len, "channel holds fewer than {len} samples");
            if configured {
                state.input.push(&samples[..len.min(samples.len())]);
            } else {
                state.output.push_silence(len);
            }
        }
    }

    fn avail(&mut self, want: usize) -> usize {
        if self.is_configured() {
            if self.layout.is_brute() {
                self.process_brute(want);
            } else {
                self.process_fft(want);
            }
        }

        self.channels
            .iter()
            .map(|state| state.output.available())
            .min()
            .unwrap_or(0)
    }

    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn output_channel(&self, channel: usize) -> &[Sample] {
        self.channels
            .get(channel)
            .map_or(&[][..], |state| state.output.peek())
    }

    fn advance(&mut self, len: usize) {
        for state in &mut self.channels {
            state.output.advance(len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolver::drain_into;

    /// Deterministic white noise in [-1, 1) (xorshift32).
    fn noise(len: usize, seed: u32) -> Vec<Sample> {
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    /// Direct time-domain convolution, truncated to the input length.
    fn reference(input: &[Sample], impulse: &[Sample]) -> Vec<f64> {
        (0..input.len())
            .map(|n| {
                impulse
                    .iter()
                    .enumerate()
                    .take(n + 1)
                    .map(|(k, &h)| f64::from(h) * f64::from(input[n - k]))
                    .sum()
            })
            .collect()
    }

    /// Feeds `input` in chunks of `chunk` samples and returns the mono output,
    /// continuing with silence until `input.len() + latency` samples came out.
    fn run(engine: &mut DirectEngine, input: &[Sample], chunk: usize) -> Vec<Sample> {
        let mut out = vec![Vec::new()];
        for block in input.chunks(chunk) {
            engine.add(&[block], block.len());
            drain_into(engine, &mut out, usize::MAX);
        }
        let target = input.len() + engine.latency();
        let silence = vec![0.0; chunk];
        while out[0].len() < target {
            engine.add(&[&silence], chunk);
            drain_into(engine, &mut out, usize::MAX);
        }
        out.pop().unwrap()
    }

    fn assert_matches_reference(output: &[Sample], latency: usize, expected: &[f64]) {
        for (n, &e) in expected.iter().enumerate() {
            let got = f64::from(output[n + latency]);
            assert!(
                (got - e).abs() < 1e-4,
                "sample {n}: got {got}, expected {e}"
            );
        }
        for (n, &got) in output[..latency].iter().enumerate() {
            assert_eq!(got, 0.0, "leading sample {n} should be silent");
        }
    }

    #[test]
    fn unconfigured_engine_passes_silence() {
        let mut engine = DirectEngine::new();
        assert_eq!(engine.latency(), 0);
        engine.add(&[&[1.0, 2.0, 3.0]], 3);
        assert_eq!(engine.avail(3), 3);
        assert!(engine.get().channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn identity_impulse_brute_force() {
        let impulse = ImpulseStore::mono(vec![1.0]);
        let mut engine = DirectEngine::new();
        assert_eq!(engine.set_impulse(&impulse, 0, 0, 0, false).unwrap(), 0);
        assert!(engine.is_brute_force());

        let input = noise(500, 3);
        let output = run(&mut engine, &input, 37);
        assert_eq!(&output[..500], &input[..]);
    }

    #[test]
    fn identity_impulse_fft_delays_by_latency() {
        let impulse = ImpulseStore::mono(vec![1.0]);
        let mut engine = DirectEngine::new();
        let latency = engine.set_impulse(&impulse, 64, 0, 0, false).unwrap();
        assert_eq!(latency, 32);
        assert!(!engine.is_brute_force());

        let input = noise(400, 9);
        let output = run(&mut engine, &input, 50);
        for n in 0..input.len() {
            assert!((output[n + latency] - input[n]).abs() < 1e-5);
        }
        assert!(output[..latency].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn brute_and_fft_match_reference() {
        let h = noise(200, 77);
        let impulse = ImpulseStore::mono(h.clone());
        let input = noise(1000, 5);
        let expected = reference(&input, &h);

        let mut brute = DirectEngine::new();
        brute.set_impulse(&impulse, 0, 0, 0, true).unwrap();
        let out = run(&mut brute, &input, 64);
        assert_matches_reference(&out, 0, &expected);

        for block_size in [32, 128, 512] {
            let mut fft = DirectEngine::new();
            let latency = fft.set_impulse(&impulse, block_size, 0, 0, false).unwrap();
            let out = run(&mut fft, &input, 100);
            assert_matches_reference(&out, latency, &expected);
        }
    }

    #[test]
    fn offset_and_max_len_select_segment() {
        let h = noise(300, 11);
        let impulse = ImpulseStore::mono(h.clone());
        let mut engine = DirectEngine::new();
        let latency = engine.set_impulse(&impulse, 64, 100, 50, false).unwrap();
        assert_eq!(engine.impulse_len(), 50);

        let input = noise(256, 4);
        let out = run(&mut engine, &input, 16);
        assert_matches_reference(&out, latency, &reference(&input, &h[100..150]));
    }

    #[test]
    fn silent_regions_are_skipped_without_changing_output() {
        let mut h = vec![0.0; 600];
        h[0] = 0.5;
        h[450..470].copy_from_slice(&noise(20, 8));
        let impulse = ImpulseStore::mono(h.clone());

        let mut input = noise(2000, 21);
        input[300..1200].fill(0.0);

        let mut engine = DirectEngine::new();
        let latency = engine.set_impulse(&impulse, 128, 0, 0, false).unwrap();
        let out = run(&mut engine, &input, 77);
        assert_matches_reference(&out, latency, &reference(&input, &h));
    }

    #[test]
    fn avail_never_processes_beyond_want() {
        let impulse = ImpulseStore::mono(noise(100, 1));
        let mut engine = DirectEngine::new();
        engine.set_impulse(&impulse, 64, 0, 0, false).unwrap();

        let input = noise(320, 2);
        engine.add(&[&input], input.len());
        // One block of 32 satisfies want = 10.
        assert_eq!(engine.avail(10), 32);
        assert_eq!(engine.avail(usize::MAX), 352);
    }

    #[test]
    fn channels_use_matching_impulse() {
        let left = noise(90, 31);
        let right = noise(90, 32);
        let impulse = ImpulseStore::from_channels(vec![left.clone(), right.clone()]);
        let mut engine = DirectEngine::new();
        let latency = engine.set_impulse(&impulse, 64, 0, 0, false).unwrap();

        let input = noise(300, 40);
        let mut out = vec![Vec::new(), Vec::new(), Vec::new()];
        let silence = vec![0.0; latency];
        engine.add(&[&input, &input, &input], input.len());
        engine.add(&[&silence, &silence, &silence], latency);
        drain_into(&mut engine, &mut out, usize::MAX);

        assert_matches_reference(&out[0], latency, &reference(&input, &left));
        assert_matches_reference(&out[1], latency, &reference(&input, &right));
        // Third channel wraps around to the first impulse.
        assert_matches_reference(&out[2], latency, &reference(&input, &left));
    }

    #[test]
    fn reset_clears_history() {
        let impulse = ImpulseStore::mono(noise(150, 6));
        let mut engine = DirectEngine::new();
        let latency = engine.set_impulse(&impulse, 64, 0, 0, false).unwrap();

        let input = noise(500, 12);
        let first = run(&mut engine, &input, 64);
        engine.reset();
        let second = run(&mut engine, &input, 64);
        assert_eq!(&first[..input.len() + latency], &second[..input.len() + latency]);
    }

    #[test]
    fn failed_reconfiguration_keeps_previous_impulse() {
        let impulse = ImpulseStore::mono(vec![1.0]);
        let mut engine = DirectEngine::new();
        engine.set_impulse(&impulse, 64, 0, 0, false).unwrap();

        let err = engine
            .set_impulse(&impulse, 64, 5, 0, false)
            .unwrap_err();
        assert!(matches!(err, ConvolutionError::EmptyImpulse { offset: 5, .. }));
        assert_eq!(engine.latency(), 32);
        assert_eq!(engine.impulse_len(), 1);

        let mut empty = ImpulseStore::new();
        empty.set_num_channels(0, false);
        assert!(matches!(
            engine.set_impulse(&empty, 64, 0, 0, false),
            Err(ConvolutionError::NoChannels)
        ));
    }

    #[test]
    fn auto_fft_size_tracks_segment_length() {
        assert_eq!(auto_fft_size(33), 128);
        assert_eq!(auto_fft_size(1000), 2048);
        assert_eq!(auto_fft_size(1 << 20), MAX_FFT_SIZE);

        let impulse = ImpulseStore::mono(vec![0.1; 1000]);
        let mut engine = DirectEngine::new();
        assert_eq!(engine.set_impulse(&impulse, 0, 0, 0, false).unwrap(), 1024);
    }

    #[test]
    fn channel_count_follows_input() {
        let impulse = ImpulseStore::mono(vec![1.0]);
        let mut engine = DirectEngine::new();
        let latency = engine.set_impulse(&impulse, 64, 0, 0, false).unwrap();
        let block = vec![1.0; 64];

        engine.add(&[&block, &block, &block], 64);
        assert_eq!(engine.num_channels(), 3);
        engine.add(&[&block], 64);
        assert_eq!(engine.num_channels(), 1);

        engine.reset();
        engine.add(&[&block, &block], 64);
        assert_eq!(engine.num_channels(), 2);
        assert!(engine.avail(64) >= 64);

        // The regrown channel starts primed, like a reset one.
        let out = engine.get();
        for ch in 0..2 {
            let samples = out.channel(ch);
            assert!(samples[..latency].iter().all(|&x| x.abs() < 1e-6));
            assert!((samples[latency] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn add_silence_delays_output() {
        let impulse = ImpulseStore::mono(vec![1.0]);
        let mut engine = DirectEngine::new();
        engine.set_impulse(&impulse, 0, 0, 0, true).unwrap();
        engine.add_silence(5, 1);
        engine.add(&[&[1.0, 2.0]], 2);
        assert_eq!(engine.avail(usize::MAX), 7);
        assert_eq!(engine.get().channel(0), &[0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
    }
}
