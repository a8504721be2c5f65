//! Synthetic test signals and the time-domain reference convolution.

use clap::ValueEnum;
use convolvo_core::{ImpulseStore, Sample};

/// Simple xorshift32 PRNG for reproducible noise.
#[derive(Debug, Clone)]
pub struct Noise {
    state: u32,
}

impl Noise {
    /// Creates a generator; a zero seed is replaced by 1.
    pub fn new(seed: u32) -> Self {
        Self { state: seed.max(1) }
    }

    /// Next sample in [-1, 1).
    pub fn next_sample(&mut self) -> Sample {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 17;
        self.state ^= self.state << 5;
        (self.state as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    /// Fills a new vector with `len` samples.
    pub fn take(&mut self, len: usize) -> Vec<Sample> {
        (0..len).map(|_| self.next_sample()).collect()
    }
}

/// Input signal for `render`.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum InputSignal {
    /// Unit clicks every 250 ms
    #[default]
    Clicks,
    /// White noise at -12 dBFS
    Noise,
}

/// Generates `channels` channels of `len` samples of `signal`.
pub fn input_signal(
    signal: InputSignal,
    len: usize,
    channels: usize,
    sample_rate: u32,
    seed: u32,
) -> Vec<Vec<Sample>> {
    match signal {
        InputSignal::Clicks => {
            let period = (sample_rate as usize / 4).max(1);
            let mut clicks = vec![0.0; len];
            for sample in clicks.iter_mut().step_by(period) {
                *sample = 1.0;
            }
            vec![clicks; channels]
        }
        InputSignal::Noise => (0..channels)
            .map(|ch| {
                let mut noise = Noise::new(seed.wrapping_add(ch as u32));
                noise.take(len).into_iter().map(|s| s * 0.25).collect()
            })
            .collect(),
    }
}

/// Exponentially decaying noise impulse, one decorrelated channel each.
///
/// `decay_seconds` is the time to fall by 60 dB.
pub fn decaying_impulse(
    len: usize,
    channels: usize,
    sample_rate: u32,
    decay_seconds: f32,
    seed: u32,
) -> ImpulseStore<'static> {
    let decay_samples = (decay_seconds.max(1e-3) * sample_rate as f32).max(1.0);
    // -60 dB over decay_samples
    let rate = 6.907_755 / decay_samples;

    let data = (0..channels)
        .map(|ch| {
            let mut noise = Noise::new(seed.wrapping_mul(31).wrapping_add(ch as u32 + 7));
            (0..len)
                .map(|i| {
                    let envelope = (-(i as f32) * rate).exp();
                    if i == 0 {
                        0.5
                    } else {
                        0.1 * noise.next_sample() * envelope
                    }
                })
                .collect()
        })
        .collect();

    let mut impulse = ImpulseStore::from_channels(data);
    impulse.set_sample_rate(f64::from(sample_rate));
    impulse
}

/// Direct time-domain convolution, first `input.len()` samples.
pub fn reference_convolution(input: &[Sample], impulse: &[Sample]) -> Vec<f64> {
    (0..input.len())
        .map(|n| {
            impulse
                .iter()
                .take(n + 1)
                .enumerate()
                .map(|(k, &h)| f64::from(h) * f64::from(input[n - k]))
                .sum()
        })
        .collect()
}

/// Peak absolute value.
pub fn peak(signal: &[Sample]) -> f32 {
    signal.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}

/// Convert linear amplitude to dB.
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-10).log10()
}
