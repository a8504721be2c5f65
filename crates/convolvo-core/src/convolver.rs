//! Streaming interface shared by all convolution engines.
//!
//! Engines follow a pull model: [`Convolver::add`] queues input,
//! [`Convolver::avail`] runs whatever processing is needed and reports how
//! many output samples are ready, [`Convolver::get`] exposes them without
//! copying, and [`Convolver::advance`] releases them.
//!
//! Output sample `k` is always input sample `k - latency()` convolved with the
//! impulse; the first `latency()` output samples are silence.

use crate::Sample;

/// Common streaming surface of [`DirectEngine`](crate::DirectEngine),
/// [`CompositeEngine`](crate::CompositeEngine) and `ThreadedEngine`.
///
/// The channel count of a call is the number of input slices passed to
/// [`add`](Self::add); processing channel `c` uses impulse channel
/// `c % impulse_channels`. Keep the channel count constant between resets.
///
/// None of these methods fail. After the first call at a given channel count
/// they do not allocate either, as long as each `add` stays within a few
/// thousand samples beyond the engine's largest block.
pub trait Convolver {
    /// Added latency in samples for the current configuration.
    fn latency(&self) -> usize;

    /// Clears all history and pending output to silence, keeping the impulse.
    fn reset(&mut self);

    /// Queues `len` samples from each channel slice.
    ///
    /// Each slice must hold at least `len` samples.
    fn add(&mut self, input: &[&[Sample]], len: usize);

    /// Processes queued input and returns how many output samples are ready.
    ///
    /// Work stops once `want` samples are available, so the result may be
    /// smaller than what further processing could produce, but it never
    /// exceeds what is actually ready. Pass `usize::MAX` to process everything.
    fn avail(&mut self, want: usize) -> usize;

    /// Number of processing channels established by the last `add`.
    fn num_channels(&self) -> usize;

    /// Ready output of `channel`, oldest sample first.
    ///
    /// Channels may momentarily differ in length; [`get`](Self::get) trims
    /// them to a common length. Out-of-range channels yield an empty slice.
    fn output_channel(&self, channel: usize) -> &[Sample];

    /// Releases the `len` oldest output samples of every channel.
    fn advance(&mut self, len: usize);

    /// Zero-copy view of the ready output.
    ///
    /// The view borrows the engine, so it stays valid until the next `add`
    /// or `advance`.
    fn get(&self) -> Output<'_>
    where
        Self: Sized,
    {
        Output::new(self)
    }

    /// Adds one block and copies out whatever output is ready, up to the
    /// output slice length.
    ///
    /// Returns the number of samples written per channel. Samples past that
    /// count are left untouched.
    fn process(&mut self, input: &[&[Sample]], output: &mut [&mut [Sample]]) -> usize {
        let len = input.iter().map(|c| c.len()).min().unwrap_or(0);
        self.add(input, len);

        let want = output.iter().map(|c| c.len()).min().unwrap_or(0);
        let ready = self.avail(want).min(want);
        for (ch, out) in output.iter_mut().enumerate() {
            let src = self.output_channel(ch);
            let n = ready.min(src.len());
            out[..n].copy_from_slice(&src[..n]);
        }
        self.advance(ready);
        ready
    }
}

/// Ready output of an engine: one slice per channel, all the same length.
#[derive(Clone, Copy)]
pub struct Output<'a> {
    source: &'a dyn Convolver,
    len: usize,
}

impl<'a> Output<'a> {
    /// Builds a view over the current output of `source`.
    pub fn new(source: &'a dyn Convolver) -> Self {
        let len = (0..source.num_channels())
            .map(|ch| source.output_channel(ch).len())
            .min()
            .unwrap_or(0);
        Self { source, len }
    }

    /// Valid samples per channel.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no output is ready.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of channels in the view.
    pub fn num_channels(&self) -> usize {
        self.source.num_channels()
    }

    /// Ready samples of `channel`.
    pub fn channel(&self, channel: usize) -> &'a [Sample] {
        let samples = self.source.output_channel(channel);
        &samples[..self.len.min(samples.len())]
    }

    /// Iterates the channels in order.
    pub fn channels(&self) -> impl Iterator<Item = &'a [Sample]> + 'a {
        let view = *self;
        (0..view.num_channels()).map(move |ch| view.channel(ch))
    }
}

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("channels", &self.num_channels())
            .field("len", &self.len)
            .finish()
    }
}

/// Copies up to `len` ready samples per channel into `out`, then advances.
///
/// Returns how many samples were moved. Used by tests and the CLI to drain an
/// engine into owned buffers.
pub fn drain_into(engine: &mut dyn Convolver, out: &mut [Vec<Sample>], len: usize) -> usize {
    let ready = engine.avail(len).min(len);
    for (ch, dst) in out.iter_mut().enumerate() {
        let src = engine.output_channel(ch);
        dst.extend_from_slice(&src[..ready.min(src.len())]);
    }
    engine.advance(ready);
    ready
}
