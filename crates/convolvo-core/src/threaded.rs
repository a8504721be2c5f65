//! Composite convolution with the heaviest stage on a background thread.
//!
//! [`ThreadedEngine`] splits the impulse at `max_block_size`. The head runs on
//! a [`CompositeEngine`] on the caller's thread; the tail ("overflow") runs on
//! one large [`DirectEngine`] owned by a dedicated worker. The caller only pays
//! for the small stages and a pair of short critical sections per call.
//!
//! ## Handoff
//!
//! ```text
//! caller add ──▶ [input FIFOs] ──▶ worker: DirectEngine ──▶ [output FIFOs] ──▶ caller avail (mix)
//!                 input lock                                 output lock
//! ```
//!
//! The worker never holds both locks at once, and neither does the caller.
//! The overflow stage starts `max_block_size` samples into the impulse, so its
//! published output runs about half an overflow block ahead of the input. The
//! caller only waits when the worker has queued input it has not finished yet
//! and the mix would otherwise come up short.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::composite::{CompositeEngine, StagePlan, resolve_max_fft};
use crate::convolver::Convolver;
use crate::direct::{DirectEngine, FIFO_HEADROOM};
use crate::error::Result;
use crate::fifo::SampleFifo;
use crate::{ImpulseStore, Sample};

/// Channels a threaded engine processes; further input channels are ignored.
pub const MAX_THREAD_CHANNELS: usize = 8;

/// Name of the overflow worker thread.
const WORKER_NAME: &str = "convolvo-overflow";

/// Input side of the handoff, guarded by [`Shared::input`].
#[derive(Debug, Default)]
struct InputState {
    channels: Vec<SampleFifo<Sample>>,
    num_channels: usize,
    /// Samples per channel queued since the worker last took a batch.
    pending: usize,
    /// Engine handed to the worker on startup.
    install: Option<DirectEngine>,
    /// Bumped by the caller to request a reset.
    epoch: u64,
    quit: bool,
}

/// Output side of the handoff, guarded by [`Shared::output`].
#[derive(Debug, Default)]
struct OutputState {
    channels: Vec<SampleFifo<Sample>>,
    /// Input samples per channel the worker has fully processed.
    consumed: usize,
    /// Last reset epoch the worker completed.
    epoch: u64,
}

impl OutputState {
    fn ready(&self, channels: usize) -> usize {
        if self.channels.len() < channels {
            return 0;
        }
        self.channels[..channels]
            .iter()
            .map(SampleFifo::available)
            .min()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Shared {
    input: Mutex<InputState>,
    input_ready: Condvar,
    output: Mutex<OutputState>,
    output_ready: Condvar,
}

/// Background worker owning the overflow stage.
#[derive(Debug)]
struct Worker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    /// Samples per channel handed to the worker since the last reset.
    submitted: usize,
    /// Input channels already allocated on the shared side.
    channels: usize,
    /// Per-channel FIFO capacity on both sides of the handoff.
    capacity: usize,
}

impl Worker {
    /// Starts a worker for `engine`, or hands the engine back if no thread
    /// could be created.
    fn spawn(
        engine: DirectEngine,
        lead_in: usize,
        capacity: usize,
    ) -> std::result::Result<Self, DirectEngine> {
        let shared = Arc::new(Shared::default());
        {
            let mut input = shared.input.lock();
            input.install = Some(engine);
            input.channels.reserve(MAX_THREAD_CHANNELS);
        }
        shared.output.lock().channels.reserve(MAX_THREAD_CHANNELS);

        let worker_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || run_worker(&worker_shared, lead_in, capacity));

        match spawned {
            Ok(handle) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(lead_in, "overflow worker started");
                Ok(Self {
                    shared,
                    handle: Some(handle),
                    submitted: 0,
                    channels: 0,
                    capacity,
                })
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "overflow worker failed to start, processing inline");
                let engine = shared.input.lock().install.take();
                Err(engine.unwrap_or_default())
            }
        }
    }

    fn submit(&mut self, input: &[&[Sample]], len: usize) {
        let channels = input.len();
        // New channel FIFOs are allocated before taking the lock.
        let grown: Vec<SampleFifo<Sample>> = (self.channels..channels)
            .map(|_| SampleFifo::with_capacity(self.capacity))
            .collect();
        {
            let mut state = self.shared.input.lock();
            state.channels.extend(grown);
            state.num_channels = channels;
            for (fifo, samples) in state.channels.iter_mut().zip(input) {
                fifo.push(&samples[..len.min(samples.len())]);
            }
            state.pending += len;
        }
        self.shared.input_ready.notify_one();
        self.channels = self.channels.max(channels);
        self.submitted += len;
    }

    /// Clears queued work on both sides and waits until the worker has reset
    /// its engine.
    fn reset(&mut self) {
        let epoch = {
            let mut state = self.shared.input.lock();
            for fifo in &mut state.channels {
                fifo.clear();
            }
            state.pending = 0;
            state.epoch += 1;
            state.epoch
        };
        self.shared.input_ready.notify_one();

        let mut output = self.shared.output.lock();
        while output.epoch != epoch {
            self.shared.output_ready.wait(&mut output);
        }
        self.submitted = 0;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shared.input.lock().quit = true;
        self.shared.input_ready.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            #[cfg(feature = "tracing")]
            tracing::debug!("overflow worker stopped");
        }
    }
}

/// Worker loop: wait for input, convolve it, publish the output.
fn run_worker(shared: &Shared, lead_in: usize, capacity: usize) {
    let Some(mut engine) = shared.input.lock().install.take() else {
        return;
    };
    let mut epoch = 0;
    let mut need_prime = true;
    let mut staged: Vec<Vec<Sample>> = Vec::new();

    loop {
        let (len, channels) = {
            let mut input = shared.input.lock();
            while !input.quit && input.pending == 0 && input.epoch == epoch {
                shared.input_ready.wait(&mut input);
            }
            if input.quit {
                return;
            }

            if input.epoch != epoch {
                epoch = input.epoch;
                drop(input);

                engine.reset();
                need_prime = true;
                {
                    let mut output = shared.output.lock();
                    for fifo in &mut output.channels {
                        fifo.clear();
                    }
                    output.consumed = 0;
                    output.epoch = epoch;
                }
                shared.output_ready.notify_all();
                continue;
            }

            let len = input.pending;
            let channels = input.num_channels;
            if staged.len() < channels {
                staged.resize_with(channels, Vec::new);
            }
            for (dst, src) in staged.iter_mut().zip(input.channels.iter_mut()) {
                dst.clear();
                dst.extend_from_slice(&src.peek()[..len.min(src.available())]);
                src.advance(len.min(src.available()));
            }
            input.pending = 0;
            (len, channels)
        };

        if need_prime {
            engine.add_silence(lead_in, channels);
            need_prime = false;
        }
        let batch: Vec<&[Sample]> = staged[..channels].iter().map(Vec::as_slice).collect();
        engine.add(&batch, len);
        let ready = engine.avail(usize::MAX);

        {
            let mut output = shared.output.lock();
            if output.channels.len() < channels {
                output
                    .channels
                    .resize_with(channels, || SampleFifo::with_capacity(capacity));
            }
            for (ch, fifo) in output.channels.iter_mut().take(channels).enumerate() {
                fifo.push(&engine.output_channel(ch)[..ready]);
            }
            output.consumed += len;
        }
        shared.output_ready.notify_all();
        engine.advance(ready);
    }
}

/// Where the overflow stage runs.
#[derive(Debug, Default)]
enum Overflow {
    /// The composite covers the whole impulse.
    #[default]
    None,
    /// On the caller's thread (threading disabled at spawn time).
    Inline {
        engine: DirectEngine,
        need_prime: bool,
    },
    /// On the background worker.
    Worker(Worker),
}

/// [`CompositeEngine`] with its largest stage offloaded to a worker thread.
///
/// Threading is requested with [`enable_thread`](Self::enable_thread) and takes
/// effect at the next [`set_impulse`](Self::set_impulse). Impulses no longer
/// than `max_block_size` never start a worker. Output is identical to a
/// composite engine with the same settings, up to rounding.
///
/// # Blocking
///
/// With `add` chunks of at most `max_block_size / 2` samples, the overflow
/// output needed by `avail` has normally been published already and the
/// calling thread never waits on the worker. Larger chunks can outrun it:
/// `avail` then blocks until the worker finishes the pending overflow FFT
/// block, so the caller is charged for that stage. Keep real-time callbacks
/// at or below `max_block_size / 2`.
///
/// # Example
///
/// ```rust
/// use convolvo_core::{Convolver, ImpulseStore, ThreadedEngine};
///
/// let impulse = ImpulseStore::mono(vec![0.001; 20_000]);
/// let mut engine = ThreadedEngine::new();
/// engine.enable_thread(true);
/// engine.set_impulse(&impulse, 4096, 128, 0, 0, 0).unwrap();
/// assert!(engine.is_threaded());
///
/// let block = vec![0.25; 128];
/// engine.add(&[&block], 128);
/// let ready = engine.avail(128);
/// assert_eq!(ready, 128);
/// engine.advance(ready);
/// ```
#[derive(Debug, Default)]
pub struct ThreadedEngine {
    sync: CompositeEngine,
    overflow: Overflow,
    overflow_plan: Option<StagePlan>,
    thread_requested: bool,
    num_channels: usize,
    /// Mixed output of the synchronous and overflow parts.
    output: Vec<SampleFifo<Sample>>,
}

impl ThreadedEngine {
    /// Creates an unconfigured engine with threading disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests (or cancels) the background worker. Applied at the next
    /// [`set_impulse`](Self::set_impulse).
    pub fn enable_thread(&mut self, enable: bool) {
        self.thread_requested = enable;
    }

    /// Whether threading is requested.
    pub fn thread_enabled(&self) -> bool {
        self.thread_requested
    }

    /// Whether a worker thread is currently running the overflow stage.
    pub fn is_threaded(&self) -> bool {
        matches!(self.overflow, Overflow::Worker(_))
    }

    /// Configures the engine; arguments match
    /// [`CompositeEngine::set_impulse`], with `max_block_size` also marking
    /// where the overflow stage begins.
    ///
    /// Any running worker is stopped and, if threading is enabled and the
    /// impulse extends past `max_block_size`, a new one is started. On error
    /// the previous configuration, worker included, stays in place.
    pub fn set_impulse(
        &mut self,
        impulse: &ImpulseStore<'_>,
        max_block_size: usize,
        known_block_size: usize,
        max_len: usize,
        impulse_offset: usize,
        allowed_latency: usize,
    ) -> Result<usize> {
        let max_block = resolve_max_fft(max_block_size);
        let available = impulse.len().saturating_sub(impulse_offset);
        let len = if max_len > 0 {
            available.min(max_len)
        } else {
            available
        };
        let tail_start = max_block;
        let split = self.thread_requested && len > tail_start;

        let mut sync = CompositeEngine::new();
        if !split {
            let latency = sync.set_impulse(
                impulse,
                max_block,
                known_block_size,
                max_len,
                impulse_offset,
                allowed_latency,
            )?;
            self.commit(sync, Overflow::None, None);
            return Ok(latency);
        }

        let latency = sync.set_impulse(
            impulse,
            max_block / 2,
            known_block_size,
            tail_start,
            impulse_offset,
            allowed_latency,
        )?;

        let chunk = max_block / 2;
        let plan = StagePlan {
            offset: tail_start,
            len: len - tail_start,
            block_size: max_block,
            latency: chunk,
            lead_in: tail_start + latency - chunk,
        };
        let mut tail = DirectEngine::new();
        tail.set_impulse(
            impulse,
            plan.block_size,
            impulse_offset + plan.offset,
            plan.len,
            false,
        )?;

        // Stop the old worker before starting another one.
        self.overflow = Overflow::None;
        let capacity = 2 * max_block + FIFO_HEADROOM;
        let overflow = match Worker::spawn(tail, plan.lead_in, capacity) {
            Ok(worker) => Overflow::Worker(worker),
            Err(engine) => Overflow::Inline {
                engine,
                need_prime: true,
            },
        };
        self.commit(sync, overflow, Some(plan));

        Ok(latency)
    }

    fn commit(&mut self, sync: CompositeEngine, overflow: Overflow, plan: Option<StagePlan>) {
        self.sync = sync;
        self.overflow = overflow;
        self.overflow_plan = plan;
        let capacity = self.output_capacity();
        for fifo in &mut self.output {
            fifo.clear();
            fifo.reserve(capacity);
        }
    }

    /// Mixed output a channel can hold without reallocating.
    fn output_capacity(&self) -> usize {
        let largest = self.overflow_plan.map_or(0, |plan| plan.block_size);
        2 * largest + FIFO_HEADROOM
    }

    /// Partition layout: the synchronous stages followed by the overflow stage.
    pub fn stages(&self) -> Vec<StagePlan> {
        let mut plans = self.sync.stages().to_vec();
        plans.extend(self.overflow_plan);
        plans
    }

    /// Number of impulse samples the engine convolves with.
    pub fn impulse_len(&self) -> usize {
        self.sync.impulse_len() + self.overflow_plan.map_or(0, |plan| plan.len)
    }

    fn ready(&self) -> usize {
        self.output
            .iter()
            .take(self.num_channels)
            .map(SampleFifo::available)
            .min()
            .unwrap_or(0)
    }

    /// Mixes `len` samples of the synchronous output with `tail` into the
    /// output FIFOs.
    fn mix<'t>(&mut self, len: usize, tail: impl Fn(usize) -> &'t [Sample]) {
        if len == 0 {
            return;
        }
        let channels = self.num_channels;
        let Self { sync, output, .. } = self;
        for (ch, fifo) in output.iter_mut().take(channels).enumerate() {
            let head = sync.output_channel(ch);
            let rest = tail(ch);
            fifo.push_with(len, |i| {
                head.get(i).copied().unwrap_or(0.0) + rest.get(i).copied().unwrap_or(0.0)
            });
        }
        sync.advance(len);
    }
}

impl Convolver for ThreadedEngine {
    fn latency(&self) -> usize {
        self.sync.latency()
    }

    fn reset(&mut self) {
        self.sync.reset();
        match &mut self.overflow {
            Overflow::None => {}
            Overflow::Inline { engine, need_prime } => {
                engine.reset();
                *need_prime = true;
            }
            Overflow::Worker(worker) => worker.reset(),
        }
        for fifo in &mut self.output {
            fifo.clear();
        }
    }

    fn add(&mut self, input: &[&[Sample]], len: usize) {
        let input = &input[..input.len().min(MAX_THREAD_CHANNELS)];
        let channels = input.len();
        self.num_channels = channels;
        if self.output.len() < channels {
            let capacity = self.output_capacity();
            self.output
                .resize_with(channels, || SampleFifo::with_capacity(capacity));
        }

        self.sync.add(input, len);
        match &mut self.overflow {
            Overflow::None => {}
            Overflow::Inline { engine, need_prime } => {
                if *need_prime {
                    let lead_in = self.overflow_plan.map_or(0, |plan| plan.lead_in);
                    engine.add_silence(lead_in, channels);
                    *need_prime = false;
                }
                engine.add(input, len);
            }
            Overflow::Worker(worker) => worker.submit(input, len),
        }
    }

    fn avail(&mut self, want: usize) -> usize {
        if matches!(self.overflow, Overflow::None) {
            return self.sync.avail(want);
        }

        let ready = self.ready();
        if ready >= want {
            return ready;
        }
        let need = want - ready;
        let head = self.sync.avail(need);
        if head == 0 {
            return ready;
        }

        let channels = self.num_channels;
        let mixed = match std::mem::take(&mut self.overflow) {
            Overflow::None => 0,
            Overflow::Inline {
                mut engine,
                need_prime,
            } => {
                let len = head.min(engine.avail(need));
                self.mix(len, |ch| engine.output_channel(ch));
                engine.advance(len);
                self.overflow = Overflow::Inline { engine, need_prime };
                len
            }
            Overflow::Worker(worker) => {
                let target = head.min(need);
                let shared = Arc::clone(&worker.shared);
                let mut output = shared.output.lock();
                while output.ready(channels) < target && output.consumed < worker.submitted {
                    shared.output_ready.wait(&mut output);
                }
                let len = head.min(output.ready(channels));
                self.mix(len, |ch| output.channels.get(ch).map_or(&[][..], SampleFifo::peek));
                for fifo in output.channels.iter_mut().take(channels) {
                    fifo.advance(len);
                }
                drop(output);
                self.overflow = Overflow::Worker(worker);
                len
            }
        };

        ready + mixed
    }

    fn num_channels(&self) -> usize {
        match self.overflow {
            Overflow::None => self.sync.num_channels(),
            _ => self.num_channels,
        }
    }

    fn output_channel(&self, channel: usize) -> &[Sample] {
        match self.overflow {
            Overflow::None => self.sync.output_channel(channel),
            _ if channel < self.num_channels => {
                self.output.get(channel).map_or(&[][..], SampleFifo::peek)
            }
            _ => &[],
        }
    }

    fn advance(&mut self, len: usize) {
        match self.overflow {
            Overflow::None => self.sync.advance(len),
            _ => {
                for fifo in self.output.iter_mut().take(self.num_channels) {
                    fifo.advance(len);
                }
            }
        }
    }
}
