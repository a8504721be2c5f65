//! Engine construction and block feeding shared by the commands.

use anyhow::Context;
use convolvo_core::{
    CompositeEngine, Convolver, DirectEngine, ImpulseStore, Sample, StagePlan, ThreadedEngine,
    drain_into,
};

use crate::settings::{EngineKind, EngineSettings};

/// A configured engine of any kind.
pub struct Engine {
    inner: Box<dyn Convolver>,
    stages: Vec<StagePlan>,
    threaded: bool,
}

impl Engine {
    /// Configures an engine of `kind` for `impulse`.
    pub fn build(
        kind: EngineKind,
        impulse: &ImpulseStore<'_>,
        settings: &EngineSettings,
    ) -> anyhow::Result<Self> {
        let len = impulse.len();
        let engine = match kind {
            EngineKind::Direct | EngineKind::Brute => {
                let mut engine = DirectEngine::new();
                let latency = engine
                    .set_impulse(impulse, 0, 0, 0, kind == EngineKind::Brute)
                    .with_context(|| format!("configuring {} engine", kind.name()))?;
                let stage = StagePlan {
                    offset: 0,
                    len,
                    block_size: engine.block_size(),
                    latency,
                    lead_in: 0,
                };
                Self {
                    inner: Box::new(engine),
                    stages: vec![stage],
                    threaded: false,
                }
            }
            EngineKind::Composite => {
                let mut engine = CompositeEngine::new();
                engine
                    .set_impulse(
                        impulse,
                        settings.max_block_size,
                        settings.known_block_size,
                        0,
                        0,
                        settings.allowed_latency,
                    )
                    .context("configuring composite engine")?;
                Self {
                    stages: engine.stages().to_vec(),
                    inner: Box::new(engine),
                    threaded: false,
                }
            }
            EngineKind::Threaded => {
                let mut engine = ThreadedEngine::new();
                engine.enable_thread(settings.threaded);
                engine
                    .set_impulse(
                        impulse,
                        settings.max_block_size,
                        settings.known_block_size,
                        0,
                        0,
                        settings.allowed_latency,
                    )
                    .context("configuring threaded engine")?;
                Self {
                    stages: engine.stages(),
                    threaded: engine.is_threaded(),
                    inner: Box::new(engine),
                }
            }
        };

        tracing::debug!(
            kind = kind.name(),
            latency = engine.latency(),
            stages = engine.stages.len(),
            threaded = engine.threaded,
            "engine ready"
        );
        Ok(engine)
    }

    /// Added latency in samples.
    pub fn latency(&self) -> usize {
        self.inner.latency()
    }

    /// Partition layout.
    pub fn stages(&self) -> &[StagePlan] {
        &self.stages
    }

    /// Whether a worker thread is running.
    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    /// Mutable access to the streaming interface.
    pub fn convolver(&mut self) -> &mut dyn Convolver {
        self.inner.as_mut()
    }

    /// Feeds `input` in blocks of `block_size` and returns the convolved
    /// signal aligned with the input (latency removed), `input` length long.
    ///
    /// `on_block` is called with the number of input samples consumed so far.
    pub fn render(
        &mut self,
        input: &[Vec<Sample>],
        block_size: usize,
        mut on_block: impl FnMut(usize),
    ) -> Vec<Vec<Sample>> {
        let len = input.first().map_or(0, Vec::len);
        let latency = self.latency();
        let block_size = block_size.max(1);
        let mut out = vec![Vec::with_capacity(len + latency); input.len()];

        let mut pos = 0;
        while pos < len {
            let end = (pos + block_size).min(len);
            let block: Vec<&[Sample]> = input.iter().map(|c| &c[pos..end]).collect();
            self.inner.add(&block, end - pos);
            drain_into(self.inner.as_mut(), &mut out, usize::MAX);
            pos = end;
            on_block(pos);
        }

        let silence = vec![0.0; block_size];
        let block: Vec<&[Sample]> = input.iter().map(|_| silence.as_slice()).collect();
        while out.first().is_some_and(|c| c.len() < len + latency) {
            self.inner.add(&block, block_size);
            drain_into(self.inner.as_mut(), &mut out, usize::MAX);
        }

        for channel in &mut out {
            channel.drain(..latency.min(channel.len()));
            channel.truncate(len);
        }
        out
    }
}

/// Appends `tail` samples of silence to every channel.
pub fn pad(input: &mut [Vec<Sample>], tail: usize) {
    for channel in input {
        channel.resize(channel.len() + tail, 0.0);
    }
}
