//! Partition plan inspection command.

use clap::Args;
use convolvo_core::ImpulseStore;

use super::common::Engine;
use crate::settings::{EngineKind, EngineSettings};

#[derive(Args)]
pub struct PlanArgs {
    /// Impulse length in samples
    #[arg(long, default_value = "48000")]
    impulse_len: usize,

    /// Engine to plan for
    #[arg(long, value_enum, default_value_t = EngineKind::Threaded)]
    engine: EngineKind,
}

pub fn run(args: PlanArgs, settings: &EngineSettings) -> anyhow::Result<()> {
    if args.impulse_len == 0 {
        anyhow::bail!("impulse length must be positive");
    }

    // The plan only depends on the length; an all-zero impulse skips every partition.
    let impulse = ImpulseStore::mono(vec![0.0; args.impulse_len]);
    let engine = Engine::build(args.engine, &impulse, settings)?;

    println!(
        "Plan for {} samples ({:.1} ms) with the {} engine",
        args.impulse_len,
        settings.samples_to_ms(args.impulse_len),
        args.engine.name()
    );
    println!();
    println!(
        "  {:>5}  {:<6}  {:>9}  {:>9}  {:>6}  {:>7}  {:>7}",
        "stage", "kind", "offset", "length", "fft", "latency", "lead-in"
    );
    for (index, stage) in engine.stages().iter().enumerate() {
        let kind = if stage.is_brute_force() { "brute" } else { "fft" };
        println!(
            "  {:>5}  {:<6}  {:>9}  {:>9}  {:>6}  {:>7}  {:>7}",
            index, kind, stage.offset, stage.len, stage.block_size, stage.latency, stage.lead_in
        );
    }
    println!();
    println!(
        "Latency: {} samples ({:.2} ms)",
        engine.latency(),
        settings.samples_to_ms(engine.latency())
    );
    if args.engine == EngineKind::Threaded {
        println!(
            "Worker:  {}",
            if engine.is_threaded() { "yes" } else { "no" }
        );
    }

    Ok(())
}
