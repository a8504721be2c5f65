//! Cross-check every engine against direct convolution.

use clap::Args;

use super::common::Engine;
use crate::settings::{EngineKind, EngineSettings};
use crate::signals::{InputSignal, decaying_impulse, input_signal, reference_convolution};

#[derive(Args)]
pub struct VerifyArgs {
    /// Impulse length in samples
    #[arg(long, default_value = "3000")]
    impulse_len: usize,

    /// Input length in samples
    #[arg(long, default_value = "12000")]
    input_len: usize,

    /// Largest accepted error relative to the output peak
    #[arg(long, default_value = "1e-5")]
    tolerance: f64,

    /// Processing block size (defaults to the configured known block size)
    #[arg(long)]
    block_size: Option<usize>,

    /// Noise seed
    #[arg(long, default_value = "7")]
    seed: u32,
}

/// Outcome for one engine kind.
struct Report {
    kind: EngineKind,
    latency: usize,
    stages: usize,
    max_error: f64,
}

pub fn run(args: VerifyArgs, settings: &EngineSettings) -> anyhow::Result<()> {
    if args.impulse_len == 0 || args.input_len == 0 {
        anyhow::bail!("impulse and input lengths must be positive");
    }

    let channels = settings.channels;
    let block_size = args.block_size.unwrap_or(settings.known_block_size);
    let impulse = decaying_impulse(
        args.impulse_len,
        channels,
        settings.sample_rate,
        args.impulse_len as f32 / settings.sample_rate as f32,
        args.seed,
    );
    let input = input_signal(
        InputSignal::Noise,
        args.input_len,
        channels,
        settings.sample_rate,
        args.seed,
    );

    let expected: Vec<Vec<f64>> = input
        .iter()
        .enumerate()
        .map(|(ch, signal)| reference_convolution(signal, impulse.channel(ch)))
        .collect();
    let scale = expected
        .iter()
        .flatten()
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
        .max(1e-12);

    println!(
        "Verifying {} channel(s): {} impulse samples, {} input samples, blocks of {}",
        channels, args.impulse_len, args.input_len, block_size
    );

    let mut reports = Vec::new();
    for kind in EngineKind::ALL {
        let mut engine = Engine::build(kind, &impulse, settings)?;
        let output = engine.render(&input, block_size, |_| {});

        let max_error = output
            .iter()
            .zip(&expected)
            .flat_map(|(got, want)| got.iter().zip(want))
            .fold(0.0f64, |acc, (&g, &w)| acc.max((f64::from(g) - w).abs()))
            / scale;

        reports.push(Report {
            kind,
            latency: engine.latency(),
            stages: engine.stages().len(),
            max_error,
        });
    }

    println!();
    println!(
        "  {:<10}  {:>7}  {:>6}  {:>12}  result",
        "engine", "latency", "stages", "max error"
    );
    let mut failures = 0;
    for report in &reports {
        let ok = report.max_error <= args.tolerance;
        if !ok {
            failures += 1;
        }
        println!(
            "  {:<10}  {:>7}  {:>6}  {:>12.3e}  {}",
            report.kind.name(),
            report.latency,
            report.stages,
            report.max_error,
            if ok { "ok" } else { "FAILED" }
        );
    }

    if failures > 0 {
        anyhow::bail!(
            "{failures} engine(s) exceeded tolerance {:.1e}",
            args.tolerance
        );
    }
    println!();
    println!("All engines agree within {:.1e}", args.tolerance);
    Ok(())
}
