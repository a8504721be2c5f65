//! Real-time factor measurement.

use anyhow::Context;
use clap::Args;
use convolvo_core::{Output, Sample};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

use super::common::Engine;
use crate::settings::{EngineKind, EngineSettings};
use crate::signals::{InputSignal, decaying_impulse, input_signal};

#[derive(Args)]
pub struct BenchArgs {
    /// Engine to measure
    #[arg(long, value_enum, default_value_t = EngineKind::Threaded)]
    engine: EngineKind,

    /// Impulse length in seconds
    #[arg(long, default_value = "2.0")]
    impulse_seconds: f32,

    /// Audio to process, in seconds
    #[arg(long, default_value = "10.0")]
    seconds: f32,
}

pub fn run(args: BenchArgs, settings: &EngineSettings) -> anyhow::Result<()> {
    let impulse_len = settings.seconds_to_samples(args.impulse_seconds).max(1);
    let total = settings.seconds_to_samples(args.seconds);
    let block_size = settings.known_block_size;
    let channels = settings.channels;

    let impulse = decaying_impulse(
        impulse_len,
        channels,
        settings.sample_rate,
        args.impulse_seconds,
        1,
    );

    let setup = Instant::now();
    let mut engine = Engine::build(args.engine, &impulse, settings)?;
    let setup_time = setup.elapsed();

    // One second of noise, looped.
    let source = input_signal(
        InputSignal::Noise,
        settings.sample_rate as usize,
        channels,
        settings.sample_rate,
        1,
    );
    let source_len = source.first().map_or(0, Vec::len).max(1);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .context("progress bar template")?
            .progress_chars("##-"),
    );

    let mut processed = 0;
    let mut worst_block = Duration::ZERO;
    let mut checksum = 0.0f64;
    let start = Instant::now();
    while processed < total {
        let offset = processed % source_len;
        let len = block_size.min(total - processed).min(source_len - offset);
        let block: Vec<&[Sample]> = source.iter().map(|c| &c[offset..offset + len]).collect();

        let block_start = Instant::now();
        let convolver = engine.convolver();
        convolver.add(&block, len);
        let ready = convolver.avail(len);
        if let Some(&first) = Output::new(&*convolver).channel(0).first() {
            checksum += f64::from(first);
        }
        convolver.advance(ready);
        worst_block = worst_block.max(block_start.elapsed());

        processed += len;
        pb.set_position(processed as u64);
    }
    let elapsed = start.elapsed();
    pb.finish_and_clear();

    let audio_seconds = total as f64 / f64::from(settings.sample_rate);
    let block_budget = block_size as f64 / f64::from(settings.sample_rate);
    let realtime_factor = audio_seconds / elapsed.as_secs_f64().max(1e-9);

    tracing::debug!(checksum, "benchmark finished");
    println!(
        "{} engine: {:.2} s impulse, {} ch, blocks of {}",
        args.engine.name(),
        args.impulse_seconds,
        channels,
        block_size
    );
    println!("  Setup:          {:.1} ms", setup_time.as_secs_f64() * 1000.0);
    println!(
        "  Processed:      {:.2} s of audio in {:.3} s",
        audio_seconds,
        elapsed.as_secs_f64()
    );
    println!("  Real-time:      {realtime_factor:.1}x");
    println!(
        "  Worst block:    {:.3} ms of {:.3} ms budget",
        worst_block.as_secs_f64() * 1000.0,
        block_budget * 1000.0
    );
    if engine.is_threaded() {
        println!("  Overflow stage on worker thread");
    }

    Ok(())
}
