//! Render a synthetic signal through an engine into a WAV file.

use anyhow::Context;
use clap::Args;
use hound::{SampleFormat, WavSpec, WavWriter};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use super::common::{Engine, pad};
use crate::settings::{EngineKind, EngineSettings};
use crate::signals::{InputSignal, decaying_impulse, input_signal, linear_to_db, peak};

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Input signal
    #[arg(long, value_enum, default_value_t = InputSignal::Clicks)]
    input: InputSignal,

    /// Input duration in seconds
    #[arg(long, default_value = "2.0")]
    seconds: f32,

    /// Impulse length in seconds
    #[arg(long, default_value = "1.0")]
    impulse_seconds: f32,

    /// Impulse decay time (-60 dB) in seconds
    #[arg(long, default_value = "0.6")]
    decay: f32,

    /// Engine to render with
    #[arg(long, value_enum, default_value_t = EngineKind::Threaded)]
    engine: EngineKind,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,

    /// Noise seed
    #[arg(long, default_value = "1")]
    seed: u32,
}

pub fn run(args: RenderArgs, settings: &EngineSettings) -> anyhow::Result<()> {
    if !matches!(args.bit_depth, 16 | 24 | 32) {
        anyhow::bail!("unsupported bit depth {} (expected 16, 24 or 32)", args.bit_depth);
    }

    let input_len = settings.seconds_to_samples(args.seconds);
    let impulse_len = settings.seconds_to_samples(args.impulse_seconds).max(1);
    let channels = settings.channels;

    let impulse = decaying_impulse(
        impulse_len,
        channels,
        settings.sample_rate,
        args.decay,
        args.seed,
    );
    let mut input = input_signal(args.input, input_len, channels, settings.sample_rate, args.seed);
    // Let the impulse ring out past the end of the input.
    pad(&mut input, impulse_len);
    let total = input_len + impulse_len;

    let mut engine = Engine::build(args.engine, &impulse, settings)?;
    tracing::info!(
        engine = args.engine.name(),
        input_len,
        impulse_len,
        channels,
        latency = engine.latency(),
        "rendering"
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .context("progress bar template")?
            .progress_chars("##-"),
    );
    let output = engine.render(&input, settings.known_block_size, |pos| {
        pb.set_position(pos as u64);
    });
    pb.finish_and_clear();

    write_interleaved(&args.output, &output, settings.sample_rate, args.bit_depth)
        .with_context(|| format!("writing {}", args.output.display()))?;

    let output_peak = output.iter().map(|c| peak(c)).fold(0.0f32, f32::max);
    println!(
        "Wrote {} ({} frames, {} ch, {} Hz)",
        args.output.display(),
        total,
        channels,
        settings.sample_rate
    );
    println!("  Peak {:.1} dB", linear_to_db(output_peak));
    if output_peak > 1.0 {
        println!("  Warning: output exceeds full scale");
    }

    Ok(())
}

/// Writes per-channel samples as one interleaved WAV file.
fn write_interleaved(
    path: &Path,
    channels: &[Vec<f32>],
    sample_rate: u32,
    bits_per_sample: u16,
) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample,
        sample_format: if bits_per_sample == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };
    let mut writer = WavWriter::create(path, spec)?;
    let frames = channels.first().map_or(0, Vec::len);

    if bits_per_sample == 32 {
        for i in 0..frames {
            for channel in channels {
                writer.write_sample(channel[i])?;
            }
        }
    } else {
        let max_val = (1i32 << (bits_per_sample - 1)) as f32;
        for i in 0..frames {
            for channel in channels {
                let int_sample = (channel[i] * max_val).clamp(-max_val, max_val - 1.0) as i32;
                writer.write_sample(int_sample)?;
            }
        }
    }

    writer.finalize()?;
    Ok(())
}
