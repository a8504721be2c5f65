//! Convolvo CLI - plan, render, verify and benchmark the convolution engines.

mod commands;
mod settings;
mod signals;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use settings::EngineArgs;

#[derive(Parser)]
#[command(name = "convolvo")]
#[command(author, version, about = "Convolvo partitioned convolution CLI", long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how an impulse is partitioned across stages
    Plan(commands::plan::PlanArgs),

    /// Convolve a synthetic signal and write a WAV file
    Render(commands::render::RenderArgs),

    /// Check every engine against direct convolution
    Verify(commands::verify::VerifyArgs),

    /// Measure processing speed
    Bench(commands::bench::BenchArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();
    let settings = cli.engine.resolve()?;
    tracing::debug!(?settings, "engine settings");

    match cli.command {
        Commands::Plan(args) => commands::plan::run(args, &settings),
        Commands::Render(args) => commands::render::run(args, &settings),
        Commands::Verify(args) => commands::verify::run(args, &settings),
        Commands::Bench(args) => commands::bench::run(args, &settings),
    }
}
