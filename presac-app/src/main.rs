mod app;
mod session;

use anyhow::Result;
use app::App;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Pre-saccadic attention presentation.
#[derive(Debug, Parser)]
#[command(name = "presac-app", version)]
struct Cli {
    /// Experiment configuration file
    #[arg(long, default_value = "expt_info.json")]
    expt_info: PathBuf,

    /// Seed for the trial order; drawn from the OS when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Run in a window instead of borderless fullscreen
    #[arg(long)]
    windowed: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let session = session::prepare(&cli.expt_info, cli.seed)?;
    App::new(session, !cli.windowed).run()
}
