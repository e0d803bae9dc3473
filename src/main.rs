//! Offline tools for the pre-saccadic attention experiment: fixation
//! alignment, artifact identification and trial list previews.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "presac", version, about)]
struct Cli {
    /// Experiment configuration file
    #[arg(long, global = true, default_value = "expt_info.json")]
    expt_info: PathBuf,

    /// Entry of `data_dir` to use as the data root
    #[arg(long, global = true, default_value = "standard")]
    profile: String,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Align fixations of explicitly named files onto the MEG clock
    Align {
        /// MEG events file (.eve) or recording export (.csv)
        #[arg(long)]
        meg: PathBuf,
        /// EyeLink ASCII export
        #[arg(long)]
        eyelink: PathBuf,
        /// Session results log
        #[arg(long)]
        behav: PathBuf,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Count fixations within this many pixels of a stimulus as on target
        #[arg(long)]
        on_target_px: Option<f64>,
    },
    /// Load a subject from the subject table and write its fixation outputs
    Load {
        subject: usize,
        #[arg(long)]
        on_target_px: Option<f64>,
    },
    /// Mark bad segments and fit ICA for a subject
    Artifacts {
        subject: usize,
        /// External program fitting ICA
        #[arg(long)]
        ica_program: PathBuf,
        /// Extra arguments passed to the ICA program
        #[arg(long = "ica-arg")]
        ica_args: Vec<String>,
    },
    /// Generate a trial list with the presentation settings and print it
    Trials {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Decode a stimulus channel export into an events file
    Convert { recording: PathBuf, events: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Align {
            meg,
            eyelink,
            behav,
            out_dir,
            on_target_px,
        } => commands::align_files(&cli.expt_info, &meg, &eyelink, &behav, &out_dir, on_target_px),
        Command::Load {
            subject,
            on_target_px,
        } => commands::load(&cli.expt_info, &cli.profile, subject, on_target_px),
        Command::Artifacts {
            subject,
            ica_program,
            ica_args,
        } => commands::artifacts(&cli.expt_info, &cli.profile, subject, ica_program, ica_args),
        Command::Trials { seed, out } => commands::trials(&cli.expt_info, seed, out.as_deref()),
        Command::Convert { recording, events } => {
            commands::convert(&cli.expt_info, &recording, &events)
        }
    }
}
