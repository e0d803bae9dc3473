//! Everything loaded from disk before the window opens.

use anyhow::{Context, Result};
use chrono::Local;
use presac_core::ExptInfo;
use presac_experiment::results::session_stamp;
use presac_experiment::stimuli::{load_lines, load_stimulus_pool};
use presac_experiment::{ExperimentConfig, SessionPlan, build_trials};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use tracing::info;

pub struct Session {
    pub info: ExptInfo,
    pub config: ExperimentConfig,
    pub plan: SessionPlan,
}

pub fn prepare(expt_info: &Path, seed: Option<u64>) -> Result<Session> {
    let info = ExptInfo::load(expt_info)
        .with_context(|| format!("loading {}", expt_info.display()))?;
    let config = ExperimentConfig::from_expt_file(expt_info)?;

    let pool = load_stimulus_pool(&config.stimuli_file)?;
    let probe_words = load_lines(&config.probes_file)?;
    let instructions = load_lines(&config.instructions_file)?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let trials = build_trials(&pool, &probe_words, &config, &mut rng)
        .context("generating the trial sequence")?;

    let stamp = session_stamp(&Local::now());
    info!(
        stimuli = pool.len(),
        probe_words = probe_words.len(),
        trials = trials.len(),
        %stamp,
        "session prepared"
    );

    Ok(Session {
        info,
        config,
        plan: SessionPlan {
            trials,
            instructions,
            stamp,
        },
    })
}
