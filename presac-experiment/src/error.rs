use presac_core::ConfigError;
use presac_timing::FrameRateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrialBuildError {
    #[error("stimulus pool needs at least 3 distinct images, got {0}")]
    TooFewStimuli(usize),

    #[error("stimulus {0} is listed more than once")]
    DuplicateStimulus(String),

    #[error("probe probability is {0} but no probe words were given")]
    NoProbeWords(f64),

    #[error("could not remove duplicate stimuli within {rounds} rounds (repetition {repetition})")]
    ShuffleExhausted { repetition: usize, rounds: usize },
}

#[derive(Debug, Error)]
pub enum PresentationError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid presentation config: {0}")]
    Config(String),

    #[error(transparent)]
    Expt(#[from] ConfigError),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid stimulus list: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to write results: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    TrialBuild(#[from] TrialBuildError),

    #[error("refresh rate check failed: {0}")]
    FrameRate(#[from] FrameRateError),

    #[error("eye tracker: {0}")]
    EyeTracker(String),
}
