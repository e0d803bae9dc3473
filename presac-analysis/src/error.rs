use presac_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stimulus onsets differ between clocks: {meg} in the MEG stream, {eye} in the eye-tracker stream")]
    TrialCountMismatch { meg: usize, eye: usize },

    #[error("behavioral log has no row for trial {0}")]
    MissingTrial(usize),

    #[error("required file {0} does not exist")]
    MissingFile(PathBuf),

    #[error("subject {index} is not in the subject table ({rows} rows)")]
    UnknownSubject { index: usize, rows: usize },

    #[error("decimation factor must be an integer > 1, got {0}")]
    DecimationFactor(usize),

    #[error("invalid data: {0}")]
    Invalid(String),

    #[error("ICA backend failed: {0}")]
    Ica(String),
}

impl AnalysisError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }
}
