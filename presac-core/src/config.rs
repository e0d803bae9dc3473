//! Experiment-wide settings shared by presentation and analysis, read from
//! `expt_info.json` once at startup.

use crate::geometry::{Point, ScreenGeometry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Names of the trigger codes looked up in `event_dict`.
pub mod triggers {
    pub const RESPONSE: &str = "response";
    pub const FIXATION: &str = "fixation";
    pub const STIMULI: &str = "stimuli";
    pub const PROBE: &str = "probe";
    pub const DRIFT_CORRECT_START: &str = "drift_correct_start";
    pub const DRIFT_CORRECT_END: &str = "drift_correct_end";
    pub const FIX_ON: &str = "fix_on";
    pub const FIX_OFF: &str = "fix_off";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no trigger code named {0:?} in event_dict")]
    MissingTrigger(String),

    #[error("no data directory configured for profile {0:?}")]
    UnknownProfile(String),

    #[error("data directory {0} does not exist")]
    MissingDataDir(PathBuf),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Mapping of named trigger codes to their integer values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventDict(BTreeMap<String, i32>);

impl EventDict {
    pub fn code(&self, name: &str) -> Result<i32, ConfigError> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::MissingTrigger(name.to_string()))
    }

    pub fn insert(&mut self, name: &str, code: i32) {
        self.0.insert(name.to_string(), code);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, i32)> for EventDict {
    fn from_iter<T: IntoIterator<Item = (String, i32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExptInfo {
    pub event_dict: EventDict,
    /// Data root per profile name
    pub data_dir: BTreeMap<String, PathBuf>,
    /// Seconds before stimulus onset kept as in-trial data
    pub pre_stim_dur: f64,
    /// Seconds after stimulus onset kept as in-trial data
    pub stim_dur: f64,
    pub fsample_eyelink: f64,
    pub stim_dist_deg: f64,
    #[serde(default = "default_trial_window_sec")]
    pub trial_window_sec: f64,
    #[serde(default = "default_stim_channel")]
    pub stim_channel: String,
    #[serde(default = "default_stim_mask")]
    pub stim_mask: i32,
    #[serde(default = "default_fsample_meg")]
    pub fsample_meg: f64,
    #[serde(default)]
    pub screen: ScreenGeometry,
}

fn default_trial_window_sec() -> f64 {
    4.5
}

fn default_stim_channel() -> String {
    "STI101".to_string()
}

// Upper bits carry response-box triggers that are not ours.
fn default_stim_mask() -> i32 {
    0b0011_1111
}

fn default_fsample_meg() -> f64 {
    1000.0
}

impl ExptInfo {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let info: ExptInfo = serde_json::from_str(text)?;
        info.validate()?;
        Ok(info)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fsample_eyelink.is_finite() && self.fsample_eyelink > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fsample_eyelink must be a positive number, got {}",
                self.fsample_eyelink
            )));
        }
        if !(self.fsample_meg.is_finite() && self.fsample_meg > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fsample_meg must be a positive number, got {}",
                self.fsample_meg
            )));
        }
        if !(self.trial_window_sec.is_finite() && self.trial_window_sec > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "trial_window_sec must be a positive number, got {}",
                self.trial_window_sec
            )));
        }
        Ok(())
    }

    pub fn code(&self, name: &str) -> Result<i32, ConfigError> {
        self.event_dict.code(name)
    }

    /// Data root for the profile chosen by the caller.
    pub fn data_dir(&self, profile: &str) -> Result<&Path, ConfigError> {
        self.data_dir
            .get(profile)
            .map(PathBuf::as_path)
            .ok_or_else(|| ConfigError::UnknownProfile(profile.to_string()))
    }

    /// Like [`ExptInfo::data_dir`], but the directory must exist.
    pub fn existing_data_dir(&self, profile: &str) -> Result<&Path, ConfigError> {
        let dir = self.data_dir(profile)?;
        if !dir.is_dir() {
            return Err(ConfigError::MissingDataDir(dir.to_path_buf()));
        }
        Ok(dir)
    }

    /// Length of the analysed trial window in eye-tracker samples.
    pub fn trial_window_samples(&self) -> i64 {
        (self.trial_window_sec * self.fsample_eyelink) as i64
    }

    pub fn slot_centers_eyelink(&self) -> [Point; 3] {
        self.screen.slot_centers_eyelink(self.stim_dist_deg)
    }
}
