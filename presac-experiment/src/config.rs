use crate::error::PresentationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Presentation settings, read from the `presentation` section of
/// `expt_info.json`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Refresh rate the display must run at; `None` skips the check
    pub expected_refresh_hz: Option<f64>,
    pub refresh_tolerance_ms: f64,
    pub refresh_check_frames: usize,

    pub stim_size_deg: f64,
    pub stim_dur_s: f64,
    pub response_cutoff_s: f64,
    pub iti_s: f64,
    pub fix_dur_range_s: (f64, f64),
    /// Settling time after the fixation dot appears before gaze is checked
    pub fix_settle_s: f64,
    pub fix_thresh_deg: f64,
    pub p_probe: f64,
    pub n_reps_per_loc: usize,
    pub block_length: usize,
    pub max_shuffle_iter: usize,
    pub port_reset_ms: u64,
    pub goodbye_timeout_s: f64,

    pub log_dir: PathBuf,
    pub stim_dir: PathBuf,
    pub stimuli_file: PathBuf,
    pub probes_file: PathBuf,
    pub instructions_file: PathBuf,
    pub font_path: PathBuf,
    pub text_height_px: f32,
    pub fixation_radius_px: f32,
    pub drift_fixation_radius_px: f32,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            expected_refresh_hz: Some(120.0),
            refresh_tolerance_ms: 0.1,
            refresh_check_frames: 120,
            stim_size_deg: 2.0,
            stim_dur_s: 2.0,
            response_cutoff_s: 4.0,
            iti_s: 0.2,
            fix_dur_range_s: (0.5, 1.0),
            fix_settle_s: 0.2,
            fix_thresh_deg: 1.0,
            p_probe: 0.5,
            n_reps_per_loc: 2,
            block_length: 25,
            max_shuffle_iter: 100,
            port_reset_ms: 3,
            goodbye_timeout_s: 30.0,
            log_dir: PathBuf::from("../logfiles/"),
            stim_dir: PathBuf::from("../stimuli/"),
            stimuli_file: PathBuf::from("stimuli.yaml"),
            probes_file: PathBuf::from("probes.txt"),
            instructions_file: PathBuf::from("instruct.txt"),
            font_path: PathBuf::from("assets/DejaVuSans.ttf"),
            text_height_px: 32.0,
            fixation_radius_px: 10.0,
            drift_fixation_radius_px: 5.0,
        }
    }
}

#[derive(Deserialize)]
struct ExptFile {
    #[serde(default)]
    presentation: ExperimentConfig,
}

impl ExperimentConfig {
    pub fn from_expt_file<P: AsRef<Path>>(path: P) -> Result<Self, PresentationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PresentationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_expt_json(&text)
    }

    pub fn from_expt_json(text: &str) -> Result<Self, PresentationError> {
        let file: ExptFile = serde_json::from_str(text)?;
        file.presentation.validate()?;
        Ok(file.presentation)
    }

    pub fn validate(&self) -> Result<(), PresentationError> {
        if !(0.0..=1.0).contains(&self.p_probe) {
            return Err(PresentationError::Config(format!(
                "p_probe must be in [0, 1], got {}",
                self.p_probe
            )));
        }
        let (lo, hi) = self.fix_dur_range_s;
        if lo < 0.0 || lo > hi {
            return Err(PresentationError::Config(format!(
                "fix_dur_range_s must be an ordered non-negative range, got ({lo}, {hi})"
            )));
        }
        if self.block_length == 0 {
            return Err(PresentationError::Config(
                "block_length must be > 0".to_string(),
            ));
        }
        if let Some(hz) = self.expected_refresh_hz {
            if hz <= 0.0 {
                return Err(PresentationError::Config(format!(
                    "expected_refresh_hz must be > 0, got {hz}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_section_uses_defaults() {
        let config = ExperimentConfig::from_expt_json(r#"{"stim_dur": 2.0}"#).unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn section_overrides_selected_fields() {
        let config = ExperimentConfig::from_expt_json(
            r#"{"presentation": {"n_reps_per_loc": 3, "expected_refresh_hz": null}}"#,
        )
        .unwrap();
        assert_eq!(config.n_reps_per_loc, 3);
        assert_eq!(config.expected_refresh_hz, None);
        assert_eq!(config.block_length, 25);
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let err = ExperimentConfig::from_expt_json(r#"{"presentation": {"p_probe": 1.5}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("p_probe"));
    }

    #[test]
    fn rejects_reversed_fixation_range() {
        let err = ExperimentConfig::from_expt_json(
            r#"{"presentation": {"fix_dur_range_s": [1.0, 0.5]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("fix_dur_range_s"));
    }
}
