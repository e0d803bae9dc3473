use crate::stimulus::{Slot, StimulusId};
use serde::{Deserialize, Serialize};

/// Immutable description of one trial, produced by the trial builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDescriptor {
    pub index: usize,
    pub stim_left: StimulusId,
    pub stim_center: StimulusId,
    pub stim_right: StimulusId,
    pub probe_word: Option<String>,
    /// Fixation hold duration in seconds
    pub fix_dur: f64,
}

impl TrialDescriptor {
    pub fn stimulus(&self, slot: Slot) -> &StimulusId {
        match slot {
            Slot::Left => &self.stim_left,
            Slot::Center => &self.stim_center,
            Slot::Right => &self.stim_right,
        }
    }

    pub fn stimuli(&self) -> [StimulusId; 3] {
        [
            self.stim_left.clone(),
            self.stim_center.clone(),
            self.stim_right.clone(),
        ]
    }

    pub fn has_duplicate(&self) -> bool {
        self.stim_left == self.stim_center
            || self.stim_left == self.stim_right
            || self.stim_center == self.stim_right
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub key: String,
    /// Reaction time in seconds from probe onset
    pub rt: f64,
}

/// Outcome of a presented trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: TrialDescriptor,
    /// Seconds since session start
    pub stim_onset: Option<f64>,
    pub response: Option<Response>,
}

impl TrialRecord {
    pub fn new(trial: TrialDescriptor) -> Self {
        Self {
            trial,
            stim_onset: None,
            response: None,
        }
    }
}
