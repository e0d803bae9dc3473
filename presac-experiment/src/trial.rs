use presac_core::{TrialDescriptor, TrialRecord, TrialState};

/// The trial being presented, with its outcome so far.
#[derive(Debug, Clone)]
pub struct RunningTrial<T> {
    pub record: TrialRecord,
    pub state: TrialState,
    pub timestamps: TrialTimestamps<T>,
}

#[derive(Debug, Clone)]
pub struct TrialTimestamps<T> {
    pub fixation_start: T,
    /// Start of the current uninterrupted fixation on the center
    pub hold_start: T,
    pub stimulus_start: Option<T>,
    pub probe_start: Option<T>,
    pub iti_start: Option<T>,
}

impl<T: Copy> RunningTrial<T> {
    pub fn new(trial: TrialDescriptor, now: T) -> Self {
        Self {
            record: TrialRecord::new(trial),
            state: TrialState::Fixation,
            timestamps: TrialTimestamps {
                fixation_start: now,
                hold_start: now,
                stimulus_start: None,
                probe_start: None,
                iti_start: None,
            },
        }
    }

    pub fn descriptor(&self) -> &TrialDescriptor {
        &self.record.trial
    }
}
