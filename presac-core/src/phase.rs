use crate::geometry::Point;
use crate::stimulus::StimulusId;

/// Phases of one presentation session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    RefreshCheck,
    Instructions,
    Trials,
    DriftCorrect,
    BlockBreak,
    ConfirmQuit,
    Goodbye,
    Finished,
}

impl SessionPhase {
    /// Whether the experimenter keys (break, drift correction) are polled.
    pub fn polls_experimenter_keys(&self) -> bool {
        matches!(self, Self::Trials)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Stage of the trial currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Fixation,
    Stimuli,
    Probe,
    InterTrial,
}

/// What the display should currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Blank,
    Text(String),
    Fixation,
    DriftFixation,
    /// Stimuli with their centers in screen-centered coordinates (y up).
    Stimuli {
        stimuli: [StimulusId; 3],
        positions: [Point; 3],
    },
}
