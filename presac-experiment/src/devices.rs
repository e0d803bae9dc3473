//! Seams to the lab hardware: the MEG trigger port and the eye tracker.
//!
//! Only logging stand-ins live here; a lab build provides its own
//! implementations of these traits.

use crate::error::PresentationError;
use presac_core::Point;
use tracing::{debug, info};

/// Output port wired to the MEG acquisition trigger channel.
pub trait TriggerPort {
    fn set_data(&mut self, value: u8);
}

pub trait EyeTracker {
    fn startup(&mut self) -> Result<(), PresentationError>;

    /// Writes a trigger message into the eye-tracker recording.
    fn trigger(&mut self, code: i32);

    /// Latest gaze sample in eye-tracker coordinates, if there is one.
    fn newest_gaze(&mut self) -> Option<Point>;

    /// Blocks until the operator has accepted the drift check at `target`.
    fn drift_correct(&mut self, target: Point);

    fn shutdown(&mut self);
}

/// Port that only records the last value written.
#[derive(Debug, Default, Clone)]
pub struct NullPort {
    pub last: u8,
    pub writes: usize,
}

impl TriggerPort for NullPort {
    fn set_data(&mut self, value: u8) {
        if value != 0 {
            debug!(value, "port write");
        }
        self.last = value;
        self.writes += 1;
    }
}

/// Eye tracker for dry runs: gaze sits wherever `gaze` says, by default the
/// screen center.
#[derive(Debug, Clone)]
pub struct DummyEyeTracker {
    pub gaze: Option<Point>,
    pub triggers: Vec<i32>,
    pub drift_corrections: usize,
}

impl DummyEyeTracker {
    pub fn new(center: Point) -> Self {
        Self {
            gaze: Some(center),
            triggers: Vec::new(),
            drift_corrections: 0,
        }
    }
}

impl EyeTracker for DummyEyeTracker {
    fn startup(&mut self) -> Result<(), PresentationError> {
        info!("dummy eye tracker started");
        Ok(())
    }

    fn trigger(&mut self, code: i32) {
        info!(code, "trigger");
        self.triggers.push(code);
    }

    fn newest_gaze(&mut self) -> Option<Point> {
        self.gaze
    }

    fn drift_correct(&mut self, target: Point) {
        debug!(x = target.0, y = target.1, "drift correction");
        self.drift_corrections += 1;
    }

    fn shutdown(&mut self) {
        info!(triggers = self.triggers.len(), "dummy eye tracker stopped");
    }
}
