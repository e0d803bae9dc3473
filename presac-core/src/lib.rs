pub mod config;
pub mod events;
pub mod geometry;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use config::{ConfigError, EventDict, ExptInfo, triggers};
pub use events::{Eye, Fixation, MegEvent, Trigger};
pub use geometry::{Point, ScreenGeometry};
pub use phase::{Screen, SessionPhase, TrialState};
pub use stimulus::{SLOTS, Slot, StimulusId};
pub use trial::{Response, TrialDescriptor, TrialRecord};
