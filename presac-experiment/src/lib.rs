pub mod builder;
pub mod config;
pub mod devices;
pub mod error;
pub mod results;
pub mod state;
pub mod stimuli;
pub mod trial;
pub use builder::build_trials;
pub use config::ExperimentConfig;
pub use devices::{DummyEyeTracker, EyeTracker, NullPort, TriggerPort};
pub use error::{PresentationError, TrialBuildError};
pub use state::{ExperimentEvent, ExperimentStateMachine, Key, SessionPlan, TriggerCodes};
pub use trial::{RunningTrial, TrialTimestamps};
