pub mod align;
pub mod annotations;
pub mod artifacts;
pub mod behavior;
pub mod error;
pub mod eyelink;
pub mod load;
pub mod meg;
pub mod signal;
pub mod subject;

pub use align::{
    AlignConfig, AlignedFixation, Alignment, DriftStats, TargetClassifier, Unresolved,
    WithinDistance, align, write_fixation_table,
};
pub use annotations::Annotation;
pub use artifacts::{
    ArtifactOutcome, ArtifactPaths, BadSegmentAnnotator, IcaBackend, IcaModel, Prompt,
    identify_artifacts,
};
pub use behavior::BehaviorRow;
pub use error::AnalysisError;
pub use eyelink::EyelinkData;
pub use load::{SubjectData, load_subject};
pub use meg::{MegRecording, find_events, write_events};
pub use signal::SensorData;
pub use subject::{SubjectPaths, SubjectRow};
