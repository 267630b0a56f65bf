pub mod evidence;
pub mod grading;
pub mod loaders;
pub mod manifest;
pub mod notification;

pub use evidence::EvidenceBlock;
pub use grading::{
    EvaluationResult, ExtractedText, ExtractionMethod, GradingRequest, ReferenceMaterial, Score,
};
pub use loaders::load_manifest;
pub use manifest::{AssignmentEntry, GradingManifest, SubmissionEntry};
pub use notification::{
    EvaluationCompletePayload, EventType, NewAssignmentPayload, NotificationEvent,
};
