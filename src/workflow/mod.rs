pub mod assignment_flow;
pub mod grading_ctx;
pub mod grading_flow;

pub use assignment_flow::{AssignmentFlow, PreparedAssignment};
pub use grading_ctx::GradingCtx;
pub use grading_flow::{GradingFlow, GradingOutcome};
