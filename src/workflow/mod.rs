pub mod extraction_flow;
pub mod grading_flow;
pub mod job_ctx;

pub use extraction_flow::{resolve_mode, DocumentSource, ExtractionFlow, ModeDecision};
pub use grading_flow::{GradingFlow, SubmissionRequest};
pub use job_ctx::{JobCtx, SubmissionCtx};
