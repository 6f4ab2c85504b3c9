pub mod grading;
pub mod merge_service;
pub mod prompts;
pub mod response_parser;
pub mod segmenter;

pub use grading::GradingEngine;
pub use merge_service::{merge_questions, MergeOutcome, RejectedEntry};
pub use response_parser::{parse_unit_response, UnitOutcome};
pub use segmenter::{augment_with_lead_in, normalize_text, Chunk, SegmenterConfig, TextSegmenter};
