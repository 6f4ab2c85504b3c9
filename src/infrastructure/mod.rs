pub mod progress_log;
pub mod store;

pub use progress_log::ProgressLog;
pub use store::{
    DocumentRenderer, ExamStore, MemoryExamStore, MemoryQuestionStore, PassthroughRenderer,
    QuestionStore,
};
