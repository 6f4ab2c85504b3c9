pub mod exam;
pub mod loaders;
pub mod progress;
pub mod question;

pub use exam::{
    AiSuggestion, AnswerValue, Answers, Exam, ExamQuestion, GradingDetail, GradingKind,
    GradingResult, MatchPair, Submission, SubmissionStatus, SuggestionSource,
};
pub use loaders::{load_answer_sheet, load_exam, AnswerSheet};
pub use progress::{
    ExtractionStage, ExtractionSummary, GradingStage, JobMode, ProgressEvent, ProgressStage,
    StreamItem,
};
pub use question::{CanonicalQuestion, ExtractedQuestion, QuestionType};
