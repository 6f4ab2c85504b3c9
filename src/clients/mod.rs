pub mod llm_client;
pub mod question_bank_client;

pub use llm_client::{AiOracle, OpenAiOracle};
pub use question_bank_client::QuestionBankClient;
