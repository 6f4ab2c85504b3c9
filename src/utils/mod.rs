pub mod json_extract;
pub mod logging;

pub use json_extract::extract_json;
pub use logging::truncate_text;
