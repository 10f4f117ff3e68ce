pub mod db;
pub mod llm;
pub mod rate_limit;

pub use db::DbAdapter;
pub use llm::{ModelRouting, OpenAiLlmAdapter};
pub use rate_limit::RateLimitedLlm;
