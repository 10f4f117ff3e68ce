//! crates/quiz_engine_core/src/tasks/structured.rs
//!
//! Structured generation: call the model, decode leniently, validate against a
//! schema, retry with a corrective message on failure.

use std::sync::Arc;

use serde_json::json;

use super::schema::ResponseSchema;
use super::{TaskContext, TaskError, TaskResult};
use crate::lenient_json::parse_json_response;
use crate::ports::{ChatMessage, CompletionOptions, LanguageModelService};
use crate::prompts::SCHEMA_RETRY_MESSAGE;

pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Clone)]
pub struct StructuredGenerator {
    llm: Arc<dyn LanguageModelService>,
    max_retries: u32,
    retry_message: String,
}

impl StructuredGenerator {
    pub fn new(llm: Arc<dyn LanguageModelService>) -> Self {
        Self { llm, max_retries: DEFAULT_MAX_RETRIES, retry_message: SCHEMA_RETRY_MESSAGE.to_string() }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Runs up to `1 + max_retries` attempts. Retries resend the original
    /// transcript plus one corrective user message.
    pub async fn generate<T: ResponseSchema>(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        ctx: &TaskContext,
    ) -> TaskResult<T> {
        let mut last_error = TaskError::Parse;

        for attempt in 0..=self.max_retries {
            let mut transcript = messages.to_vec();
            if attempt > 0 {
                transcript.push(ChatMessage::user(self.retry_message.clone()));
                ctx.log(&format!("Retry attempt #{attempt}"), None);
            }

            let raw = match self.llm.complete(&transcript, options).await {
                Ok(raw) => raw,
                Err(e) => {
                    ctx.log(
                        &format!("Generation failed (attempt {})", attempt + 1),
                        Some(json!({ "error": e.to_string() })),
                    );
                    last_error = TaskError::Provider(e.to_string());
                    continue;
                }
            };

            let Some(value) = parse_json_response(&raw, T::SHAPE) else {
                ctx.log(
                    &format!("JSON parse failed (attempt {})", attempt + 1),
                    Some(json!({ "raw_content": raw })),
                );
                last_error = TaskError::Parse;
                continue;
            };

            match T::from_json(value) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    ctx.log(
                        &format!("Schema validation failed (attempt {})", attempt + 1),
                        Some(json!({ "error": e.to_string(), "raw_content": raw })),
                    );
                    last_error = TaskError::Schema(e.0);
                }
            }
        }

        Err(last_error)
    }
}
