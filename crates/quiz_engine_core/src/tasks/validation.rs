//! crates/quiz_engine_core/src/tasks/validation.rs

use async_trait::async_trait;
use serde_json::json;

use super::structured::StructuredGenerator;
use super::{Task, TaskContext, TaskResult};
use crate::domain::{GeneratedQuestion, ValidationResult};
use crate::ports::{CompletionOptions, ModelRole};
use crate::prompts::{self, VALIDATION_SYSTEM_PROMPT};

#[derive(Debug, Clone)]
pub struct ValidationInput {
    pub question: GeneratedQuestion,
    /// Raw chunk text the question must be grounded in.
    pub content: String,
}

/// Grades a drafted question against its source. The returned result always
/// has a decision consistent with its score.
pub struct ValidationTask {
    generator: StructuredGenerator,
}

impl ValidationTask {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Task for ValidationTask {
    type Input = ValidationInput;
    type Output = ValidationResult;

    async fn run(&self, input: &ValidationInput, ctx: &TaskContext) -> TaskResult<ValidationResult> {
        ctx.log("Validating question", Some(json!({ "concept": input.question.concept })));

        let context = prompts::build_context(&prompts::clean_reference_images(&input.content), None, None, None);
        let task = prompts::validation_task_prompt(&input.question);
        let messages = prompts::assemble(VALIDATION_SYSTEM_PROMPT, &context, &task);
        let options = CompletionOptions::for_role(ModelRole::Validation).with_temperature(0.0);

        let raw = self.generator.generate::<ValidationResult>(&messages, &options, ctx).await?;
        let result = raw.reconciled();

        ctx.log(
            "Validation finished",
            Some(json!({ "score": result.total_score, "approved": result.is_approved() })),
        );
        Ok(result)
    }
}
