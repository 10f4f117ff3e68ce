//! crates/quiz_engine_core/src/tasks/revision.rs

use async_trait::async_trait;

use super::schema::QuestionDraft;
use super::structured::StructuredGenerator;
use super::{Task, TaskContext, TaskResult};
use crate::domain::{GeneratedQuestion, ValidationResult};
use crate::ports::{CompletionOptions, ModelRole};
use crate::prompts::{self, GLOBAL_SYSTEM_PROMPT};

#[derive(Debug, Clone)]
pub struct RevisionInput {
    pub question: GeneratedQuestion,
    pub validation: ValidationResult,
    pub shared_context: String,
}

/// Rewrites a rejected question. Bloom level, image and concept carry over
/// from the original.
pub struct RevisionTask {
    generator: StructuredGenerator,
}

impl RevisionTask {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Task for RevisionTask {
    type Input = RevisionInput;
    type Output = GeneratedQuestion;

    async fn run(&self, input: &RevisionInput, ctx: &TaskContext) -> TaskResult<GeneratedQuestion> {
        ctx.log("Revising question", None);

        let task = prompts::revision_task_prompt(&input.question, &input.validation);
        let messages = prompts::assemble(GLOBAL_SYSTEM_PROMPT, &input.shared_context, &task);
        let options = CompletionOptions::for_role(ModelRole::Drafting).with_temperature(0.1);

        let draft = self.generator.generate::<QuestionDraft>(&messages, &options, ctx).await?;
        let mut revised = draft.into_question(input.question.bloom_level, input.question.concept.clone());
        revised.image_index = input.question.image_index;
        Ok(revised)
    }
}
