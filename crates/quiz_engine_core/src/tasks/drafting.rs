//! crates/quiz_engine_core/src/tasks/drafting.rs

use async_trait::async_trait;
use serde_json::json;

use super::schema::QuestionDraft;
use super::strategy::determine_node_strategy;
use super::structured::StructuredGenerator;
use super::{Task, TaskContext, TaskResult};
use crate::domain::{Concept, GeneratedQuestion, UsageType};
use crate::ports::{CompletionOptions, ModelRole};
use crate::prompts::{self, GLOBAL_SYSTEM_PROMPT};

#[derive(Debug, Clone)]
pub struct DraftingInput {
    pub concept: Concept,
    /// Position of the concept in the chunk's concept map.
    pub index: usize,
    pub course_name: String,
    pub usage_type: UsageType,
    pub previous_diagnoses: Vec<String>,
    /// Context message shared by every call for this chunk.
    pub shared_context: String,
}

/// Drafts one five-option question for one concept.
pub struct DraftingTask {
    generator: StructuredGenerator,
}

impl DraftingTask {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Task for DraftingTask {
    type Input = DraftingInput;
    type Output = GeneratedQuestion;

    async fn run(&self, input: &DraftingInput, ctx: &TaskContext) -> TaskResult<GeneratedQuestion> {
        let strategy = determine_node_strategy(input.index, Some(&input.concept), &input.course_name);
        ctx.log(
            &format!("Drafting question for: {}", input.concept.title),
            Some(json!({ "strategy": strategy.bloom_level.as_str(), "usage": input.usage_type.as_str() })),
        );

        let task = prompts::drafting_task_prompt(
            &input.concept,
            strategy.bloom_level,
            input.usage_type,
            &input.previous_diagnoses,
        );
        let messages = prompts::assemble(GLOBAL_SYSTEM_PROMPT, &input.shared_context, &task);
        let options = CompletionOptions::for_role(ModelRole::Drafting).with_temperature(0.1);

        let draft = self.generator.generate::<QuestionDraft>(&messages, &options, ctx).await?;
        Ok(draft.into_question(strategy.bloom_level, input.concept.title.clone()))
    }
}
