//! crates/quiz_engine_core/src/tasks/analysis.rs

use async_trait::async_trait;
use serde_json::json;

use super::structured::StructuredGenerator;
use super::{Task, TaskContext, TaskResult};
use crate::allocation::calculate_dynamic_quota;
use crate::domain::Importance;
use crate::ports::{CompletionOptions, ModelRole};
use crate::prompts;

pub use super::schema::ConceptMapResult;

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub content: String,
    pub course_name: String,
    pub section_title: String,
    pub importance: Importance,
    pub word_count: u32,
    pub meaningful_word_count: Option<u32>,
    /// Concept density in [0, 1], if known from earlier processing.
    pub density_score: Option<f64>,
}

/// Turns a chunk into a concept map, a difficulty index and protected pool quotas.
pub struct AnalysisTask {
    generator: StructuredGenerator,
}

impl AnalysisTask {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Task for AnalysisTask {
    type Input = AnalysisInput;
    type Output = ConceptMapResult;

    async fn run(&self, input: &AnalysisInput, ctx: &TaskContext) -> TaskResult<ConceptMapResult> {
        let meaningful = input.meaningful_word_count.unwrap_or(input.word_count);
        let target = calculate_dynamic_quota(meaningful, input.density_score.unwrap_or(0.5));

        ctx.log(
            "Analysing chunk",
            Some(json!({
                "course": input.course_name,
                "section": input.section_title,
                "importance": input.importance.as_str(),
                "target_concepts": target.antrenman,
            })),
        );

        let system = prompts::analysis_system_prompt(
            &input.section_title,
            &input.course_name,
            input.importance,
            target.antrenman,
        );
        let context = prompts::build_context(&prompts::clean_reference_images(&input.content), None, None, None);
        let messages = prompts::assemble(&system, &context, &prompts::analysis_task_prompt(input.importance));

        let options = CompletionOptions::for_role(ModelRole::Analysis).with_max_tokens(8192);
        self.generator.generate::<ConceptMapResult>(&messages, &options, ctx).await
    }
}
