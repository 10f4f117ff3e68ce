//! crates/quiz_engine_core/src/tasks/follow_up.rs

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::schema::QuestionDraft;
use super::structured::StructuredGenerator;
use super::{Task, TaskContext, TaskResult};
use crate::domain::{BloomLevel, GeneratedQuestion, SubjectGuidelines};
use crate::ports::{CompletionOptions, ModelRole, QuestionRepository};
use crate::prompts::{self, FollowUpPrompt, GLOBAL_SYSTEM_PROMPT};

/// Misses on the same question before the target level drops a tier.
pub const SCAFFOLDING_FAIL_THRESHOLD: u32 = 2;
pub const DIAGNOSIS_HISTORY_LIMIT: usize = 3;

#[derive(Debug, Clone)]
pub struct FollowUpInput {
    pub user_id: Uuid,
    pub chunk_id: Uuid,
    pub original_question_id: Uuid,
    pub original: GeneratedQuestion,
    /// `None` when the learner left the question blank.
    pub incorrect_index: Option<usize>,
    /// The single sentence the new correct answer must rest on.
    pub evidence: String,
    pub chunk_content: String,
    pub course_name: String,
    pub section_title: String,
    pub guidelines: Option<SubjectGuidelines>,
}

/// Generates a remediation question after a wrong answer.
pub struct FollowUpTask {
    generator: StructuredGenerator,
    repository: Arc<dyn QuestionRepository>,
}

impl FollowUpTask {
    pub fn new(generator: StructuredGenerator, repository: Arc<dyn QuestionRepository>) -> Self {
        Self { generator, repository }
    }
}

/// Target level for a follow-up, lowered one tier for a learner who keeps missing.
pub fn follow_up_level(original: BloomLevel, consecutive_fails: u32) -> (BloomLevel, Option<String>) {
    if consecutive_fails >= SCAFFOLDING_FAIL_THRESHOLD {
        let lowered = original.step_down();
        (lowered, Some(prompts::scaffolding_note(consecutive_fails, lowered)))
    } else {
        (original, None)
    }
}

#[async_trait]
impl Task for FollowUpTask {
    type Input = FollowUpInput;
    type Output = GeneratedQuestion;

    async fn run(&self, input: &FollowUpInput, ctx: &TaskContext) -> TaskResult<GeneratedQuestion> {
        ctx.log("Generating follow-up question", Some(json!({ "concept": input.original.concept })));

        let consecutive_fails = self
            .repository
            .get_user_question_status(input.user_id, input.original_question_id)
            .await?
            .map(|s| s.consecutive_fails)
            .unwrap_or(0);
        let (target_bloom, scaffolding_note) = follow_up_level(input.original.bloom_level, consecutive_fails);

        let previous_diagnoses = self
            .repository
            .get_recent_diagnoses(input.user_id, input.chunk_id, DIAGNOSIS_HISTORY_LIMIT)
            .await?;

        let context = prompts::build_context(
            &prompts::clean_reference_images(&input.chunk_content),
            Some(&input.course_name),
            Some(&input.section_title),
            input.guidelines.as_ref(),
        );
        let task = prompts::follow_up_task_prompt(&FollowUpPrompt {
            evidence: &input.evidence,
            original: &input.original,
            incorrect_index: input.incorrect_index,
            target_bloom,
            scaffolding_note,
            previous_diagnoses: &previous_diagnoses,
        });
        let messages = prompts::assemble(GLOBAL_SYSTEM_PROMPT, &context, &task);
        let options = CompletionOptions::for_role(ModelRole::Drafting).with_temperature(0.1);

        let draft = self.generator.generate::<QuestionDraft>(&messages, &options, ctx).await?;
        let mut question = draft.into_question(target_bloom, input.original.concept.clone());
        question.image_index = input.original.image_index;
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffolding_kicks_in_after_two_misses() {
        assert_eq!(follow_up_level(BloomLevel::Analysis, 1), (BloomLevel::Analysis, None));

        let (level, note) = follow_up_level(BloomLevel::Analysis, 2);
        assert_eq!(level, BloomLevel::Application);
        assert!(note.unwrap().contains("application"));

        assert_eq!(follow_up_level(BloomLevel::Knowledge, 5).0, BloomLevel::Knowledge);
    }
}
