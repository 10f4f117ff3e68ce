//! services/quiz_worker/src/pipeline/follow_up.rs
//!
//! Remediation questions generated after a wrong or blank answer. They are
//! saved as training questions owned by the learner and linked to the
//! question that was missed.

use quiz_engine_core::domain::{NewQuestion, StoredQuestion, UsageType};
use quiz_engine_core::tasks::{FollowUpInput, FollowUpTask, StructuredGenerator, Task, TaskContext};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::generation::GenerationError;
use super::state::AppState;

#[derive(Debug, Clone)]
pub struct FollowUpRequest {
    pub user_id: Uuid,
    pub original: StoredQuestion,
    /// `None` when the learner left the question blank.
    pub incorrect_index: Option<usize>,
}

/// Generates and saves one follow-up. `Ok(None)` means the model produced
/// nothing usable; storage problems come back as errors.
pub async fn generate_follow_up(
    state: &AppState,
    request: FollowUpRequest,
) -> Result<Option<StoredQuestion>, GenerationError> {
    let original = &request.original;
    let chunk = state
        .content
        .get_chunk(original.chunk_id)
        .await?
        .ok_or(GenerationError::ChunkNotFound(original.chunk_id))?;
    let guidelines = state.content.get_guidelines(chunk.course_id).await?;

    let input = FollowUpInput {
        user_id: request.user_id,
        chunk_id: chunk.id,
        original_question_id: original.id,
        original: original.question.clone(),
        incorrect_index: request.incorrect_index,
        evidence: original.question.evidence.clone(),
        chunk_content: chunk.content.clone(),
        course_name: chunk.course_name.clone(),
        section_title: chunk.section_title.clone(),
        guidelines,
    };

    let task = FollowUpTask::new(StructuredGenerator::new(state.llm.clone()), state.questions.clone());
    let question = match task.run(&input, &TaskContext::new(chunk.id)).await {
        Ok(q) => q,
        Err(e) => {
            warn!(question_id = %original.id, error = %e, "Follow-up generation failed");
            return Ok(None);
        }
    };

    let id = state
        .questions
        .save_question(NewQuestion {
            id: Uuid::new_v4(),
            chunk_id: chunk.id,
            course_id: chunk.course_id,
            section_title: chunk.section_title.clone(),
            usage_type: UsageType::Antrenman,
            question: question.clone(),
            created_by: Some(request.user_id),
            parent_question_id: Some(original.id),
        })
        .await?;
    info!(parent = %original.id, follow_up = %id, "Follow-up question saved");

    Ok(Some(StoredQuestion {
        id,
        chunk_id: chunk.id,
        course_id: chunk.course_id,
        usage_type: UsageType::Antrenman,
        question,
        parent_question_id: Some(original.id),
    }))
}

/// Fire-and-forget follow-up generation. A produced question is sent on
/// `deliver`; a closed receiver just means the quiz already ended.
pub fn spawn_follow_up(
    state: AppState,
    request: FollowUpRequest,
    deliver: mpsc::UnboundedSender<StoredQuestion>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let parent = request.original.id;
        match generate_follow_up(&state, request).await {
            Ok(Some(question)) => {
                let _ = deliver.send(question);
            }
            Ok(None) => {}
            Err(e) => error!(%parent, error = %e, "Follow-up pipeline failed"),
        }
    })
}

