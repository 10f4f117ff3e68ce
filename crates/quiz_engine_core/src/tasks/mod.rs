//! crates/quiz_engine_core/src/tasks/mod.rs
//!
//! The AI task pipeline: analysis, drafting, validation, revision and
//! follow-up. Each task is a small unit that talks to the language model
//! through `LanguageModelService` and returns a `TaskResult`; tasks never
//! panic and never leak provider errors as anything but a `TaskError` value.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::ports::PortError;

pub mod analysis;
pub mod drafting;
pub mod follow_up;
pub mod revision;
pub mod schema;
pub mod strategy;
pub mod structured;
pub mod validation;

pub use analysis::{AnalysisInput, AnalysisTask, ConceptMapResult};
pub use drafting::{DraftingInput, DraftingTask};
pub use follow_up::{FollowUpInput, FollowUpTask};
pub use revision::{RevisionInput, RevisionTask};
pub use schema::{QuestionDraft, ResponseSchema, SchemaError};
pub use strategy::{determine_node_strategy, course_category, CourseCategory, NodeStrategy};
pub use structured::StructuredGenerator;
pub use validation::{ValidationInput, ValidationTask};

//=========================================================================================
// Task Error and Result Types
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Language model call failed: {0}")]
    Provider(String),
    #[error("Model output could not be parsed as JSON")]
    Parse,
    #[error("Model output did not match the expected schema: {0}")]
    Schema(String),
    #[error("Port error: {0}")]
    Port(#[from] PortError),
}

pub type TaskResult<T> = Result<T, TaskError>;

//=========================================================================================
// Context and logging
//=========================================================================================

/// Receives progress messages from tasks, e.g. to stream them to a UI.
pub trait TaskLogger: Send + Sync {
    fn log(&self, message: &str, details: Option<&serde_json::Value>);
}

/// Per-run context passed to every task.
#[derive(Clone, Default)]
pub struct TaskContext {
    pub job_id: Option<Uuid>,
    pub logger: Option<Arc<dyn TaskLogger>>,
}

impl TaskContext {
    pub fn new(job_id: Uuid) -> Self {
        Self { job_id: Some(job_id), logger: None }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TaskLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Forwards to the attached logger, or to `tracing` when none is set.
    pub fn log(&self, message: &str, details: Option<serde_json::Value>) {
        match &self.logger {
            Some(logger) => logger.log(message, details.as_ref()),
            None => debug!(job_id = ?self.job_id, details = ?details, "[Task] {message}"),
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("job_id", &self.job_id)
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

//=========================================================================================
// Task contract
//=========================================================================================

#[async_trait]
pub trait Task: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    async fn run(&self, input: &Self::Input, ctx: &TaskContext) -> TaskResult<Self::Output>;
}
