//! crates/quiz_engine_core/src/ports.rs
//!
//! Defines the service contracts (traits) the quiz engine depends on.
//! Content, persistence and the language model sit behind these traits so the
//! pipeline and scoring logic stay independent of Postgres or any provider SDK.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ChunkMastery, ChunkStatus, Concept, ContentChunk, NewQuestion, QuestionAttempt, QuotaSet,
    StoredQuestion, SubjectGuidelines, UsageType, UserQuestionStatus,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Language model provider failed: {0}")]
    Provider(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Language model types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Which configured model a call should go to. Adapters map roles to concrete model names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Analysis,
    Drafting,
    Validation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub role: ModelRole,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response where supported.
    pub json_mode: bool,
}

impl CompletionOptions {
    pub fn for_role(role: ModelRole) -> Self {
        Self { role, temperature: 0.3, max_tokens: None, json_mode: true }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Returns `None` for an unknown chunk.
    async fn get_chunk(&self, chunk_id: Uuid) -> PortResult<Option<ContentChunk>>;

    async fn update_chunk_analysis(
        &self,
        chunk_id: Uuid,
        difficulty_index: u8,
        concept_map: &[Concept],
        quotas: QuotaSet,
    ) -> PortResult<()>;

    async fn update_chunk_status(&self, chunk_id: Uuid, status: ChunkStatus) -> PortResult<()>;

    async fn get_guidelines(&self, course_id: Uuid) -> PortResult<Option<SubjectGuidelines>>;
}

#[async_trait]
pub trait LanguageModelService: Send + Sync {
    /// Sends a chat transcript and returns the raw text of the first choice.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> PortResult<String>;
}

/// Persistence for the question pool and per-user progress.
/// Every write is an upsert; reads return `None` instead of erroring on a missing row.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn save_question(&self, question: NewQuestion) -> PortResult<Uuid>;

    async fn get_question(&self, question_id: Uuid) -> PortResult<Option<StoredQuestion>>;

    async fn get_questions_by_chunk(
        &self,
        chunk_id: Uuid,
        usage_type: Option<UsageType>,
    ) -> PortResult<Vec<StoredQuestion>>;

    async fn get_user_question_status(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<UserQuestionStatus>>;

    async fn upsert_user_question_status(&self, status: &UserQuestionStatus) -> PortResult<()>;

    async fn get_chunk_mastery(
        &self,
        user_id: Uuid,
        chunk_id: Uuid,
    ) -> PortResult<Option<ChunkMastery>>;

    async fn upsert_chunk_mastery(&self, mastery: &ChunkMastery) -> PortResult<()>;

    async fn record_attempt(&self, attempt: &QuestionAttempt) -> PortResult<()>;

    /// Distinct questions of the chunk this user has answered at least once.
    async fn count_unique_solved(&self, user_id: Uuid, chunk_id: Uuid) -> PortResult<u32>;

    /// Most recent non-empty diagnoses recorded for the user on this chunk, newest first.
    async fn get_recent_diagnoses(
        &self,
        user_id: Uuid,
        chunk_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<String>>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Current number of stored questions per usage pool for the chunk.
    async fn get_usage_counts(&self, chunk_id: Uuid) -> PortResult<QuotaSet>;
}
