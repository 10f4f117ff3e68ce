//! services/quiz_worker/src/pipeline/state.rs
//!
//! Defines the shared state handed to every pipeline component.

use std::sync::Arc;

use quiz_engine_core::ports::{ContentSource, LanguageModelService, QuestionRepository, QuotaStore};

/// The shared application state, created once at startup and cloned into every task.
#[derive(Clone)]
pub struct AppState {
    pub content: Arc<dyn ContentSource>,
    pub questions: Arc<dyn QuestionRepository>,
    pub quotas: Arc<dyn QuotaStore>,
    pub llm: Arc<dyn LanguageModelService>,
}

impl AppState {
    /// Builds the state from one adapter that serves every persistence port.
    pub fn from_store<S>(store: Arc<S>, llm: Arc<dyn LanguageModelService>) -> Self
    where
        S: ContentSource + QuestionRepository + QuotaStore + 'static,
    {
        Self { content: store.clone(), questions: store.clone(), quotas: store, llm }
    }
}
