//! In-memory port implementations shared by the service integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quiz_engine_core::domain::{
    ChunkMastery, ChunkStatus, Concept, ContentChunk, GeneratedQuestion, BloomLevel, Importance, NewQuestion,
    QuestionAttempt, QuotaSet, StoredQuestion, SubjectGuidelines, UsageType, UserQuestionStatus,
};
use quiz_engine_core::ports::{
    ChatMessage, CompletionOptions, ContentSource, LanguageModelService, ModelRole, PortError, PortResult,
    QuestionRepository, QuotaStore,
};
use quiz_worker_lib::pipeline::{AppState, GenerationOrchestrator};
use uuid::Uuid;

//=========================================================================================
// Store
//=========================================================================================

#[derive(Default)]
pub struct InMemoryStore {
    pub chunks: Mutex<HashMap<Uuid, ContentChunk>>,
    pub questions: Mutex<Vec<(StoredQuestion, Option<Uuid>)>>,
    pub statuses: Mutex<HashMap<(Uuid, Uuid), UserQuestionStatus>>,
    pub mastery: Mutex<HashMap<(Uuid, Uuid), ChunkMastery>>,
    pub attempts: Mutex<Vec<QuestionAttempt>>,
    pub status_log: Mutex<Vec<ChunkStatus>>,
}

impl InMemoryStore {
    pub fn with_chunk(chunk: ContentChunk) -> Arc<Self> {
        let store = Self::default();
        store.chunks.lock().unwrap().insert(chunk.id, chunk);
        Arc::new(store)
    }

    pub fn chunk(&self, id: Uuid) -> ContentChunk {
        self.chunks.lock().unwrap()[&id].clone()
    }

    pub fn saved(&self) -> Vec<StoredQuestion> {
        self.questions.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn insert_question(&self, question: StoredQuestion) {
        self.questions.lock().unwrap().push((question, None));
    }

    pub fn status(&self, user_id: Uuid, question_id: Uuid) -> Option<UserQuestionStatus> {
        self.statuses.lock().unwrap().get(&(user_id, question_id)).cloned()
    }

    pub fn set_status(&self, status: UserQuestionStatus) {
        self.statuses.lock().unwrap().insert((status.user_id, status.question_id), status);
    }

    pub fn mastery_of(&self, user_id: Uuid, chunk_id: Uuid) -> Option<ChunkMastery> {
        self.mastery.lock().unwrap().get(&(user_id, chunk_id)).cloned()
    }
}

#[async_trait]
impl ContentSource for InMemoryStore {
    async fn get_chunk(&self, chunk_id: Uuid) -> PortResult<Option<ContentChunk>> {
        Ok(self.chunks.lock().unwrap().get(&chunk_id).cloned())
    }

    async fn update_chunk_analysis(
        &self,
        chunk_id: Uuid,
        difficulty_index: u8,
        concept_map: &[Concept],
        quotas: QuotaSet,
    ) -> PortResult<()> {
        let mut chunks = self.chunks.lock().unwrap();
        let chunk = chunks.get_mut(&chunk_id).ok_or_else(|| PortError::NotFound(chunk_id.to_string()))?;
        chunk.difficulty_index = Some(difficulty_index);
        chunk.concept_map = concept_map.to_vec();
        chunk.quotas = Some(quotas);
        Ok(())
    }

    async fn update_chunk_status(&self, chunk_id: Uuid, status: ChunkStatus) -> PortResult<()> {
        if let Some(chunk) = self.chunks.lock().unwrap().get_mut(&chunk_id) {
            chunk.status = status;
        }
        self.status_log.lock().unwrap().push(status);
        Ok(())
    }

    async fn get_guidelines(&self, _course_id: Uuid) -> PortResult<Option<SubjectGuidelines>> {
        Ok(None)
    }
}

#[async_trait]
impl QuestionRepository for InMemoryStore {
    async fn save_question(&self, question: NewQuestion) -> PortResult<Uuid> {
        let id = question.id;
        let mut questions = self.questions.lock().unwrap();
        if questions.iter().any(|(q, _)| q.id == id) {
            return Ok(id);
        }
        let stored = StoredQuestion {
            id,
            chunk_id: question.chunk_id,
            course_id: question.course_id,
            usage_type: question.usage_type,
            question: question.question,
            parent_question_id: question.parent_question_id,
        };
        questions.push((stored, question.created_by));
        Ok(id)
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Option<StoredQuestion>> {
        Ok(self.saved().into_iter().find(|q| q.id == question_id))
    }

    async fn get_questions_by_chunk(
        &self,
        chunk_id: Uuid,
        usage_type: Option<UsageType>,
    ) -> PortResult<Vec<StoredQuestion>> {
        Ok(self
            .saved()
            .into_iter()
            .filter(|q| q.chunk_id == chunk_id && usage_type.map_or(true, |u| q.usage_type == u))
            .collect())
    }

    async fn get_user_question_status(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<UserQuestionStatus>> {
        Ok(self.status(user_id, question_id))
    }

    async fn upsert_user_question_status(&self, status: &UserQuestionStatus) -> PortResult<()> {
        self.set_status(status.clone());
        Ok(())
    }

    async fn get_chunk_mastery(&self, user_id: Uuid, chunk_id: Uuid) -> PortResult<Option<ChunkMastery>> {
        Ok(self.mastery_of(user_id, chunk_id))
    }

    async fn upsert_chunk_mastery(&self, mastery: &ChunkMastery) -> PortResult<()> {
        self.mastery.lock().unwrap().insert((mastery.user_id, mastery.chunk_id), mastery.clone());
        Ok(())
    }

    async fn record_attempt(&self, attempt: &QuestionAttempt) -> PortResult<()> {
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(())
    }

    async fn count_unique_solved(&self, user_id: Uuid, chunk_id: Uuid) -> PortResult<u32> {
        let attempts = self.attempts.lock().unwrap();
        let unique: HashSet<Uuid> = attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.chunk_id == chunk_id)
            .map(|a| a.question_id)
            .collect();
        Ok(unique.len() as u32)
    }

    async fn get_recent_diagnoses(&self, user_id: Uuid, chunk_id: Uuid, limit: usize) -> PortResult<Vec<String>> {
        let attempts = self.attempts.lock().unwrap();
        Ok(attempts
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id && a.chunk_id == chunk_id)
            .filter_map(|a| a.diagnosis.clone())
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl QuotaStore for InMemoryStore {
    async fn get_usage_counts(&self, chunk_id: Uuid) -> PortResult<QuotaSet> {
        let mut counts = QuotaSet::default();
        for (q, _) in self.questions.lock().unwrap().iter() {
            if q.chunk_id == chunk_id {
                counts.increment(q.usage_type);
            }
        }
        Ok(counts)
    }
}

//=========================================================================================
// Language model
//=========================================================================================

/// Answers by role: drafts always succeed, validations replay a script and
/// then approve. Analysis replies come from their own queue.
#[derive(Default)]
pub struct ScriptedLlm {
    pub analysis: Mutex<VecDeque<PortResult<String>>>,
    pub validations: Mutex<VecDeque<String>>,
    pub drafts: Mutex<VecDeque<PortResult<String>>>,
    pub calls: Mutex<Vec<ModelRole>>,
    /// When set, validation calls never return.
    pub hold_validation: AtomicBool,
    /// Signalled when a held validation call starts.
    pub validation_entered: tokio::sync::Notify,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_analysis(&self, reply: PortResult<String>) {
        self.analysis.lock().unwrap().push_back(reply);
    }

    pub fn push_validation(&self, reply: &str) {
        self.validations.lock().unwrap().push_back(reply.to_string());
    }

    pub fn push_draft(&self, reply: PortResult<String>) {
        self.drafts.lock().unwrap().push_back(reply);
    }

    pub fn hold_validations(&self) {
        self.hold_validation.store(true, Ordering::SeqCst);
    }

    pub fn count(&self, role: ModelRole) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| **r == role).count()
    }
}

pub const APPROVED: &str = r#"{"total_score": 92, "decision": "APPROVED", "critical_faults": [], "improvement_suggestion": ""}"#;
pub const REJECTED: &str =
    r#"{"total_score": 45, "decision": "REJECTED", "critical_faults": ["Two correct options"], "improvement_suggestion": "Make option D wrong."}"#;

pub const QUESTION_JSON: &str = r#"{
    "q": "Which process converts light energy into chemical energy?",
    "o": ["Respiration", "Photosynthesis", "Fermentation", "Transpiration", "Osmosis"],
    "a": 1,
    "exp": "The text states that photosynthesis stores light energy as glucose.",
    "evidence": "Photosynthesis stores light energy as glucose.",
    "img": null,
    "diagnosis": "Confuses energy storage with energy release.",
    "insight": "Photo means light: photosynthesis captures it."
}"#;

#[async_trait]
impl LanguageModelService for ScriptedLlm {
    async fn complete(&self, _messages: &[ChatMessage], options: &CompletionOptions) -> PortResult<String> {
        self.calls.lock().unwrap().push(options.role);
        if options.role == ModelRole::Validation && self.hold_validation.load(Ordering::SeqCst) {
            self.validation_entered.notify_one();
            std::future::pending::<()>().await;
        }
        match options.role {
            ModelRole::Analysis => self
                .analysis
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PortError::Provider("no analysis scripted".into()))),
            ModelRole::Validation => Ok(self.validations.lock().unwrap().pop_front().unwrap_or_else(|| APPROVED.into())),
            ModelRole::Drafting => self.drafts.lock().unwrap().pop_front().unwrap_or_else(|| Ok(QUESTION_JSON.into())),
        }
    }
}

//=========================================================================================
// Fixtures
//=========================================================================================

pub fn chunk(concepts: &[&str]) -> ContentChunk {
    ContentChunk {
        id: Uuid::new_v4(),
        course_id: Uuid::new_v4(),
        course_name: "Biology".into(),
        section_title: "Plants".into(),
        content: "Photosynthesis stores light energy as glucose. Respiration releases it again.".into(),
        word_count: 450,
        meaningful_word_count: None,
        importance: Importance::High,
        difficulty_index: Some(3),
        density_score: None,
        concept_map: concepts.iter().map(|c| Concept::new(*c, "Explain the process")).collect(),
        quotas: None,
        status: ChunkStatus::Synced,
    }
}

pub fn stored(chunk: &ContentChunk, usage_type: UsageType) -> StoredQuestion {
    StoredQuestion {
        id: Uuid::new_v4(),
        chunk_id: chunk.id,
        course_id: chunk.course_id,
        usage_type,
        question: GeneratedQuestion {
            text: "Which process converts light energy into chemical energy?".into(),
            options: ["Respiration", "Photosynthesis", "Fermentation", "Transpiration", "Osmosis"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            correct_index: 1,
            explanation: "Photosynthesis stores light energy.".into(),
            evidence: "Photosynthesis stores light energy as glucose.".into(),
            bloom_level: BloomLevel::Knowledge,
            concept: "Photosynthesis".into(),
            image_index: None,
            diagnosis: Some("Mixes up storage and release.".into()),
            insight: None,
        },
        parent_question_id: None,
    }
}

pub fn orchestrator(store: Arc<InMemoryStore>, llm: Arc<ScriptedLlm>) -> Arc<GenerationOrchestrator> {
    Arc::new(GenerationOrchestrator::new(AppState::from_store(store, llm)))
}
