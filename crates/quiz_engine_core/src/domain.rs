//! crates/quiz_engine_core/src/domain.rs
//!
//! Defines the pure, core data structures of the quiz engine.
//! These structs are independent of any database or wire format; adapters
//! convert their own records into these types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Enumerations
//=========================================================================================

/// Cognitive demand tier of a concept or question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BloomLevel {
    Knowledge,
    Application,
    Analysis,
}

impl BloomLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloomLevel::Knowledge => "knowledge",
            BloomLevel::Application => "application",
            BloomLevel::Analysis => "analysis",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "knowledge" => Some(BloomLevel::Knowledge),
            "application" => Some(BloomLevel::Application),
            "analysis" => Some(BloomLevel::Analysis),
            _ => None,
        }
    }

    /// One tier lower, used when a learner keeps failing the same item.
    pub fn step_down(&self) -> Self {
        match self {
            BloomLevel::Analysis => BloomLevel::Application,
            BloomLevel::Application | BloomLevel::Knowledge => BloomLevel::Knowledge,
        }
    }
}

/// How much weight a subject carries in the target exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    /// Normalized importance factor used by the question weight allocator.
    pub fn score(&self) -> f64 {
        match self {
            Importance::High => 1.0,
            Importance::Medium => 0.7,
            Importance::Low => 0.4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => Importance::High,
            "low" => Importance::Low,
            _ => Importance::Medium,
        }
    }
}

/// Question pool a generated question belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageType {
    /// Training pool, drives the shelf engine.
    Antrenman,
    /// Archive pool, used to refresh mastered concepts.
    Arsiv,
    /// Exam simulation pool, never affects scores or scheduling.
    Deneme,
}

impl UsageType {
    pub const ALL: [UsageType; 3] = [UsageType::Antrenman, UsageType::Arsiv, UsageType::Deneme];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Antrenman => "antrenman",
            UsageType::Arsiv => "arsiv",
            UsageType::Deneme => "deneme",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "antrenman" => Some(UsageType::Antrenman),
            "arsiv" => Some(UsageType::Arsiv),
            "deneme" => Some(UsageType::Deneme),
            _ => None,
        }
    }
}

/// Outcome of a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Correct,
    Incorrect,
    Blank,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Correct => "correct",
            ResponseType::Incorrect => "incorrect",
            ResponseType::Blank => "blank",
        }
    }
}

/// Spaced-repetition state of one question for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfStatus {
    Active,
    PendingFollowup,
    Archived,
}

impl ShelfStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShelfStatus::Active => "active",
            ShelfStatus::PendingFollowup => "pending_followup",
            ShelfStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "pending_followup" => ShelfStatus::PendingFollowup,
            "archived" => ShelfStatus::Archived,
            _ => ShelfStatus::Active,
        }
    }
}

/// Processing status flag of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Synced,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Synced => "SYNCED",
            ChunkStatus::Processing => "PROCESSING",
            ChunkStatus::Completed => "COMPLETED",
            ChunkStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "PROCESSING" => ChunkStatus::Processing,
            "COMPLETED" => ChunkStatus::Completed,
            "FAILED" => ChunkStatus::Failed,
            _ => ChunkStatus::Synced,
        }
    }
}

//=========================================================================================
// Content
//=========================================================================================

/// One teachable unit within a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub title: String,
    /// Learning objective, at most 15 words.
    pub focus: String,
    /// Declared cognitive level. `None` lets the drafting strategy pick one by position.
    pub level: Option<BloomLevel>,
    pub image: Option<String>,
    pub alt_text: Option<String>,
    /// Legal or procedural carve-outs get priority.
    pub is_exception: bool,
    pub prerequisites: Vec<String>,
}

impl Concept {
    pub fn new(title: impl Into<String>, focus: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            focus: focus.into(),
            level: None,
            image: None,
            alt_text: None,
            is_exception: false,
            prerequisites: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: BloomLevel) -> Self {
        self.level = Some(level);
        self
    }
}

/// A titled section of course material, the unit of question generation.
#[derive(Debug, Clone)]
pub struct ContentChunk {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_name: String,
    pub section_title: String,
    pub content: String,
    pub word_count: u32,
    pub meaningful_word_count: Option<u32>,
    pub importance: Importance,
    /// 1 to 5, written by the analysis task.
    pub difficulty_index: Option<u8>,
    pub density_score: Option<f64>,
    pub concept_map: Vec<Concept>,
    pub quotas: Option<QuotaSet>,
    pub status: ChunkStatus,
}

impl ContentChunk {
    /// Word count used for quota sizing.
    pub fn quota_word_count(&self) -> u32 {
        self.meaningful_word_count.unwrap_or(self.word_count)
    }

    /// Concept density in [0, 1]. Falls back to the difficulty index, then to a neutral 0.5.
    pub fn density(&self) -> f64 {
        match (self.density_score, self.difficulty_index) {
            (Some(d), _) => d.clamp(0.0, 1.0),
            (None, Some(idx)) => (f64::from(idx.clamp(1, 5)) - 1.0) / 4.0,
            (None, None) => 0.5,
        }
    }
}

/// Optional per-course authoring rules injected into prompts.
#[derive(Debug, Clone, Default)]
pub struct SubjectGuidelines {
    pub instruction: Option<String>,
    pub few_shot_example: Option<serde_json::Value>,
    pub bad_few_shot_example: Option<serde_json::Value>,
}

//=========================================================================================
// Questions and validation
//=========================================================================================

pub const OPTION_COUNT: usize = 5;

/// One quiz item produced by the generation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuestion {
    pub text: String,
    /// Exactly five options.
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
    /// Verbatim source quote that substantiates the answer.
    pub evidence: String,
    pub bloom_level: BloomLevel,
    pub concept: String,
    pub image_index: Option<u32>,
    pub diagnosis: Option<String>,
    pub insight: Option<String>,
}

/// A question as it lives in the persisted pool.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredQuestion {
    pub id: Uuid,
    pub chunk_id: Uuid,
    pub course_id: Uuid,
    pub usage_type: UsageType,
    pub question: GeneratedQuestion,
    pub parent_question_id: Option<Uuid>,
}

/// Payload for persisting a freshly generated question.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    /// Chosen by the caller so that saving the same payload twice writes one row.
    pub id: Uuid,
    pub chunk_id: Uuid,
    pub course_id: Uuid,
    pub section_title: String,
    pub usage_type: UsageType,
    pub question: GeneratedQuestion,
    pub created_by: Option<Uuid>,
    pub parent_question_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

pub const APPROVAL_THRESHOLD: f64 = 70.0;

/// Output of grading a generated question.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub decision: Decision,
    /// 0 to 100.
    pub total_score: f64,
    pub critical_faults: Vec<String>,
    pub improvement_suggestion: String,
}

impl ValidationResult {
    /// Forces the decision to agree with the score. Approved results carry no faults.
    pub fn reconciled(mut self) -> Self {
        self.total_score = self.total_score.clamp(0.0, 100.0);
        self.decision = if self.total_score >= APPROVAL_THRESHOLD {
            Decision::Approved
        } else {
            Decision::Rejected
        };
        if self.decision == Decision::Approved {
            self.critical_faults.clear();
            self.improvement_suggestion.clear();
        }
        self
    }

    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approved
    }
}

//=========================================================================================
// Quotas
//=========================================================================================

/// Per-chunk counts for the three usage pools. Used both for targets and for current usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuotaSet {
    pub antrenman: u32,
    pub arsiv: u32,
    pub deneme: u32,
}

impl QuotaSet {
    pub fn get(&self, usage: UsageType) -> u32 {
        match usage {
            UsageType::Antrenman => self.antrenman,
            UsageType::Arsiv => self.arsiv,
            UsageType::Deneme => self.deneme,
        }
    }

    pub fn increment(&mut self, usage: UsageType) {
        match usage {
            UsageType::Antrenman => self.antrenman += 1,
            UsageType::Arsiv => self.arsiv += 1,
            UsageType::Deneme => self.deneme += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.antrenman + self.arsiv + self.deneme
    }
}

//=========================================================================================
// Per-user progress
//=========================================================================================

/// Spaced-repetition state for one (user, question) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct UserQuestionStatus {
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub status: ShelfStatus,
    /// Grows by 0.5 (slow) or 1.0 (fast) per correct answer.
    pub consecutive_success: f64,
    pub consecutive_fails: u32,
    pub next_review_session: Option<u32>,
}

/// Aggregate progress of one user over one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMastery {
    pub user_id: Uuid,
    pub chunk_id: Uuid,
    /// 0 to 100, coverage weighted 60% and running score 40%.
    pub mastery_score: u8,
    /// Running correctness score moved by each answer's score change.
    pub running_score: u8,
    pub total_questions_seen: u32,
    pub last_full_review_at: Option<DateTime<Utc>>,
}

/// One recorded answer, kept for coverage and diagnosis history.
#[derive(Debug, Clone)]
pub struct QuestionAttempt {
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub chunk_id: Uuid,
    pub response: ResponseType,
    pub selected_option: Option<usize>,
    pub time_spent_ms: u64,
    pub session_number: u32,
    pub diagnosis: Option<String>,
    pub answered_at: DateTime<Utc>,
}

/// Running tally of an active quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuizResults {
    pub correct: u32,
    pub incorrect: u32,
    pub blank: u32,
    pub total_time_ms: u64,
}

impl QuizResults {
    pub fn record(&mut self, response: ResponseType, time_ms: u64) {
        match response {
            ResponseType::Correct => self.correct += 1,
            ResponseType::Incorrect => self.incorrect += 1,
            ResponseType::Blank => self.blank += 1,
        }
        self.total_time_ms += time_ms;
    }

    pub fn answered(&self) -> u32 {
        self.correct + self.incorrect + self.blank
    }
}
