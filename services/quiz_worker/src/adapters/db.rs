//! services/quiz_worker/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ContentSource`, `QuestionRepository` and `QuotaStore` ports from the
//! `core` crate. It handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_engine_core::domain::{
    BloomLevel, ChunkMastery, ChunkStatus, Concept, ContentChunk, GeneratedQuestion, Importance, NewQuestion,
    QuestionAttempt, QuotaSet, ShelfStatus, StoredQuestion, SubjectGuidelines, UsageType, UserQuestionStatus,
};
use quiz_engine_core::ports::{ContentSource, PortError, PortResult, QuestionRepository, QuotaStore};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

//=========================================================================================
// JSON column payloads
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct ConceptJson {
    baslik: String,
    #[serde(default)]
    odak: String,
    #[serde(default)]
    seviye: Option<String>,
    #[serde(default)]
    gorsel: Option<String>,
    #[serde(default, rename = "altText")]
    alt_text: Option<String>,
    #[serde(default, rename = "isException")]
    is_exception: bool,
    #[serde(default)]
    prerequisites: Vec<String>,
}

impl ConceptJson {
    fn from_domain(concept: &Concept) -> Self {
        Self {
            baslik: concept.title.clone(),
            odak: concept.focus.clone(),
            seviye: concept.level.map(|l| l.as_str().to_string()),
            gorsel: concept.image.clone(),
            alt_text: concept.alt_text.clone(),
            is_exception: concept.is_exception,
            prerequisites: concept.prerequisites.clone(),
        }
    }

    fn to_domain(self) -> Concept {
        Concept {
            title: self.baslik,
            focus: self.odak,
            level: self.seviye.as_deref().and_then(BloomLevel::parse),
            image: self.gorsel,
            alt_text: self.alt_text,
            is_exception: self.is_exception,
            prerequisites: self.prerequisites,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct QuotaJson {
    antrenman: u32,
    arsiv: u32,
    deneme: u32,
}

/// Question body as stored in `questions.question_data`.
#[derive(Serialize, Deserialize)]
struct QuestionDataJson {
    q: String,
    o: Vec<String>,
    a: usize,
    exp: String,
    #[serde(default)]
    evidence: String,
    #[serde(default)]
    img: Option<u32>,
    #[serde(default)]
    diagnosis: Option<String>,
    #[serde(default)]
    insight: Option<String>,
}

impl QuestionDataJson {
    fn from_domain(q: &GeneratedQuestion) -> Self {
        Self {
            q: q.text.clone(),
            o: q.options.clone(),
            a: q.correct_index,
            exp: q.explanation.clone(),
            evidence: q.evidence.clone(),
            img: q.image_index,
            diagnosis: q.diagnosis.clone(),
            insight: q.insight.clone(),
        }
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ChunkRecord {
    id: Uuid,
    course_id: Uuid,
    course_name: String,
    section_title: String,
    content: String,
    word_count: i32,
    meaningful_word_count: Option<i32>,
    importance: String,
    difficulty_index: Option<i16>,
    density_score: Option<f64>,
    concept_map: Json<Vec<ConceptJson>>,
    quotas: Option<Json<QuotaJson>>,
    status: String,
}
impl ChunkRecord {
    fn to_domain(self) -> ContentChunk {
        ContentChunk {
            id: self.id,
            course_id: self.course_id,
            course_name: self.course_name,
            section_title: self.section_title,
            content: self.content,
            word_count: non_negative(self.word_count),
            meaningful_word_count: self.meaningful_word_count.map(non_negative),
            importance: Importance::parse(&self.importance),
            difficulty_index: self.difficulty_index.and_then(|d| u8::try_from(d).ok()),
            density_score: self.density_score,
            concept_map: self.concept_map.0.into_iter().map(ConceptJson::to_domain).collect(),
            quotas: self.quotas.map(|Json(q)| QuotaSet { antrenman: q.antrenman, arsiv: q.arsiv, deneme: q.deneme }),
            status: ChunkStatus::parse(&self.status),
        }
    }
}

#[derive(FromRow)]
struct GuidelinesRecord {
    instruction: Option<String>,
    few_shot_example: Option<Json<serde_json::Value>>,
    bad_few_shot_example: Option<Json<serde_json::Value>>,
}
impl GuidelinesRecord {
    fn to_domain(self) -> SubjectGuidelines {
        SubjectGuidelines {
            instruction: self.instruction,
            few_shot_example: self.few_shot_example.map(|j| j.0),
            bad_few_shot_example: self.bad_few_shot_example.map(|j| j.0),
        }
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    chunk_id: Uuid,
    course_id: Uuid,
    usage_type: String,
    bloom_level: String,
    concept_title: String,
    question_data: Json<QuestionDataJson>,
    parent_question_id: Option<Uuid>,
}
impl QuestionRecord {
    fn to_domain(self) -> StoredQuestion {
        let data = self.question_data.0;
        StoredQuestion {
            id: self.id,
            chunk_id: self.chunk_id,
            course_id: self.course_id,
            usage_type: UsageType::parse(&self.usage_type).unwrap_or(UsageType::Antrenman),
            question: GeneratedQuestion {
                text: data.q,
                options: data.o,
                correct_index: data.a,
                explanation: data.exp,
                evidence: data.evidence,
                bloom_level: BloomLevel::parse(&self.bloom_level).unwrap_or(BloomLevel::Knowledge),
                concept: self.concept_title,
                image_index: data.img,
                diagnosis: data.diagnosis,
                insight: data.insight,
            },
            parent_question_id: self.parent_question_id,
        }
    }
}

#[derive(FromRow)]
struct StatusRecord {
    user_id: Uuid,
    question_id: Uuid,
    status: String,
    consecutive_success: f64,
    consecutive_fails: i32,
    next_review_session: Option<i32>,
}
impl StatusRecord {
    fn to_domain(self) -> UserQuestionStatus {
        UserQuestionStatus {
            user_id: self.user_id,
            question_id: self.question_id,
            status: ShelfStatus::parse(&self.status),
            consecutive_success: self.consecutive_success,
            consecutive_fails: non_negative(self.consecutive_fails),
            next_review_session: self.next_review_session.map(non_negative),
        }
    }
}

#[derive(FromRow)]
struct MasteryRecord {
    user_id: Uuid,
    chunk_id: Uuid,
    mastery_score: i16,
    running_score: i16,
    total_questions_seen: i32,
    last_full_review_at: Option<DateTime<Utc>>,
}
impl MasteryRecord {
    fn to_domain(self) -> ChunkMastery {
        ChunkMastery {
            user_id: self.user_id,
            chunk_id: self.chunk_id,
            mastery_score: self.mastery_score.clamp(0, 100) as u8,
            running_score: self.running_score.clamp(0, 100) as u8,
            total_questions_seen: non_negative(self.total_questions_seen),
            last_full_review_at: self.last_full_review_at,
        }
    }
}

//=========================================================================================
// `ContentSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentSource for DbAdapter {
    async fn get_chunk(&self, chunk_id: Uuid) -> PortResult<Option<ContentChunk>> {
        let record = sqlx::query_as::<_, ChunkRecord>(
            "SELECT c.id, c.course_id, co.name AS course_name, c.section_title, c.content, c.word_count, \
                    c.meaningful_word_count, c.importance, c.difficulty_index, c.density_score, c.concept_map, \
                    c.quotas, c.status \
             FROM note_chunks c JOIN courses co ON co.id = c.course_id \
             WHERE c.id = $1",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(ChunkRecord::to_domain))
    }

    async fn update_chunk_analysis(
        &self,
        chunk_id: Uuid,
        difficulty_index: u8,
        concept_map: &[Concept],
        quotas: QuotaSet,
    ) -> PortResult<()> {
        let concepts: Vec<ConceptJson> = concept_map.iter().map(ConceptJson::from_domain).collect();
        let quotas = QuotaJson { antrenman: quotas.antrenman, arsiv: quotas.arsiv, deneme: quotas.deneme };

        let result = sqlx::query(
            "UPDATE note_chunks SET difficulty_index = $2, concept_map = $3, quotas = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(chunk_id)
        .bind(i16::from(difficulty_index))
        .bind(Json(concepts))
        .bind(Json(quotas))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chunk {} not found", chunk_id)));
        }
        Ok(())
    }

    async fn update_chunk_status(&self, chunk_id: Uuid, status: ChunkStatus) -> PortResult<()> {
        sqlx::query("UPDATE note_chunks SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(chunk_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_guidelines(&self, course_id: Uuid) -> PortResult<Option<SubjectGuidelines>> {
        let record = sqlx::query_as::<_, GuidelinesRecord>(
            "SELECT instruction, few_shot_example, bad_few_shot_example FROM subject_guidelines WHERE course_id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(GuidelinesRecord::to_domain))
    }
}

//=========================================================================================
// `QuestionRepository` Trait Implementation
//=========================================================================================

const QUESTION_COLUMNS: &str =
    "id, chunk_id, course_id, usage_type, bloom_level, concept_title, question_data, parent_question_id";

// A repeated save of the same question id is a no-op.
const INSERT_QUESTION: &str =
    "INSERT INTO questions (id, chunk_id, course_id, section_title, usage_type, bloom_level, concept_title, \
                            question_data, created_by, parent_question_id) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
     ON CONFLICT (id) DO NOTHING";

#[async_trait]
impl QuestionRepository for DbAdapter {
    async fn save_question(&self, question: NewQuestion) -> PortResult<Uuid> {
        sqlx::query(INSERT_QUESTION)
            .bind(question.id)
            .bind(question.chunk_id)
            .bind(question.course_id)
            .bind(&question.section_title)
            .bind(question.usage_type.as_str())
            .bind(question.question.bloom_level.as_str())
            .bind(&question.question.concept)
            .bind(Json(QuestionDataJson::from_domain(&question.question)))
            .bind(question.created_by)
            .bind(question.parent_question_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(question.id)
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Option<StoredQuestion>> {
        let record = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(QuestionRecord::to_domain))
    }

    async fn get_questions_by_chunk(
        &self,
        chunk_id: Uuid,
        usage_type: Option<UsageType>,
    ) -> PortResult<Vec<StoredQuestion>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions \
             WHERE chunk_id = $1 AND ($2::TEXT IS NULL OR usage_type = $2) \
             ORDER BY created_at ASC"
        ))
        .bind(chunk_id)
        .bind(usage_type.map(|u| u.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(QuestionRecord::to_domain).collect())
    }

    async fn get_user_question_status(
        &self,
        user_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<UserQuestionStatus>> {
        let record = sqlx::query_as::<_, StatusRecord>(
            "SELECT user_id, question_id, status, consecutive_success, consecutive_fails, next_review_session \
             FROM user_question_status WHERE user_id = $1 AND question_id = $2",
        )
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(StatusRecord::to_domain))
    }

    async fn upsert_user_question_status(&self, status: &UserQuestionStatus) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_question_status \
                 (user_id, question_id, status, consecutive_success, consecutive_fails, next_review_session) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, question_id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 consecutive_success = EXCLUDED.consecutive_success, \
                 consecutive_fails = EXCLUDED.consecutive_fails, \
                 next_review_session = EXCLUDED.next_review_session, \
                 updated_at = NOW()",
        )
        .bind(status.user_id)
        .bind(status.question_id)
        .bind(status.status.as_str())
        .bind(status.consecutive_success)
        .bind(status.consecutive_fails as i32)
        .bind(status.next_review_session.map(|s| s as i32))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_chunk_mastery(&self, user_id: Uuid, chunk_id: Uuid) -> PortResult<Option<ChunkMastery>> {
        let record = sqlx::query_as::<_, MasteryRecord>(
            "SELECT user_id, chunk_id, mastery_score, running_score, total_questions_seen, last_full_review_at \
             FROM chunk_mastery WHERE user_id = $1 AND chunk_id = $2",
        )
        .bind(user_id)
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(MasteryRecord::to_domain))
    }

    async fn upsert_chunk_mastery(&self, mastery: &ChunkMastery) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO chunk_mastery \
                 (user_id, chunk_id, mastery_score, running_score, total_questions_seen, last_full_review_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, chunk_id) DO UPDATE SET \
                 mastery_score = EXCLUDED.mastery_score, \
                 running_score = EXCLUDED.running_score, \
                 total_questions_seen = EXCLUDED.total_questions_seen, \
                 last_full_review_at = EXCLUDED.last_full_review_at, \
                 updated_at = NOW()",
        )
        .bind(mastery.user_id)
        .bind(mastery.chunk_id)
        .bind(i16::from(mastery.mastery_score))
        .bind(i16::from(mastery.running_score))
        .bind(mastery.total_questions_seen as i32)
        .bind(mastery.last_full_review_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn record_attempt(&self, attempt: &QuestionAttempt) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO quiz_attempts \
                 (user_id, question_id, chunk_id, response_type, selected_answer, time_spent_ms, \
                  session_number, diagnosis, answered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(attempt.user_id)
        .bind(attempt.question_id)
        .bind(attempt.chunk_id)
        .bind(attempt.response.as_str())
        .bind(attempt.selected_option.map(|o| o as i32))
        .bind(attempt.time_spent_ms as i64)
        .bind(attempt.session_number as i32)
        .bind(attempt.diagnosis.as_deref())
        .bind(attempt.answered_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn count_unique_solved(&self, user_id: Uuid, chunk_id: Uuid) -> PortResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT question_id) FROM quiz_attempts WHERE user_id = $1 AND chunk_id = $2",
        )
        .bind(user_id)
        .bind(chunk_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn get_recent_diagnoses(&self, user_id: Uuid, chunk_id: Uuid, limit: usize) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT diagnosis FROM quiz_attempts \
             WHERE user_id = $1 AND chunk_id = $2 AND diagnosis IS NOT NULL AND diagnosis <> '' \
             ORDER BY answered_at DESC LIMIT $3",
        )
        .bind(user_id)
        .bind(chunk_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }
}

//=========================================================================================
// `QuotaStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuotaStore for DbAdapter {
    async fn get_usage_counts(&self, chunk_id: Uuid) -> PortResult<QuotaSet> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT usage_type, COUNT(*) FROM questions WHERE chunk_id = $1 GROUP BY usage_type",
        )
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut counts = QuotaSet::default();
        for (usage, count) in rows {
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            match UsageType::parse(&usage) {
                Some(UsageType::Antrenman) => counts.antrenman = count,
                Some(UsageType::Arsiv) => counts.arsiv = count,
                Some(UsageType::Deneme) => counts.deneme = count,
                None => {}
            }
        }
        Ok(counts)
    }
}
