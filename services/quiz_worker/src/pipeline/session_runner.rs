//! services/quiz_worker/src/pipeline/session_runner.rs
//!
//! Binds a `QuizSession` to the persistence ports. The session itself stays
//! pure; the runner loads the review queue, persists every answer through the
//! shelf engine, and fans out follow-up and refill work in the background.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use quiz_engine_core::domain::{
    ChunkMastery, QuestionAttempt, ShelfStatus, StoredQuestion, UsageType, UserQuestionStatus,
};
use quiz_engine_core::ports::PortError;
use quiz_engine_core::session::{Advance, AnsweredItem, QuizSession, SessionError};
use quiz_engine_core::shelf::{evaluate_submission, ChunkTiming, SubmissionInput, SubmissionResult};
use quiz_engine_core::scoring::TestResultSummary;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::EventSink;
use super::follow_up::{spawn_follow_up, FollowUpRequest};
use super::generation::GenerationOrchestrator;
use super::refill::spawn_refill;
use super::state::AppState;

/// Upper share of a review queue given to due archived questions.
pub const ARCHIVE_SHARE: f64 = 0.15;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Port(#[from] PortError),
}

pub struct QuizRunner {
    state: AppState,
    orchestrator: Arc<GenerationOrchestrator>,
    user_id: Uuid,
    session_number: u32,
    session: QuizSession,
    follow_up_tx: mpsc::UnboundedSender<StoredQuestion>,
    follow_up_rx: mpsc::UnboundedReceiver<StoredQuestion>,
    background: Vec<JoinHandle<()>>,
    chunks: BTreeSet<Uuid>,
    cancel: CancellationToken,
}

impl QuizRunner {
    pub fn new(orchestrator: Arc<GenerationOrchestrator>, user_id: Uuid, session_number: u32) -> Self {
        let (follow_up_tx, follow_up_rx) = mpsc::unbounded_channel();
        Self {
            state: orchestrator.state().clone(),
            orchestrator,
            user_id,
            session_number,
            session: QuizSession::new(),
            follow_up_tx,
            follow_up_rx,
            background: Vec::new(),
            chunks: BTreeSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    pub fn session_number(&self) -> u32 {
        self.session_number
    }

    //-------------------------------------------------------------------------------------
    // Loading
    //-------------------------------------------------------------------------------------

    /// Starts a training quiz for one chunk. Returns the number of queued questions;
    /// zero means the session shows the placeholder.
    ///
    /// Queue order: due follow-up reviews, then active or unseen training
    /// questions, then due archived questions and unseen or due archive-pool
    /// questions (together capped at `ARCHIVE_SHARE` of `limit`).
    pub async fn start(&mut self, chunk_id: Uuid, limit: usize, now: Instant) -> Result<usize, RunnerError> {
        let mut pending = Vec::new();
        let mut fresh = Vec::new();
        let mut archived = Vec::new();

        let training = self.state.questions.get_questions_by_chunk(chunk_id, Some(UsageType::Antrenman)).await?;
        let archive = self.state.questions.get_questions_by_chunk(chunk_id, Some(UsageType::Arsiv)).await?;

        let session_number = self.session_number;
        let due = |s: &UserQuestionStatus| s.next_review_session.map_or(true, |n| n <= session_number);
        for question in training {
            let status = self.state.questions.get_user_question_status(self.user_id, question.id).await?;
            match status {
                None => fresh.push(question),
                Some(s) => match s.status {
                    ShelfStatus::Active => fresh.push(question),
                    ShelfStatus::PendingFollowup if due(&s) => pending.push(question),
                    ShelfStatus::Archived if due(&s) => {
                        // A fresh wording for the next visit; this one is still shown now.
                        self.spawn_archive_refresh(question.id);
                        archived.push(question);
                    }
                    _ => {}
                },
            }
        }
        for question in archive {
            let status = self.state.questions.get_user_question_status(self.user_id, question.id).await?;
            if status.as_ref().map_or(true, due) {
                archived.push(question);
            }
        }

        let archive_cap = ((limit as f64) * ARCHIVE_SHARE).ceil() as usize;
        archived.truncate(archive_cap);

        let queue: Vec<StoredQuestion> = pending.into_iter().chain(fresh).chain(archived).take(limit).collect();
        let count = queue.len();
        info!(user_id = %self.user_id, %chunk_id, count, session = self.session_number, "Starting quiz");

        self.chunks.insert(chunk_id);
        self.session.start(queue, now);
        Ok(count)
    }

    /// Starts an exam simulation from the chunk's `deneme` pool. Answers are
    /// recorded but never move scores or the review schedule.
    pub async fn start_exam(&mut self, chunk_id: Uuid, limit: usize, now: Instant) -> Result<usize, RunnerError> {
        let mut questions = self.state.questions.get_questions_by_chunk(chunk_id, Some(UsageType::Deneme)).await?;
        questions.truncate(limit);
        let count = questions.len();
        info!(user_id = %self.user_id, %chunk_id, count, "Starting exam simulation");

        self.chunks.insert(chunk_id);
        self.session.start(questions, now);
        Ok(count)
    }

    fn spawn_archive_refresh(&mut self, question_id: Uuid) {
        let orchestrator = self.orchestrator.clone();
        let cancel = self.cancel.child_token();
        self.background.push(tokio::spawn(async move {
            let events = EventSink::silent();
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = orchestrator.refresh_archived(question_id, &events) => match result {
                    Ok(Some(id)) => debug!(%question_id, refreshed = %id, "Archive question refreshed"),
                    Ok(None) => {}
                    Err(e) => warn!(%question_id, error = %e, "Archive refresh failed"),
                },
            }
        }));
    }

    //-------------------------------------------------------------------------------------
    // Answering
    //-------------------------------------------------------------------------------------

    /// Records an answer and persists its effects. `None` is a blank answer.
    /// Returns `None` when the placeholder was answered.
    pub async fn submit(&mut self, selected: Option<usize>, now: Instant) -> Result<Option<SubmissionResult>, RunnerError> {
        let question = self.session.current().cloned();
        let Some(outcome) = self.session.submit_answer(selected, now)? else {
            return Ok(None);
        };
        let Some(question) = question else {
            return Ok(None);
        };

        let user_id = self.user_id;
        let questions = &self.state.questions;
        let prior = questions.get_user_question_status(user_id, outcome.question_id).await?;

        questions
            .record_attempt(&QuestionAttempt {
                user_id,
                question_id: outcome.question_id,
                chunk_id: outcome.chunk_id,
                response: outcome.response,
                selected_option: outcome.selected,
                time_spent_ms: outcome.time_spent_ms,
                session_number: self.session_number,
                diagnosis: if outcome.is_correct() { None } else { question.question.diagnosis.clone() },
                answered_at: Utc::now(),
            })
            .await?;

        let unique_solved = questions.count_unique_solved(user_id, outcome.chunk_id).await?;
        let total_chunk_questions = questions.get_questions_by_chunk(outcome.chunk_id, None).await?.len() as u32;
        let chunk_timing = self.state.content.get_chunk(outcome.chunk_id).await?.map(|chunk| ChunkTiming {
            char_count: chunk.content.chars().count(),
            concept_count: chunk.concept_map.len(),
        });
        let mastery = questions.get_chunk_mastery(user_id, outcome.chunk_id).await?;

        let result = evaluate_submission(
            &SubmissionInput {
                prior_success: 0.0,
                prior_fails: 0,
                response: outcome.response,
                time_spent_ms: outcome.time_spent_ms,
                usage_type: outcome.usage_type,
                bloom_level: Some(outcome.bloom_level),
                chunk_timing,
                current_score: mastery.as_ref().map_or(0, |m| m.running_score),
                unique_solved,
                total_chunk_questions,
                session_number: self.session_number,
            }
            .with_prior(prior.as_ref()),
        );

        if outcome.usage_type != UsageType::Deneme {
            questions
                .upsert_user_question_status(&UserQuestionStatus {
                    user_id,
                    question_id: outcome.question_id,
                    status: result.new_status,
                    consecutive_success: result.new_success_count,
                    consecutive_fails: result.new_fails_count,
                    next_review_session: result.next_review_session,
                })
                .await?;
        }

        let last_full_review_at = if result.is_topic_refreshed {
            Some(Utc::now())
        } else {
            mastery.as_ref().and_then(|m| m.last_full_review_at)
        };
        questions
            .upsert_chunk_mastery(&ChunkMastery {
                user_id,
                chunk_id: outcome.chunk_id,
                mastery_score: result.new_mastery,
                running_score: result.new_score,
                total_questions_seen: mastery.as_ref().map_or(0, |m| m.total_questions_seen) + 1,
                last_full_review_at,
            })
            .await?;

        debug!(
            question_id = %outcome.question_id,
            response = outcome.response.as_str(),
            delta = result.score_delta,
            status = result.new_status.as_str(),
            "Answer persisted"
        );

        if !result.is_correct && outcome.usage_type != UsageType::Deneme {
            let request = FollowUpRequest { user_id, original: question, incorrect_index: outcome.selected };
            self.background.push(spawn_follow_up(self.state.clone(), request, self.follow_up_tx.clone()));
        }

        Ok(Some(result))
    }

    //-------------------------------------------------------------------------------------
    // Navigation
    //-------------------------------------------------------------------------------------

    /// Queues any follow-ups that arrived, then advances. When the quiz
    /// completes, every chunk it touched is checked for a refill.
    pub fn next(&mut self, now: Instant) -> Result<Advance, RunnerError> {
        while let Ok(question) = self.follow_up_rx.try_recv() {
            debug!(question_id = %question.id, "Injecting follow-up");
            self.session.inject_follow_up(question);
        }

        let advance = self.session.next(now)?;
        if matches!(advance, Advance::Completed(_)) {
            self.on_completed();
        }
        Ok(advance)
    }

    pub fn previous(&mut self, now: Instant) -> Result<AnsweredItem, RunnerError> {
        Ok(self.session.previous(now)?.clone())
    }

    pub fn pause(&mut self, now: Instant) {
        self.session.pause(now);
    }

    pub fn resume(&mut self, now: Instant) {
        self.session.resume(now);
    }

    /// Ends the quiz early.
    pub fn finish(&mut self) -> Result<TestResultSummary, RunnerError> {
        let summary = self.session.finish()?;
        self.on_completed();
        Ok(summary)
    }

    /// Waits for spawned follow-up and refresh work. Follow-ups that finished
    /// are delivered on the next call to `next`.
    pub async fn wait_for_background(&mut self) {
        for result in join_all(self.background.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
    }

    /// Stops in-flight background generation, e.g. when the learner navigates away.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        for handle in self.background.drain(..) {
            handle.abort();
        }
    }

    fn on_completed(&mut self) {
        let results = self.session.results();
        info!(
            user_id = %self.user_id,
            correct = results.correct,
            incorrect = results.incorrect,
            blank = results.blank,
            "Quiz completed"
        );
        for chunk_id in &self.chunks {
            self.background.push(spawn_refill(self.orchestrator.clone(), *chunk_id, self.cancel.child_token()));
        }
    }
}
