//! crates/quiz_engine_core/src/shelf.rs
//!
//! The shelf engine: per (user, question) spaced-repetition transitions,
//! review scheduling, full submission evaluation and concept mastery chains.

use std::collections::HashMap;

use crate::domain::{BloomLevel, Concept, ResponseType, ShelfStatus, UsageType, UserQuestionStatus};
use crate::scoring::{
    calculate_chunk_mastery, calculate_score_change, calculate_t_max, DEFAULT_BUFFER_SECONDS,
    DEFAULT_FAST_THRESHOLD_MS,
};

//=========================================================================================
// Shelf transitions
//=========================================================================================

pub const FAST_SUCCESS_INCREMENT: f64 = 1.0;
pub const SLOW_SUCCESS_INCREMENT: f64 = 0.5;
pub const ARCHIVE_THRESHOLD: f64 = 3.0;

/// Gaps, in sessions, between reviews for a growing success count.
pub const SESSION_GAPS: [u32; 5] = [1, 3, 7, 14, 30];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShelfTransition {
    pub status: ShelfStatus,
    pub success_count: f64,
}

pub fn calculate_shelf_status(consecutive_success: f64, is_correct: bool, is_fast: bool) -> ShelfTransition {
    if !is_correct {
        return ShelfTransition { status: ShelfStatus::PendingFollowup, success_count: 0.0 };
    }

    let increment = if is_fast { FAST_SUCCESS_INCREMENT } else { SLOW_SUCCESS_INCREMENT };
    let success_count = consecutive_success.max(0.0) + increment;
    let status = if success_count >= ARCHIVE_THRESHOLD {
        ShelfStatus::Archived
    } else if success_count >= SLOW_SUCCESS_INCREMENT {
        ShelfStatus::PendingFollowup
    } else {
        ShelfStatus::Active
    };

    ShelfTransition { status, success_count }
}

/// Session index at which the question should come back.
pub fn calculate_next_review_session(current_session: u32, success_count: f64) -> u32 {
    let index = (success_count.max(1.0).floor() as usize - 1).min(SESSION_GAPS.len() - 1);
    current_session + SESSION_GAPS[index]
}

//=========================================================================================
// Submission evaluation
//=========================================================================================

/// Chunk facts used to size the fast-solve window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTiming {
    pub char_count: usize,
    pub concept_count: usize,
}

#[derive(Debug, Clone)]
pub struct SubmissionInput {
    pub prior_success: f64,
    pub prior_fails: u32,
    pub response: ResponseType,
    pub time_spent_ms: u64,
    pub usage_type: UsageType,
    pub bloom_level: Option<BloomLevel>,
    pub chunk_timing: Option<ChunkTiming>,
    /// Running chunk score before this answer, 0 to 100.
    pub current_score: u8,
    pub unique_solved: u32,
    pub total_chunk_questions: u32,
    pub session_number: u32,
}

impl SubmissionInput {
    pub fn with_prior(mut self, prior: Option<&UserQuestionStatus>) -> Self {
        if let Some(p) = prior {
            self.prior_success = p.consecutive_success;
            self.prior_fails = p.consecutive_fails;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub is_correct: bool,
    pub score_delta: i32,
    pub new_score: u8,
    pub new_mastery: u8,
    pub new_status: ShelfStatus,
    pub next_review_session: Option<u32>,
    pub is_topic_refreshed: bool,
    pub new_success_count: f64,
    pub new_fails_count: u32,
}

/// Fast-solve window for a question, in milliseconds.
pub fn fast_threshold_ms(bloom: Option<BloomLevel>, timing: Option<ChunkTiming>) -> u64 {
    match timing {
        Some(t) => calculate_t_max(
            t.char_count,
            t.concept_count,
            bloom.unwrap_or(BloomLevel::Knowledge),
            DEFAULT_BUFFER_SECONDS,
        ),
        None => DEFAULT_FAST_THRESHOLD_MS,
    }
}

/// Computes every state change caused by one answer. Exam-simulation
/// questions are recorded but never move scores or the review schedule.
pub fn evaluate_submission(input: &SubmissionInput) -> SubmissionResult {
    let is_correct = input.response == ResponseType::Correct;
    let coverage_mastery =
        |score: u8| calculate_chunk_mastery(input.total_chunk_questions, input.unique_solved, f64::from(score));
    let is_topic_refreshed = input.total_chunk_questions > 0
        && f64::from(input.unique_solved) / f64::from(input.total_chunk_questions) >= 0.8;

    if input.usage_type == UsageType::Deneme {
        return SubmissionResult {
            is_correct,
            score_delta: 0,
            new_score: input.current_score,
            new_mastery: coverage_mastery(input.current_score),
            new_status: ShelfStatus::Active,
            next_review_session: None,
            is_topic_refreshed,
            new_success_count: input.prior_success,
            new_fails_count: input.prior_fails,
        };
    }

    let is_repeated = input.prior_fails > 0 || input.prior_success > 0.0;
    let is_fast = input.time_spent_ms <= fast_threshold_ms(input.bloom_level, input.chunk_timing);
    let transition = calculate_shelf_status(input.prior_success, is_correct, is_fast);

    let next_review_session = match transition.status {
        ShelfStatus::PendingFollowup | ShelfStatus::Archived => {
            Some(calculate_next_review_session(input.session_number, transition.success_count))
        }
        ShelfStatus::Active => None,
    };

    let change = calculate_score_change(input.response, input.current_score, is_repeated);

    SubmissionResult {
        is_correct,
        score_delta: change.delta,
        new_score: change.new_score,
        new_mastery: coverage_mastery(change.new_score),
        new_status: transition.status,
        next_review_session,
        is_topic_refreshed,
        new_success_count: transition.success_count,
        new_fails_count: if is_correct { 0 } else { input.prior_fails + 1 },
    }
}

//=========================================================================================
// Mastery chains
//=========================================================================================

pub const CHAIN_SELF_THRESHOLD: f64 = 80.0;
pub const CHAIN_PREREQ_THRESHOLD: f64 = 85.0;
pub const BONUS_DAYS_PER_CHAIN: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Mastered,
    InProgress,
    Weak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasteryNode {
    pub title: String,
    pub mastery: f64,
    pub status: NodeStatus,
    pub prerequisites: Vec<String>,
    pub is_chain_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainEdge {
    pub source: String,
    pub target: String,
    pub is_strong: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasteryChainStats {
    pub total_chains: u32,
    pub resilience_bonus_days: u32,
    pub nodes: Vec<MasteryNode>,
    pub edges: Vec<ChainEdge>,
}

/// Builds the prerequisite graph for a concept map. `mastery` maps concept
/// titles to 0..=100 scores; unknown titles count as 0.
pub fn calculate_mastery_chains(concepts: &[Concept], mastery: &HashMap<String, f64>) -> MasteryChainStats {
    let score_of = |title: &str| mastery.get(title).copied().unwrap_or(0.0);

    let nodes: Vec<MasteryNode> = concepts
        .iter()
        .map(|concept| {
            let score = score_of(&concept.title);
            let status = if score >= CHAIN_SELF_THRESHOLD {
                NodeStatus::Mastered
            } else if score >= 50.0 {
                NodeStatus::InProgress
            } else {
                NodeStatus::Weak
            };
            let is_chain_complete = score >= CHAIN_SELF_THRESHOLD
                && concept.prerequisites.iter().all(|p| score_of(p) >= CHAIN_PREREQ_THRESHOLD);

            MasteryNode {
                title: concept.title.clone(),
                mastery: score,
                status,
                prerequisites: concept.prerequisites.clone(),
                is_chain_complete,
            }
        })
        .collect();

    let known: HashMap<&str, f64> = nodes.iter().map(|n| (n.title.as_str(), n.mastery)).collect();
    let mut edges = Vec::new();
    let mut total_chains = 0;

    for node in &nodes {
        for prereq in &node.prerequisites {
            let is_strong = known
                .get(prereq.as_str())
                .is_some_and(|p| node.mastery >= CHAIN_SELF_THRESHOLD && *p >= CHAIN_PREREQ_THRESHOLD);
            edges.push(ChainEdge { source: prereq.clone(), target: node.title.clone(), is_strong });
        }
        if node.is_chain_complete && !node.prerequisites.is_empty() {
            total_chains += 1;
        }
    }

    MasteryChainStats {
        total_chains,
        resilience_bonus_days: total_chains * BONUS_DAYS_PER_CHAIN,
        nodes,
        edges,
    }
}
