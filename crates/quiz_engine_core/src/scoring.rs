//! crates/quiz_engine_core/src/scoring.rs
//!
//! Stateless scoring primitives: per-answer score deltas, session summaries,
//! chunk mastery, time-weighted scores and focus metrics.
//! None of these fail; degenerate inputs produce a neutral zero.

use crate::domain::{BloomLevel, QuizResults, ResponseType};

/// Rounds half-up, matching how scores were historically stored.
pub(crate) fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

//=========================================================================================
// Per-answer score change
//=========================================================================================

pub const CORRECT_DELTA: i32 = 10;
pub const INCORRECT_DELTA: i32 = -5;
pub const REPEATED_INCORRECT_DELTA: i32 = -10;
pub const BLANK_DELTA: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreChange {
    pub delta: i32,
    pub new_score: u8,
}

/// Applies one answer to a 0..=100 running score.
///
/// A repeated blank costs the same as a first blank; only repeated incorrect
/// answers are penalised harder.
pub fn calculate_score_change(
    response: ResponseType,
    current_score: u8,
    is_repeated: bool,
) -> ScoreChange {
    let delta = match (response, is_repeated) {
        (ResponseType::Correct, _) => CORRECT_DELTA,
        (ResponseType::Incorrect, true) => REPEATED_INCORRECT_DELTA,
        (ResponseType::Incorrect, false) => INCORRECT_DELTA,
        (ResponseType::Blank, _) => BLANK_DELTA,
    };
    let new_score = (i32::from(current_score) + delta).clamp(0, 100) as u8;
    ScoreChange { delta, new_score }
}

//=========================================================================================
// Session summaries
//=========================================================================================

/// Percentage of correct answers, 0 for an empty quiz.
pub fn calculate_mastery(results: &QuizResults, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    round_half_up(f64::from(results.correct) / f64::from(total) * 100.0).clamp(0.0, 100.0) as u8
}

/// Mastery of 90% or more counts as excellence.
pub fn is_excellence_achieved(results: &QuizResults, total: u32) -> bool {
    calculate_mastery(results, total) >= 90
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResultSummary {
    pub percentage: u8,
    pub mastery_score: u8,
    pub pending_review: u32,
    pub total_time_formatted: String,
}

pub fn calculate_test_results(
    correct: u32,
    incorrect: u32,
    blank: u32,
    time_spent_ms: u64,
) -> TestResultSummary {
    let total = correct + incorrect + blank;
    let (percentage, mastery_score) = if total > 0 {
        let total = f64::from(total);
        let pct = round_half_up(f64::from(correct) / total * 100.0);
        let weighted = f64::from(correct) + f64::from(incorrect) * 0.2;
        (pct as u8, round_half_up(weighted / total * 100.0) as u8)
    } else {
        (0, 0)
    };

    TestResultSummary {
        percentage,
        mastery_score,
        pending_review: incorrect + blank,
        total_time_formatted: format_duration_hms(time_spent_ms),
    }
}

/// Formats milliseconds as `HH:MM:SS`. Hours are not wrapped.
pub fn format_duration_hms(ms: u64) -> String {
    let seconds = ms / 1000;
    let (h, m, s) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);
    format!("{h:02}:{m:02}:{s:02}")
}

/// Chunk mastery: coverage of the pool weighted 60%, running correctness weighted 40%.
pub fn calculate_chunk_mastery(total_questions: u32, unique_solved: u32, average_score: f64) -> u8 {
    if total_questions == 0 {
        return 0;
    }
    let coverage = (f64::from(unique_solved) / f64::from(total_questions)).min(1.0);
    let score = average_score.clamp(0.0, 100.0) * 0.4;
    round_half_up(coverage * 60.0 + score).clamp(0.0, 100.0) as u8
}

//=========================================================================================
// Time-weighted scoring
//=========================================================================================

fn bloom_coefficient(level: BloomLevel) -> f64 {
    match level {
        BloomLevel::Knowledge => 1.0,
        BloomLevel::Application => 1.3,
        BloomLevel::Analysis => 1.6,
    }
}

fn target_time_ms(level: BloomLevel) -> f64 {
    match level {
        BloomLevel::Knowledge => 20_000.0,
        BloomLevel::Application => 35_000.0,
        BloomLevel::Analysis => 50_000.0,
    }
}

fn difficulty_multiplier(level: BloomLevel) -> f64 {
    match level {
        BloomLevel::Knowledge => 1.0,
        BloomLevel::Application => 1.2,
        BloomLevel::Analysis => 1.5,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvancedScore {
    pub base_delta: f64,
    pub final_score: f64,
    pub bloom_coeff: f64,
    pub time_ratio: f64,
}

fn round_2dp(value: f64) -> f64 {
    round_half_up(value * 100.0) / 100.0
}

/// Scales a raw delta by cognitive level and by how fast the learner answered
/// relative to the level's target time.
pub fn calculate_advanced_score(delta: f64, bloom: BloomLevel, time_spent_ms: u64) -> AdvancedScore {
    let bloom_coeff = bloom_coefficient(bloom);
    let actual = (time_spent_ms as f64).max(1000.0);
    let time_ratio = (target_time_ms(bloom) / actual).clamp(0.5, 2.0);

    AdvancedScore {
        base_delta: delta,
        final_score: round_2dp(delta * bloom_coeff * time_ratio),
        bloom_coeff,
        time_ratio: round_2dp(time_ratio),
    }
}

pub const DEFAULT_FAST_THRESHOLD_MS: u64 = 30_000;
pub const DEFAULT_BUFFER_SECONDS: f64 = 10.0;

/// Upper bound in milliseconds for a "fast" solve: reading time at 780
/// characters per minute plus a complexity allowance plus a buffer.
pub fn calculate_t_max(char_count: usize, concept_count: usize, bloom: BloomLevel, buffer_s: f64) -> u64 {
    let reading = char_count as f64 / 780.0 * 60.0;
    let complexity = (15.0 + concept_count as f64 * 2.0) * difficulty_multiplier(bloom);
    round_half_up((reading + complexity + buffer_s) * 1000.0).max(0.0) as u64
}

//=========================================================================================
// Focus metrics
//=========================================================================================

/// Work-to-interruption ratio scaled by 20. Interruptions are floored at one minute.
pub fn calculate_focus_power(work_sec: f64, break_sec: f64, pause_sec: f64) -> u32 {
    if work_sec <= 0.0 {
        return 0;
    }
    let interruptions = (break_sec + pause_sec).max(60.0);
    round_half_up(work_sec / interruptions * 20.0) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FocusTotals {
    pub work_sec: f64,
    pub break_sec: f64,
}

pub fn calculate_focus_score(totals: FocusTotals) -> u8 {
    let duration = totals.work_sec + totals.break_sec;
    if duration <= 0.0 {
        return 0;
    }
    round_half_up(totals.work_sec / duration * 100.0).clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_change_clamps_at_bounds() {
        let floor = calculate_score_change(ResponseType::Incorrect, 3, true);
        assert_eq!(floor, ScoreChange { delta: -10, new_score: 0 });

        let ceiling = calculate_score_change(ResponseType::Correct, 95, false);
        assert_eq!(ceiling, ScoreChange { delta: 10, new_score: 100 });
    }

    #[test]
    fn blank_penalty_ignores_repetition() {
        assert_eq!(calculate_score_change(ResponseType::Blank, 50, false).new_score, 48);
        assert_eq!(calculate_score_change(ResponseType::Blank, 50, true).new_score, 48);
        assert_eq!(calculate_score_change(ResponseType::Incorrect, 50, false).new_score, 45);
    }

    #[test]
    fn mastery_and_results_guard_zero() {
        assert_eq!(calculate_mastery(&QuizResults::default(), 0), 0);
        let summary = calculate_test_results(0, 0, 0, 0);
        assert_eq!(summary.percentage, 0);
        assert_eq!(summary.mastery_score, 0);
        assert_eq!(summary.total_time_formatted, "00:00:00");
    }

    #[test]
    fn test_results_weight_incorrect_partially() {
        let summary = calculate_test_results(6, 2, 2, 3_725_000);
        assert_eq!(summary.percentage, 60);
        // (6 + 0.4) / 10
        assert_eq!(summary.mastery_score, 64);
        assert_eq!(summary.pending_review, 4);
        assert_eq!(summary.total_time_formatted, "01:02:05");
    }

    #[test]
    fn excellence_requires_ninety_percent() {
        let results = QuizResults { correct: 9, incorrect: 1, blank: 0, total_time_ms: 0 };
        assert!(is_excellence_achieved(&results, 10));
        let results = QuizResults { correct: 8, incorrect: 2, blank: 0, total_time_ms: 0 };
        assert!(!is_excellence_achieved(&results, 10));
    }

    #[test]
    fn chunk_mastery_caps_coverage() {
        assert_eq!(calculate_chunk_mastery(0, 5, 100.0), 0);
        assert_eq!(calculate_chunk_mastery(10, 20, 100.0), 100);
        assert_eq!(calculate_chunk_mastery(10, 5, 50.0), 50);
    }

    #[test]
    fn advanced_score_rewards_speed_within_bounds() {
        let fast = calculate_advanced_score(10.0, BloomLevel::Analysis, 500);
        assert_eq!(fast.time_ratio, 2.0);
        assert_eq!(fast.final_score, 32.0);

        let slow = calculate_advanced_score(10.0, BloomLevel::Knowledge, 120_000);
        assert_eq!(slow.time_ratio, 0.5);
        assert_eq!(slow.final_score, 5.0);

        let on_target = calculate_advanced_score(10.0, BloomLevel::Application, 35_000);
        assert_eq!(on_target.final_score, 13.0);
    }

    #[test]
    fn t_max_combines_reading_and_complexity() {
        // 780 chars = 60 s reading, (15 + 4) * 1.5 = 28.5 s, 10 s buffer
        assert_eq!(calculate_t_max(780, 2, BloomLevel::Analysis, DEFAULT_BUFFER_SECONDS), 98_500);
        assert_eq!(calculate_t_max(0, 0, BloomLevel::Knowledge, 0.0), 15_000);
    }

    #[test]
    fn focus_power_floors_denominator() {
        assert_eq!(calculate_focus_power(120.0, 1.0, 0.0), 40);
        assert_eq!(calculate_focus_power(0.0, 10.0, 10.0), 0);
        assert_eq!(calculate_focus_power(1800.0, 300.0, 60.0), 100);
    }

    #[test]
    fn focus_score_is_work_share() {
        assert_eq!(calculate_focus_score(FocusTotals { work_sec: 0.0, break_sec: 0.0 }), 0);
        assert_eq!(calculate_focus_score(FocusTotals { work_sec: 1500.0, break_sec: 300.0 }), 83);
    }
}
