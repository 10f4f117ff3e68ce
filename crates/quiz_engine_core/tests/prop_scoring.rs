use proptest::prelude::*;
use quiz_engine_core::domain::{BloomLevel, QuizResults, ResponseType};
use quiz_engine_core::scoring::{
    calculate_advanced_score, calculate_chunk_mastery, calculate_focus_power, calculate_mastery,
    calculate_score_change, calculate_test_results,
};

fn response_strategy() -> impl Strategy<Value = ResponseType> {
    prop_oneof![Just(ResponseType::Correct), Just(ResponseType::Incorrect), Just(ResponseType::Blank)]
}

proptest! {
    #[test]
    fn score_change_stays_in_range(response in response_strategy(), current in 0u8..=100, repeated in any::<bool>()) {
        let change = calculate_score_change(response, current, repeated);
        prop_assert!(change.new_score <= 100);
        let expected = (i32::from(current) + change.delta).clamp(0, 100);
        prop_assert_eq!(i32::from(change.new_score), expected);
    }

    #[test]
    fn test_results_percentages_are_bounded(
        correct in 0u32..1000,
        incorrect in 0u32..1000,
        blank in 0u32..1000,
        ms in 0u64..10_000_000,
    ) {
        let summary = calculate_test_results(correct, incorrect, blank, ms);
        prop_assert!(summary.percentage <= 100);
        prop_assert!(summary.mastery_score <= 100);
        prop_assert!(summary.mastery_score >= summary.percentage);
        prop_assert_eq!(summary.pending_review, incorrect + blank);
    }

    #[test]
    fn chunk_mastery_is_bounded(total in 0u32..500, solved in 0u32..1000, avg in -50.0f64..200.0) {
        prop_assert!(calculate_chunk_mastery(total, solved, avg) <= 100);
    }

    #[test]
    fn advanced_time_ratio_is_clamped(delta in -20.0f64..20.0, ms in 0u64..600_000) {
        for bloom in [BloomLevel::Knowledge, BloomLevel::Application, BloomLevel::Analysis] {
            let score = calculate_advanced_score(delta, bloom, ms);
            prop_assert!(score.time_ratio >= 0.5 && score.time_ratio <= 2.0);
        }
    }
}

#[test]
fn clamping_scenarios() {
    assert_eq!(calculate_score_change(ResponseType::Incorrect, 3, true).new_score, 0);
    assert_eq!(calculate_score_change(ResponseType::Correct, 95, false).new_score, 100);
}

#[test]
fn zero_guards() {
    assert_eq!(calculate_mastery(&QuizResults::default(), 0), 0);
    let summary = calculate_test_results(0, 0, 0, 0);
    assert_eq!(summary.percentage, 0);
    assert_eq!(summary.mastery_score, 0);
}

#[test]
fn focus_power_floor() {
    assert_eq!(calculate_focus_power(120.0, 1.0, 0.0), 40);
    assert_eq!(calculate_focus_power(0.0, 10.0, 10.0), 0);
}
