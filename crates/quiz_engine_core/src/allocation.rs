//! crates/quiz_engine_core/src/allocation.rs
//!
//! Splits an exam's question budget across chunks and sizes per-chunk pools.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::{Importance, QuotaSet};
use crate::scoring::round_half_up;

//=========================================================================================
// Question weight allocator
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetrics {
    pub id: Uuid,
    pub concept_count: u32,
    /// 1 to 5; `None` is treated as the midpoint 3.
    pub difficulty_index: Option<u8>,
    /// 0 to 100.
    pub mastery_score: f64,
}

#[derive(Debug, Clone)]
pub struct ExamDistributionInput {
    pub exam_total: u32,
    pub importance: Importance,
    pub chunks: Vec<ChunkMetrics>,
}

const IMPORTANCE_WEIGHT: f64 = 0.4;
const MASTERY_WEIGHT: f64 = 0.3;
const DENSITY_WEIGHT: f64 = 0.2;
const LENGTH_WEIGHT: f64 = 0.1;

fn chunk_weight(chunk: &ChunkMetrics, importance: f64, max_concepts: f64) -> f64 {
    let mastery_factor = 1.0 - (chunk.mastery_score / 100.0).clamp(0.0, 1.0);
    let difficulty = f64::from(chunk.difficulty_index.filter(|d| *d > 0).unwrap_or(3));
    let density_factor = (difficulty - 1.0) / 4.0;
    let length_factor = f64::from(chunk.concept_count) / max_concepts;

    importance * IMPORTANCE_WEIGHT
        + mastery_factor * MASTERY_WEIGHT
        + density_factor * DENSITY_WEIGHT
        + length_factor * LENGTH_WEIGHT
}

/// Distributes `exam_total` questions over the chunks. The result always sums
/// to `exam_total` for a non-empty chunk list.
pub fn calculate_question_weights(input: &ExamDistributionInput) -> HashMap<Uuid, u32> {
    let n = input.chunks.len();
    if n == 0 {
        return HashMap::new();
    }

    let importance = input.importance.score();
    let max_concepts = f64::from(input.chunks.iter().map(|c| c.concept_count).max().unwrap_or(0).max(1));
    let weights: Vec<f64> = input
        .chunks
        .iter()
        .map(|c| chunk_weight(c, importance, max_concepts))
        .collect();
    let total_weight: f64 = weights.iter().sum();

    if total_weight <= 0.0 {
        return even_split(input.exam_total, &input.chunks);
    }

    // Largest-remainder apportionment.
    let exam_total = f64::from(input.exam_total);
    let mut allocations: Vec<(Uuid, u32, f64)> = input
        .chunks
        .iter()
        .zip(&weights)
        .map(|(chunk, weight)| {
            let exact = weight / total_weight * exam_total;
            let floor = exact.floor();
            (chunk.id, floor as u32, exact - floor)
        })
        .collect();

    let assigned: u32 = allocations.iter().map(|(_, count, _)| *count).sum();
    let shortfall = input.exam_total.saturating_sub(assigned) as usize;

    // Stable sort keeps iteration order among equal remainders.
    allocations.sort_by(|a, b| b.2.total_cmp(&a.2));
    for i in 0..shortfall {
        allocations[i % n].1 += 1;
    }

    allocations.into_iter().map(|(id, count, _)| (id, count)).collect()
}

fn even_split(exam_total: u32, chunks: &[ChunkMetrics]) -> HashMap<Uuid, u32> {
    let n = chunks.len() as u32;
    let base = exam_total / n;
    let remainder = (exam_total % n) as usize;
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, base + u32::from(i < remainder)))
        .collect()
}

//=========================================================================================
// Quota protection and sizing
//=========================================================================================

pub const DEFAULT_QUOTAS: QuotaSet = QuotaSet { antrenman: 5, arsiv: 2, deneme: 2 };
pub const MIN_QUOTAS: QuotaSet = QuotaSet { antrenman: 3, arsiv: 1, deneme: 1 };

/// Pool sizes as suggested by the model, before any protection is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuggestedQuotas {
    pub antrenman: Option<i64>,
    pub arsiv: Option<i64>,
    pub deneme: Option<i64>,
}

fn protect(value: Option<i64>, default: u32, minimum: u32) -> u32 {
    let value = value.unwrap_or(i64::from(default));
    value.clamp(i64::from(minimum), i64::from(u32::MAX)) as u32
}

/// Fills missing suggestions with defaults and lifts every pool to its minimum.
pub fn validate_and_protect_quotas(suggested: Option<&SuggestedQuotas>) -> QuotaSet {
    let Some(s) = suggested else {
        return DEFAULT_QUOTAS;
    };
    QuotaSet {
        antrenman: protect(s.antrenman, DEFAULT_QUOTAS.antrenman, MIN_QUOTAS.antrenman),
        arsiv: protect(s.arsiv, DEFAULT_QUOTAS.arsiv, MIN_QUOTAS.arsiv),
        deneme: protect(s.deneme, DEFAULT_QUOTAS.deneme, MIN_QUOTAS.deneme),
    }
}

/// Sizes a chunk's pools from its meaningful word count and concept density (0 to 1).
pub fn calculate_dynamic_quota(meaningful_word_count: u32, density_score: f64) -> QuotaSet {
    let base = f64::from(meaningful_word_count) / 45.0;
    let multiplier = if density_score > 0.55 {
        1.2
    } else if density_score < 0.25 {
        0.8
    } else {
        1.0
    };
    let antrenman = (round_half_up(base * multiplier) as u32).max(MIN_QUOTAS.antrenman);
    let side = (f64::from(antrenman) * 0.25).ceil() as u32;
    QuotaSet { antrenman, arsiv: side, deneme: side }
}
