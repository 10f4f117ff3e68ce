//! services/quiz_worker/src/pipeline/refill.rs
//!
//! Background top-up of a chunk's training pool after a quiz consumes it.

use std::sync::Arc;

use quiz_engine_core::allocation::calculate_dynamic_quota;
use quiz_engine_core::domain::{ContentChunk, QuotaSet, UsageType};
use quiz_engine_core::ports::PortResult;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::events::EventSink;
use super::generation::{GenerationOptions, GenerationOrchestrator};
use super::state::AppState;

/// The quotas a chunk should be filled to: its stored ones, or a fresh
/// estimate from size and density when analysis has not run yet.
pub fn target_quotas(chunk: &ContentChunk) -> QuotaSet {
    chunk
        .quotas
        .unwrap_or_else(|| calculate_dynamic_quota(chunk.quota_word_count(), chunk.density()))
}

/// True when the training pool holds fewer questions than its quota.
/// An unknown chunk never needs a refill.
pub async fn needs_refill(state: &AppState, chunk_id: Uuid) -> PortResult<bool> {
    let Some(chunk) = state.content.get_chunk(chunk_id).await? else {
        return Ok(false);
    };
    let target = target_quotas(&chunk).antrenman;
    let current = state.quotas.get_usage_counts(chunk_id).await?.antrenman;
    Ok(current < target)
}

/// Spawns a training-only generation pass for the chunk if its pool is short.
/// Errors are logged and never reach the caller.
pub fn spawn_refill(
    orchestrator: Arc<GenerationOrchestrator>,
    chunk_id: Uuid,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move { run_refill(&orchestrator, chunk_id, &cancel).await })
}

#[instrument(skip(orchestrator, cancel))]
async fn run_refill(orchestrator: &GenerationOrchestrator, chunk_id: Uuid, cancel: &CancellationToken) {
    match needs_refill(orchestrator.state(), chunk_id).await {
        Ok(false) => return,
        Ok(true) => info!("Training pool below quota, refilling"),
        Err(e) => {
            error!(error = %e, "Could not check training pool");
            return;
        }
    }

    let options = GenerationOptions::only(UsageType::Antrenman);
    match orchestrator
        .generate_for_chunk(chunk_id, &options, &EventSink::silent(), cancel)
        .await
    {
        Ok(report) => info!(generated = report.generated.antrenman, "Refill finished"),
        Err(e) => error!(error = %e, "Refill failed"),
    }
}
