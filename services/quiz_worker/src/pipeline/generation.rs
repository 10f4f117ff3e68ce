//! services/quiz_worker/src/pipeline/generation.rs
//!
//! The generation orchestrator: analyse a chunk once, then draft, validate,
//! optionally revise and save questions one concept at a time until each
//! usage pool reaches its quota.
//!
//! Calls are strictly sequential per chunk. A failed concept is logged and
//! skipped; only a failed analysis or a storage error aborts the pass.

use std::sync::Arc;

use quiz_engine_core::allocation::calculate_dynamic_quota;
use quiz_engine_core::domain::{
    BloomLevel, ChunkStatus, Concept, ContentChunk, NewQuestion, QuotaSet, UsageType,
};
use quiz_engine_core::ports::PortError;
use quiz_engine_core::prompts;
use quiz_engine_core::tasks::{
    AnalysisInput, AnalysisTask, DraftingInput, DraftingTask, RevisionInput, RevisionTask, StructuredGenerator, Task,
    TaskContext, TaskError, ValidationInput, ValidationTask,
};
use rand::seq::SliceRandom;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::events::{EventSink, GenerationEvent, GenerationStep};
use super::state::AppState;

/// A phase gives up after this many concepts fail in a row.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

const REFRESH_FOCUS: &str = "Concept reinforcement and refresh";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Chunk {0} not found")]
    ChunkNotFound(Uuid),
    #[error("Concept mapping failed: {0}")]
    Analysis(#[source] TaskError),
    #[error(transparent)]
    Port(#[from] PortError),
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Pools to fill, in order.
    pub usage_types: Vec<UsageType>,
    /// Re-run analysis even when the chunk already has a concept map.
    pub reanalyse: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { usage_types: UsageType::ALL.to_vec(), reanalyse: false }
    }
}

impl GenerationOptions {
    pub fn only(usage: UsageType) -> Self {
        Self { usage_types: vec![usage], reanalyse: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    pub chunk_id: Uuid,
    /// Questions saved in this pass, per pool.
    pub generated: QuotaSet,
    /// Concepts that produced no approved question.
    pub failed: u32,
    pub cancelled: bool,
}

/// Everything one concept's draft needs besides the concept itself.
struct ChunkContext<'a> {
    chunk: &'a ContentChunk,
    clean_content: String,
    shared_context: String,
}

pub struct GenerationOrchestrator {
    state: AppState,
    analysis: AnalysisTask,
    drafting: DraftingTask,
    validation: ValidationTask,
    revision: RevisionTask,
    max_consecutive_failures: u32,
}

impl GenerationOrchestrator {
    pub fn new(state: AppState) -> Self {
        let generator = StructuredGenerator::new(state.llm.clone());
        Self {
            analysis: AnalysisTask::new(generator.clone()),
            drafting: DraftingTask::new(generator.clone()),
            validation: ValidationTask::new(generator.clone()),
            revision: RevisionTask::new(generator),
            state,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    //-------------------------------------------------------------------------------------
    // Chunk pass
    //-------------------------------------------------------------------------------------

    /// Runs one full generation pass and keeps the chunk's status flag in step.
    pub async fn generate_for_chunk(
        &self,
        chunk_id: Uuid,
        options: &GenerationOptions,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport, GenerationError> {
        events.log(GenerationStep::Init, "Loading chunk", Some(json!({ "chunk_id": chunk_id })));
        self.state.content.update_chunk_status(chunk_id, ChunkStatus::Processing).await?;

        match self.run_pass(chunk_id, options, events, cancel).await {
            Ok(report) => {
                let status = if report.cancelled { ChunkStatus::Synced } else { ChunkStatus::Completed };
                self.state.content.update_chunk_status(chunk_id, status).await?;
                info!(%chunk_id, generated = report.generated.total(), cancelled = report.cancelled, "Generation pass finished");
                events.log(
                    GenerationStep::Completed,
                    "Generation finished",
                    Some(json!({ "total": report.generated.total(), "failed": report.failed })),
                );
                events.emit(GenerationEvent::Completed { chunk_id, generated: report.generated.total() });
                Ok(report)
            }
            Err(e) => {
                error!(%chunk_id, error = %e, "Generation pass failed");
                events.log(GenerationStep::Error, e.to_string(), None);
                events.emit(GenerationEvent::Failed { chunk_id, message: e.to_string() });
                if let Err(status_err) = self.state.content.update_chunk_status(chunk_id, ChunkStatus::Failed).await {
                    warn!(%chunk_id, error = %status_err, "Could not mark chunk as failed");
                }
                Err(e)
            }
        }
    }

    async fn run_pass(
        &self,
        chunk_id: Uuid,
        options: &GenerationOptions,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport, GenerationError> {
        let mut chunk = self
            .state
            .content
            .get_chunk(chunk_id)
            .await?
            .ok_or(GenerationError::ChunkNotFound(chunk_id))?;

        let mut report = GenerationReport { chunk_id, ..Default::default() };

        // --- 1. Concept map ---
        if chunk.concept_map.is_empty() || options.reanalyse {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            self.analyse(&mut chunk, events).await?;
        }
        let quotas = chunk
            .quotas
            .unwrap_or_else(|| calculate_dynamic_quota(chunk.quota_word_count(), chunk.density()));

        // --- 2. Shared prompt context ---
        let guidelines = self.state.content.get_guidelines(chunk.course_id).await?;
        let clean_content = prompts::clean_reference_images(&chunk.content);
        let shared_context = prompts::build_context(
            &clean_content,
            Some(&chunk.course_name),
            Some(&chunk.section_title),
            guidelines.as_ref(),
        );
        let ctx = ChunkContext { chunk: &chunk, clean_content, shared_context };

        // --- 3. Phases ---
        let existing = self.state.quotas.get_usage_counts(chunk_id).await?;
        for usage in &options.usage_types {
            let remaining = quotas.get(*usage).saturating_sub(existing.get(*usage));
            if remaining == 0 {
                events.log(
                    GenerationStep::Generating,
                    format!("Quota already met: {}", usage.as_str()),
                    Some(json!({ "quota": quotas.get(*usage) })),
                );
                continue;
            }

            self.run_phase(&ctx, *usage, remaining, events, cancel, &mut report).await?;
            if report.cancelled {
                break;
            }
        }

        Ok(report)
    }

    async fn analyse(&self, chunk: &mut ContentChunk, events: &EventSink) -> Result<(), GenerationError> {
        events.log(GenerationStep::Mapping, "Extracting concept map", None);

        let input = AnalysisInput {
            content: chunk.content.clone(),
            course_name: chunk.course_name.clone(),
            section_title: chunk.section_title.clone(),
            importance: chunk.importance,
            word_count: chunk.word_count,
            meaningful_word_count: chunk.meaningful_word_count,
            density_score: chunk.density_score,
        };
        let ctx = TaskContext::new(chunk.id).with_logger(Arc::new(events.for_step(GenerationStep::Mapping)));
        let map = self.analysis.run(&input, &ctx).await.map_err(GenerationError::Analysis)?;

        self.state
            .content
            .update_chunk_analysis(chunk.id, map.difficulty_index, &map.concepts, map.quotas)
            .await?;
        events.log(
            GenerationStep::Mapping,
            "Concept map saved",
            Some(json!({ "concepts": map.concepts.len(), "difficulty_index": map.difficulty_index })),
        );

        chunk.difficulty_index = Some(map.difficulty_index);
        chunk.concept_map = map.concepts;
        chunk.quotas = Some(map.quotas);
        Ok(())
    }

    /// Fills one pool. Training follows the concept map order; the other pools
    /// visit concepts in a shuffled order. Concepts are cycled when the pool
    /// needs more questions than there are concepts.
    async fn run_phase(
        &self,
        ctx: &ChunkContext<'_>,
        usage: UsageType,
        remaining: u32,
        events: &EventSink,
        cancel: &CancellationToken,
        report: &mut GenerationReport,
    ) -> Result<(), GenerationError> {
        let concepts = &ctx.chunk.concept_map;
        if concepts.is_empty() {
            return Ok(());
        }

        let mut order: Vec<usize> = (0..concepts.len()).collect();
        if usage != UsageType::Antrenman {
            order.shuffle(&mut rand::rng());
        }

        events.log(
            GenerationStep::Generating,
            format!("Starting generation: {}", usage.as_str().to_uppercase()),
            Some(json!({ "target": remaining })),
        );

        let mut produced = 0;
        let mut consecutive_failures = 0;
        let mut step = 0usize;

        while produced < remaining {
            if consecutive_failures >= self.max_consecutive_failures {
                warn!(chunk_id = %ctx.chunk.id, usage = usage.as_str(), "Stopping phase after repeated failures");
                events.log(
                    GenerationStep::Error,
                    format!("Too many consecutive failures, stopping {}", usage.as_str()),
                    None,
                );
                break;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let index = order[step % order.len()];
            step += 1;
            let concept = &concepts[index];
            events.log(
                GenerationStep::Generating,
                format!("Processing concept: {}", concept.title),
                Some(json!({ "index": index + 1 })),
            );

            let saved = tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                saved = self.produce_question(ctx, concept, index, usage, events) => saved?,
            };

            match saved {
                Some(question_id) => {
                    produced += 1;
                    consecutive_failures = 0;
                    report.generated.increment(usage);
                    events.emit(GenerationEvent::QuestionSaved {
                        question_id,
                        usage_type: usage.as_str().to_string(),
                        count: report.generated.total(),
                    });
                }
                None => {
                    consecutive_failures += 1;
                    report.failed += 1;
                }
            }
        }

        Ok(())
    }

    /// Draft, validate, revise at most once, then save. `Ok(None)` means the
    /// concept produced nothing usable; only storage errors are returned as `Err`.
    async fn produce_question(
        &self,
        ctx: &ChunkContext<'_>,
        concept: &Concept,
        index: usize,
        usage: UsageType,
        events: &EventSink,
    ) -> Result<Option<Uuid>, GenerationError> {
        let task_ctx = |step| TaskContext::new(ctx.chunk.id).with_logger(Arc::new(events.for_step(step)));

        let draft_input = DraftingInput {
            concept: concept.clone(),
            index,
            course_name: ctx.chunk.course_name.clone(),
            usage_type: usage,
            previous_diagnoses: Vec::new(),
            shared_context: ctx.shared_context.clone(),
        };
        let mut question = match self.drafting.run(&draft_input, &task_ctx(GenerationStep::Generating)).await {
            Ok(q) => q,
            Err(e) => {
                warn!(concept = %concept.title, error = %e, "Drafting failed");
                events.log(GenerationStep::Error, "Drafting failed", Some(json!({ "concept": concept.title, "error": e.to_string() })));
                return Ok(None);
            }
        };

        let validate = |question| ValidationInput { question, content: ctx.clean_content.clone() };
        let mut verdict = match self.validation.run(&validate(question.clone()), &task_ctx(GenerationStep::Validating)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(concept = %concept.title, error = %e, "Validation failed");
                return Ok(None);
            }
        };

        if !verdict.is_approved() {
            events.log(GenerationStep::Validating, "Attempting revision", Some(json!({ "score": verdict.total_score })));
            let revision_input = RevisionInput {
                question: question.clone(),
                validation: verdict.clone(),
                shared_context: ctx.shared_context.clone(),
            };
            match self.revision.run(&revision_input, &task_ctx(GenerationStep::Validating)).await {
                Ok(revised) => {
                    question = revised;
                    verdict = match self
                        .validation
                        .run(&validate(question.clone()), &task_ctx(GenerationStep::Validating))
                        .await
                    {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(concept = %concept.title, error = %e, "Re-validation failed");
                            return Ok(None);
                        }
                    };
                }
                Err(e) => warn!(concept = %concept.title, error = %e, "Revision failed"),
            }
        }

        if !verdict.is_approved() {
            events.log(
                GenerationStep::Error,
                "Question not approved",
                Some(json!({ "concept": concept.title, "score": verdict.total_score })),
            );
            return Ok(None);
        }

        let id = self
            .state
            .questions
            .save_question(NewQuestion {
                id: Uuid::new_v4(),
                chunk_id: ctx.chunk.id,
                course_id: ctx.chunk.course_id,
                section_title: ctx.chunk.section_title.clone(),
                usage_type: usage,
                question,
                created_by: None,
                parent_question_id: None,
            })
            .await?;
        events.log(GenerationStep::Saving, "Question saved", Some(json!({ "concept": concept.title, "id": id })));
        Ok(Some(id))
    }

    //-------------------------------------------------------------------------------------
    // Archive refresh
    //-------------------------------------------------------------------------------------

    /// Writes a fresh archive question for the concept of an archived one, so a
    /// returning learner does not meet the exact same wording again.
    /// Returns `None` when nothing could be produced.
    pub async fn refresh_archived(&self, question_id: Uuid, events: &EventSink) -> Result<Option<Uuid>, GenerationError> {
        let Some(original) = self.state.questions.get_question(question_id).await? else {
            return Ok(None);
        };
        if original.question.concept.is_empty() {
            return Ok(None);
        }
        let chunk = self
            .state
            .content
            .get_chunk(original.chunk_id)
            .await?
            .ok_or(GenerationError::ChunkNotFound(original.chunk_id))?;

        let guidelines = self.state.content.get_guidelines(chunk.course_id).await?;
        let clean_content = prompts::clean_reference_images(&chunk.content);
        let shared_context = prompts::build_context(
            &clean_content,
            Some(&chunk.course_name),
            Some(&chunk.section_title),
            guidelines.as_ref(),
        );
        let ctx = ChunkContext { chunk: &chunk, clean_content, shared_context };

        let concept = Concept::new(original.question.concept.clone(), REFRESH_FOCUS).with_level(BloomLevel::Knowledge);
        self.produce_question(&ctx, &concept, 0, UsageType::Arsiv, events).await
    }
}
