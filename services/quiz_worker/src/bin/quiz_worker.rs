//! services/quiz_worker/src/bin/quiz_worker.rs
//!
//! Runs a generation pass for every chunk id given on the command line.
//! `--reanalyse` forces a fresh concept map. Ctrl-C stops after the current concept.

use async_openai::{config::OpenAIConfig, Client};
use quiz_worker_lib::{
    adapters::{DbAdapter, ModelRouting, OpenAiLlmAdapter, RateLimitedLlm},
    config::Config,
    error::WorkerError,
    pipeline::{AppState, EventSink, GenerationEvent, GenerationOptions, GenerationOrchestrator},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting worker...");

    let mut options = GenerationOptions::default();
    let mut chunk_ids = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--reanalyse" {
            options.reanalyse = true;
            continue;
        }
        let id = Uuid::parse_str(&arg).map_err(|e| WorkerError::Internal(format!("Invalid chunk id '{arg}': {e}")))?;
        chunk_ids.push(id);
    }
    if chunk_ids.is_empty() {
        return Err(WorkerError::Internal("Usage: quiz_worker [--reanalyse] <chunk-id>...".to_string()));
    }

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Language Model ---
    let mut openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| WorkerError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    if let Some(base_url) = &config.llm_base_url {
        openai_config = openai_config.with_api_base(base_url);
    }
    let models = ModelRouting {
        analysis: config.analysis_model.clone(),
        drafting: config.drafting_model.clone(),
        validation: config.validation_model.clone(),
    };
    let llm = Arc::new(OpenAiLlmAdapter::new(Client::with_config(openai_config), models));
    let llm = Arc::new(RateLimitedLlm::new(llm, config.llm_requests_per_minute));

    // --- 4. Build the Shared AppState ---
    let state = AppState::from_store(db_adapter, llm);
    let orchestrator = GenerationOrchestrator::new(state);

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current concept");
            ctrl_c_token.cancel();
        }
    });

    // --- 5. Run ---
    let (events, mut rx) = EventSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                GenerationEvent::Log { step, message, .. } => info!(?step, "{message}"),
                GenerationEvent::QuestionSaved { question_id, usage_type, count } => {
                    info!(%question_id, %usage_type, count, "Question saved")
                }
                GenerationEvent::Completed { chunk_id, generated } => info!(%chunk_id, generated, "Chunk completed"),
                GenerationEvent::Failed { chunk_id, message } => error!(%chunk_id, "{message}"),
            }
        }
    });

    let mut failures = 0;
    for chunk_id in chunk_ids {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = orchestrator.generate_for_chunk(chunk_id, &options, &events, &cancel).await {
            error!(%chunk_id, error = %e, "Chunk generation failed");
            failures += 1;
        }
    }

    drop(events);
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer stopped abnormally");
    }

    if failures > 0 {
        return Err(WorkerError::Internal(format!("{failures} chunk(s) failed")));
    }
    Ok(())
}
