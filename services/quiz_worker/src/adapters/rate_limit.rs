//! services/quiz_worker/src/adapters/rate_limit.rs
//!
//! A decorator over any `LanguageModelService` that spaces calls out so the
//! provider's per-minute request limit is never exceeded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quiz_engine_core::ports::{ChatMessage, CompletionOptions, LanguageModelService, PortResult};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct RateLimitedLlm {
    inner: Arc<dyn LanguageModelService>,
    min_interval: Duration,
    /// When the next call may start. Held across the wait so callers queue in order.
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimitedLlm {
    pub fn new(inner: Arc<dyn LanguageModelService>, requests_per_minute: u32) -> Self {
        let min_interval = Duration::from_secs_f64(60.0 / f64::from(requests_per_minute.max(1)));
        Self { inner, min_interval, next_slot: Mutex::new(None) }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(at) = *next_slot {
            if at > Instant::now() {
                debug!(wait_ms = (at - Instant::now()).as_millis() as u64, "Rate limit: waiting for next slot");
                tokio::time::sleep_until(at).await;
            }
        }
        *next_slot = Some(Instant::now() + self.min_interval);
    }
}

#[async_trait]
impl LanguageModelService for RateLimitedLlm {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> PortResult<String> {
        self.acquire().await;
        self.inner.complete(messages, options).await
    }
}
