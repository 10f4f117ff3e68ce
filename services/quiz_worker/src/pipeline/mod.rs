pub mod events;
pub mod follow_up;
pub mod generation;
pub mod refill;
pub mod session_runner;
pub mod state;

pub use events::{EventSink, GenerationEvent, GenerationStep};
pub use follow_up::{generate_follow_up, spawn_follow_up, FollowUpRequest};
pub use generation::{GenerationError, GenerationOptions, GenerationOrchestrator, GenerationReport};
pub use refill::{needs_refill, spawn_refill, target_quotas};
pub use session_runner::{QuizRunner, RunnerError};
pub use state::AppState;
