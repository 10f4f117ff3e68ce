pub mod allocation;
pub mod domain;
pub mod lenient_json;
pub mod ports;
pub mod prompts;
pub mod scoring;
pub mod session;
pub mod shelf;
pub mod streak;
pub mod tasks;

pub use domain::{
    BloomLevel, ChunkMastery, ChunkStatus, Concept, ContentChunk, Decision, GeneratedQuestion, Importance, NewQuestion,
    QuestionAttempt, QuizResults, QuotaSet, ResponseType, ShelfStatus, StoredQuestion, SubjectGuidelines, UsageType,
    UserQuestionStatus, ValidationResult,
};
pub use ports::{
    ChatMessage, ChatRole, CompletionOptions, ContentSource, LanguageModelService, ModelRole, PortError, PortResult,
    QuestionRepository, QuotaStore,
};
pub use session::{Advance, AnswerOutcome, QuizSession, SessionClock, SessionError, SessionState};
pub use tasks::{Task, TaskContext, TaskError, TaskLogger, TaskResult};
