//! services/quiz_worker/src/pipeline/events.rs
//!
//! Progress events emitted by the generation pipeline. They are a side channel
//! for observers; nothing in the pipeline depends on anyone listening.

use quiz_engine_core::tasks::TaskLogger;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStep {
    Init,
    Mapping,
    Generating,
    Validating,
    Saving,
    Completed,
    Error,
}

/// Represents the structured messages the pipeline sends to an observer.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    Log {
        step: GenerationStep,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    /// `count` is the running number of questions saved in this pass.
    QuestionSaved { question_id: Uuid, usage_type: String, count: u32 },
    Completed { chunk_id: Uuid, generated: u32 },
    Failed { chunk_id: Uuid, message: String },
}

/// Cheap, cloneable handle for emitting events. A disconnected or absent
/// receiver is ignored.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<GenerationEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<GenerationEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    /// A sink that drops everything, for background passes nobody watches.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: GenerationEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                debug!("Generation event receiver dropped");
            }
        }
    }

    pub fn log(&self, step: GenerationStep, message: impl Into<String>, details: Option<Value>) {
        self.emit(GenerationEvent::Log { step, message: message.into(), details });
    }

    /// Adapts the sink into a task logger that tags every message with `step`.
    pub fn for_step(&self, step: GenerationStep) -> StepLogger {
        StepLogger { sink: self.clone(), step }
    }
}

pub struct StepLogger {
    sink: EventSink,
    step: GenerationStep,
}

impl TaskLogger for StepLogger {
    fn log(&self, message: &str, details: Option<&Value>) {
        debug!(step = ?self.step, "{message}");
        self.sink.log(self.step, message, details.cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = GenerationEvent::Log { step: GenerationStep::Mapping, message: "mapping".into(), details: None };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["step"], "MAPPING");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn step_logger_forwards_to_the_channel() {
        let (sink, mut rx) = EventSink::channel();
        sink.for_step(GenerationStep::Validating).log("Validating question", None);
        match rx.try_recv().unwrap() {
            GenerationEvent::Log { step, message, .. } => {
                assert_eq!(step, GenerationStep::Validating);
                assert_eq!(message, "Validating question");
            }
            other => panic!("unexpected event {other:?}"),
        }
        EventSink::silent().log(GenerationStep::Init, "dropped", None);
    }
}
