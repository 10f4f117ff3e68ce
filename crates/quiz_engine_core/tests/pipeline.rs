use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quiz_engine_core::domain::{BloomLevel, Concept, Decision, GeneratedQuestion, Importance, UsageType};
use quiz_engine_core::ports::{
    ChatMessage, ChatRole, CompletionOptions, LanguageModelService, ModelRole, PortError, PortResult,
};
use quiz_engine_core::tasks::{
    AnalysisInput, AnalysisTask, DraftingInput, DraftingTask, RevisionInput, RevisionTask, StructuredGenerator, Task,
    TaskContext, TaskError, TaskLogger, ValidationInput, ValidationTask,
};

/// Replays canned responses in order and records every transcript it receives.
#[derive(Default)]
struct ScriptedLlm {
    replies: Mutex<VecDeque<PortResult<String>>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<PortResult<String>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()), calls: Mutex::default() })
    }

    fn calls(&self) -> Vec<(Vec<ChatMessage>, CompletionOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModelService for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> PortResult<String> {
        self.calls.lock().unwrap().push((messages.to_vec(), options.clone()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Provider("script exhausted".into())))
    }
}

#[derive(Default)]
struct CollectingLogger(Mutex<Vec<String>>);

impl TaskLogger for CollectingLogger {
    fn log(&self, message: &str, _details: Option<&serde_json::Value>) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

const QUESTION_JSON: &str = r#"{
    "q": "Which process converts light energy into chemical energy?",
    "o": ["Respiration", "Photosynthesis", "Fermentation", "Transpiration", "Osmosis"],
    "a": 1,
    "exp": "The text states that photosynthesis stores light energy as glucose.",
    "evidence": "Photosynthesis stores light energy as glucose.",
    "img": null
}"#;

fn sample_question() -> GeneratedQuestion {
    GeneratedQuestion {
        text: "Which process converts light energy into chemical energy?".into(),
        options: vec!["A".into(), "B".into(), "C".into(), "D".into(), "E".into()],
        correct_index: 1,
        explanation: "Photosynthesis stores light energy.".into(),
        evidence: "Photosynthesis stores light energy as glucose.".into(),
        bloom_level: BloomLevel::Analysis,
        concept: "Photosynthesis".into(),
        image_index: Some(2),
        diagnosis: None,
        insight: None,
    }
}

#[tokio::test]
async fn analysis_recovers_after_schema_retry() {
    let llm = ScriptedLlm::new(vec![
        Ok("I could not find any concepts.".into()),
        Ok(r#"```json
{"difficulty_index": "4", "concepts": [{"title": "Photosynthesis", "odak": "Energy conversion", "seviye": "Analiz"}],
 "quotas": {"antrenman": 1, "arsiv": 0}}
```"#
            .into()),
    ]);
    let logger = Arc::new(CollectingLogger::default());
    let ctx = TaskContext::default().with_logger(logger.clone());
    let task = AnalysisTask::new(StructuredGenerator::new(llm.clone()));

    let input = AnalysisInput {
        content: "Photosynthesis stores light energy as glucose.".into(),
        course_name: "Biology".into(),
        section_title: "Plants".into(),
        importance: Importance::High,
        word_count: 450,
        meaningful_word_count: None,
        density_score: None,
    };
    let result = task.run(&input, &ctx).await.unwrap();

    assert_eq!(result.difficulty_index, 4);
    assert_eq!(result.concepts.len(), 1);
    assert_eq!(result.concepts[0].title, "Photosynthesis");
    assert_eq!(result.concepts[0].level, Some(BloomLevel::Analysis));
    assert_eq!((result.quotas.antrenman, result.quotas.arsiv, result.quotas.deneme), (3, 1, 2));

    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1.role, ModelRole::Analysis);
    assert_eq!(calls[0].0.len(), 3);
    assert_eq!(calls[1].0.len(), 4);
    assert_eq!(calls[1].0.last().unwrap().role, ChatRole::User);
    assert!(logger.0.lock().unwrap().iter().any(|m| m.starts_with("Retry attempt")));
}

#[tokio::test]
async fn structured_generation_gives_up_after_retries() {
    let llm = ScriptedLlm::new(vec![
        Err(PortError::Provider("timeout".into())),
        Ok("not json".into()),
        Ok(r#"{"q": "short", "o": [], "a": 9}"#.into()),
    ]);
    let task = DraftingTask::new(StructuredGenerator::new(llm.clone()));
    let input = DraftingInput {
        concept: Concept::new("Photosynthesis", "Energy conversion"),
        index: 0,
        course_name: "Biology".into(),
        usage_type: UsageType::Antrenman,
        previous_diagnoses: Vec::new(),
        shared_context: "--- CONTEXT ---".into(),
    };

    let err = task.run(&input, &TaskContext::default()).await.unwrap_err();
    assert!(matches!(err, TaskError::Schema(_)));
    assert_eq!(llm.calls().len(), 3);
}

#[tokio::test]
async fn drafting_stamps_strategy_and_concept() {
    let llm = ScriptedLlm::new(vec![Ok(QUESTION_JSON.into())]);
    let task = DraftingTask::new(StructuredGenerator::new(llm.clone()));
    let input = DraftingInput {
        concept: Concept::new("Photosynthesis", "Energy conversion").with_level(BloomLevel::Application),
        index: 0,
        course_name: "Biology".into(),
        usage_type: UsageType::Deneme,
        previous_diagnoses: vec!["Confuses respiration with photosynthesis".into()],
        shared_context: "--- CONTEXT ---".into(),
    };

    let question = task.run(&input, &TaskContext::default()).await.unwrap();
    assert_eq!(question.bloom_level, BloomLevel::Application);
    assert_eq!(question.concept, "Photosynthesis");
    assert_eq!(question.correct_index, 1);
    assert_eq!(question.image_index, None);

    let calls = llm.calls();
    assert_eq!(calls[0].1.role, ModelRole::Drafting);
    assert!(calls[0].0[2].content.contains("Confuses respiration"));
}

#[tokio::test]
async fn validation_reconciles_decision_with_score() {
    let llm = ScriptedLlm::new(vec![
        Ok(r#"{"total_score": 85, "decision": "REJECTED", "critical_faults": ["none really"]}"#.into()),
        Ok(r#"{"puan": "40", "decision": "approve", "improvement_suggestion": "Tie the distractors to the text."}"#
            .into()),
    ]);
    let task = ValidationTask::new(StructuredGenerator::new(llm.clone()));
    let input = ValidationInput { question: sample_question(), content: "Photosynthesis stores light energy.".into() };

    let approved = task.run(&input, &TaskContext::default()).await.unwrap();
    assert_eq!(approved.decision, Decision::Approved);
    assert!(approved.critical_faults.is_empty());

    let rejected = task.run(&input, &TaskContext::default()).await.unwrap();
    assert_eq!(rejected.decision, Decision::Rejected);
    assert_eq!(rejected.total_score, 40.0);
    assert_eq!(rejected.improvement_suggestion, "Tie the distractors to the text.");
    assert_eq!(llm.calls()[0].1.temperature, 0.0);
}

#[tokio::test]
async fn revision_keeps_level_concept_and_image() {
    let llm = ScriptedLlm::new(vec![Ok(QUESTION_JSON.into())]);
    let task = RevisionTask::new(StructuredGenerator::new(llm));
    let validation = quiz_engine_core::domain::ValidationResult {
        decision: Decision::Rejected,
        total_score: 55.0,
        critical_faults: vec!["Two options are correct".into()],
        improvement_suggestion: "Make option C clearly wrong.".into(),
    };
    let input = RevisionInput { question: sample_question(), validation, shared_context: "--- CONTEXT ---".into() };

    let revised = task.run(&input, &TaskContext::default()).await.unwrap();
    assert_eq!(revised.bloom_level, BloomLevel::Analysis);
    assert_eq!(revised.concept, "Photosynthesis");
    assert_eq!(revised.image_index, Some(2));
    assert_eq!(revised.options[1], "Photosynthesis");
}
