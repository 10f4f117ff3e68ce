//! crates/quiz_engine_core/src/tasks/schema.rs
//!
//! Typed decoding of model responses. Raw wire structs are deserialized with
//! serde, then checked and coerced into domain types. Nothing untyped leaves
//! this module.

use serde::Deserialize;
use serde_json::Value;

use crate::allocation::{validate_and_protect_quotas, SuggestedQuotas};
use crate::domain::{BloomLevel, Concept, Decision, GeneratedQuestion, QuotaSet, ValidationResult, OPTION_COUNT};
use crate::lenient_json::JsonShape;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        SchemaError(e.to_string())
    }
}

/// A type that can be decoded from a leniently parsed model response.
pub trait ResponseSchema: Sized + Send {
    const SHAPE: JsonShape = JsonShape::Object;

    fn from_json(value: Value) -> Result<Self, SchemaError>;
}

//=========================================================================================
// Coercion helpers
//=========================================================================================

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Leading-digit integer parse, so "2" and "2 (chart)" both read as 2.
fn leading_int(s: &str) -> Option<u32> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn image_index(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) if s.is_empty() || s.eq_ignore_ascii_case("null") => None,
        Value::String(s) => leading_int(s),
        _ => None,
    }
}

fn level_from_text(value: &Value) -> Option<BloomLevel> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    Some(if text.contains("uygulama") || text.contains("appl") {
        BloomLevel::Application
    } else if text.contains("analiz") || text.contains("analy") {
        BloomLevel::Analysis
    } else {
        BloomLevel::Knowledge
    })
}

//=========================================================================================
// Concept map
//=========================================================================================

pub const DEFAULT_FOCUS: &str = "Core learning objective of the section";

#[derive(Debug, Deserialize)]
struct RawConcept {
    #[serde(default, alias = "title", alias = "kavram", alias = "başlık", alias = "topic")]
    baslik: Option<String>,
    #[serde(default)]
    odak: Option<String>,
    #[serde(default)]
    seviye: Option<Value>,
    #[serde(default)]
    gorsel: Option<Value>,
    #[serde(default, rename = "altText", alias = "alt_text")]
    alt_text: Option<String>,
    #[serde(default, rename = "isException", alias = "is_exception")]
    is_exception: Option<Value>,
    #[serde(default)]
    prerequisites: Option<Vec<String>>,
}

impl RawConcept {
    fn into_concept(self, position: usize) -> Result<Concept, SchemaError> {
        let title = self
            .baslik
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SchemaError(format!("concepts.{position}.baslik: required")))?;

        let image = match self.gorsel {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok(Concept {
            title,
            focus: self.odak.filter(|f| !f.trim().is_empty()).unwrap_or_else(|| DEFAULT_FOCUS.to_string()),
            level: self.seviye.as_ref().and_then(level_from_text),
            image,
            alt_text: self.alt_text.filter(|a| !a.is_empty()),
            is_exception: self.is_exception.as_ref().is_some_and(truthy),
            prerequisites: self.prerequisites.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawQuotas {
    #[serde(default)]
    antrenman: Option<Value>,
    #[serde(default)]
    arsiv: Option<Value>,
    #[serde(default)]
    deneme: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawConceptMap {
    #[serde(default, alias = "density_score")]
    difficulty_index: Option<Value>,
    #[serde(default)]
    concepts: Option<Vec<Value>>,
    #[serde(default)]
    quotas: Option<RawQuotas>,
}

/// Output of the analysis task.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptMapResult {
    pub difficulty_index: u8,
    pub concepts: Vec<Concept>,
    /// Protected pool sizes; minimums already applied.
    pub quotas: QuotaSet,
}

fn difficulty(value: Option<&Value>) -> u8 {
    let raw = value.and_then(as_number).filter(|n| n.is_finite()).unwrap_or(3.0);
    raw.clamp(1.0, 5.0).round() as u8
}

impl ResponseSchema for ConceptMapResult {
    fn from_json(value: Value) -> Result<Self, SchemaError> {
        let raw: RawConceptMap = serde_json::from_value(value)?;

        let concepts = raw
            .concepts
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, v)| serde_json::from_value::<RawConcept>(v)?.into_concept(i))
            .collect::<Result<Vec<_>, SchemaError>>()?;
        if concepts.is_empty() {
            return Err(SchemaError("concepts: must contain at least one concept".into()));
        }

        let quotas = raw.quotas.map(|q| {
            let int = |v: Option<Value>| v.as_ref().and_then(as_number).filter(|n| n.is_finite()).map(|n| n.round() as i64);
            SuggestedQuotas { antrenman: int(q.antrenman), arsiv: int(q.arsiv), deneme: int(q.deneme) }
        });

        Ok(ConceptMapResult {
            difficulty_index: difficulty(raw.difficulty_index.as_ref()),
            concepts,
            quotas: validate_and_protect_quotas(quotas.as_ref()),
        })
    }
}

//=========================================================================================
// Question
//=========================================================================================

pub const MIN_TEXT_LEN: usize = 10;
pub const MAX_NOTE_LEN: usize = 500;

#[derive(Debug, Deserialize)]
struct RawQuestion {
    q: String,
    o: Vec<String>,
    a: Value,
    exp: String,
    evidence: String,
    #[serde(default)]
    img: Option<Value>,
    #[serde(default)]
    diagnosis: Option<String>,
    #[serde(default)]
    insight: Option<String>,
}

/// A model-written question before the pipeline stamps bloom level and concept.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
    pub evidence: String,
    pub image_index: Option<u32>,
    pub diagnosis: Option<String>,
    pub insight: Option<String>,
}

impl QuestionDraft {
    pub fn into_question(self, bloom_level: BloomLevel, concept: impl Into<String>) -> GeneratedQuestion {
        GeneratedQuestion {
            text: self.text,
            options: self.options,
            correct_index: self.correct_index,
            explanation: self.explanation,
            evidence: self.evidence,
            bloom_level,
            concept: concept.into(),
            image_index: self.image_index,
            diagnosis: self.diagnosis,
            insight: self.insight,
        }
    }
}

fn answer_index(value: &Value) -> Option<usize> {
    let n = value.as_f64()?;
    (n.fract() == 0.0 && (0.0..OPTION_COUNT as f64).contains(&n)).then_some(n as usize)
}

fn bounded_note(field: &str, note: Option<String>) -> Result<Option<String>, SchemaError> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_LEN => {
            Err(SchemaError(format!("{field}: longer than {MAX_NOTE_LEN} characters")))
        }
        other => Ok(other.filter(|n| !n.trim().is_empty())),
    }
}

impl ResponseSchema for QuestionDraft {
    fn from_json(value: Value) -> Result<Self, SchemaError> {
        let raw: RawQuestion = serde_json::from_value(value)?;

        if raw.q.chars().count() < MIN_TEXT_LEN {
            return Err(SchemaError("q: question text too short".into()));
        }
        if raw.o.len() != OPTION_COUNT {
            return Err(SchemaError(format!("o: expected exactly {OPTION_COUNT} options, got {}", raw.o.len())));
        }
        let correct_index =
            answer_index(&raw.a).ok_or_else(|| SchemaError("a: must be an integer between 0 and 4".into()))?;
        if raw.exp.chars().count() < MIN_TEXT_LEN {
            return Err(SchemaError("exp: explanation too short".into()));
        }
        if raw.evidence.is_empty() {
            return Err(SchemaError("evidence: required".into()));
        }

        Ok(QuestionDraft {
            text: raw.q,
            options: raw.o,
            correct_index,
            explanation: raw.exp,
            evidence: raw.evidence,
            image_index: image_index(raw.img.as_ref()),
            diagnosis: bounded_note("diagnosis", raw.diagnosis)?,
            insight: bounded_note("insight", raw.insight)?,
        })
    }
}

//=========================================================================================
// Validation result
//=========================================================================================

fn decision_from_text(text: &str) -> Option<Decision> {
    let d = text.to_uppercase();
    if ["APPROV", "ONAY", "KABUL", "OK", "TRUE"].iter().any(|k| d.contains(k)) {
        Some(Decision::Approved)
    } else if ["RED", "REJECT", "HATA"].iter().any(|k| d.contains(k)) {
        Some(Decision::Rejected)
    } else {
        None
    }
}

/// Decodes a grading response. The decision is taken as given here; callers
/// reconcile it against the score.
impl ResponseSchema for ValidationResult {
    fn from_json(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(map) = value else {
            return Err(SchemaError("expected a JSON object".into()));
        };

        let score_value = ["total_score", "score", "puan", "point"]
            .iter()
            .find_map(|k| map.get(*k))
            .ok_or_else(|| SchemaError("total_score: required".into()))?;
        let total_score = as_number(score_value)
            .filter(|s| (0.0..=100.0).contains(s))
            .ok_or_else(|| SchemaError("total_score: must be a number between 0 and 100".into()))?;

        let decision = map
            .get("decision")
            .and_then(Value::as_str)
            .and_then(decision_from_text)
            .ok_or_else(|| SchemaError("decision: must be APPROVED or REJECTED".into()))?;

        let critical_faults = match map.get("critical_faults") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => serde_json::from_value::<Vec<String>>(v.clone())?,
        };
        let improvement_suggestion = match map.get("improvement_suggestion") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(SchemaError("improvement_suggestion: must be a string".into())),
        };

        Ok(ValidationResult { decision, total_score, critical_faults, improvement_suggestion })
    }
}
