//! crates/quiz_engine_core/src/lenient_json.rs
//!
//! Lenient decoding of JSON embedded in model output.
//!
//! Fallback ladder, applied in order:
//! 1. drop `<think>` reasoning blocks (closed, or unclosed to end of text)
//! 2. unwrap the first markdown code fence, if any
//! 3. slice from the first opening bracket to the last matching closer;
//!    keep the tail when the closer is missing (truncated output)
//! 4. double any backslash that does not start a JSON escape (LaTeX survives)
//! 5. parse; on failure retry with each common closing sequence appended
//!
//! Anything still unparseable yields `None`. Nothing here panics.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Object,
    Array,
}

impl JsonShape {
    fn brackets(&self) -> (char, char) {
        match self {
            JsonShape::Object => ('{', '}'),
            JsonShape::Array => ('[', ']'),
        }
    }
}

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());
static THINK_UNCLOSED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<think>.*").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap());
static BACKSLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\\["\\/nrt]|\\u[0-9a-fA-F]{4})|(\\)"#).unwrap());

const CLOSERS: [&str; 8] = ["}", "]", "\"}", "\"]", "}", "]", "]}", "}}"];

/// Strips reasoning and fences and isolates the bracketed payload.
/// Returns `None` when no opening bracket exists.
pub fn extract_payload(text: &str, shape: JsonShape) -> Option<String> {
    let without_think = THINK_BLOCK.replace_all(text.trim(), "");
    let without_think = THINK_UNCLOSED.replace_all(&without_think, "");
    let mut clean = without_think.trim().to_string();

    if let Some(inner) = CODE_FENCE.captures(&clean).and_then(|c| c.get(1)) {
        clean = inner.as_str().trim().to_string();
    }

    let (open, close) = shape.brackets();
    let start = clean.find(open)?;
    let slice = match clean.rfind(close) {
        Some(end) if end > start => &clean[start..=end],
        _ => &clean[start..],
    };
    Some(slice.to_string())
}

/// Doubles stray backslashes so LaTeX such as `\frac` survives JSON parsing.
pub fn escape_stray_backslashes(text: &str) -> String {
    BACKSLASH
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            Some(valid) => valid.as_str().to_string(),
            None => r"\\".to_string(),
        })
        .into_owned()
}

/// Runs the full fallback ladder.
pub fn parse_json_response(text: &str, shape: JsonShape) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }

    let Some(payload) = extract_payload(text, shape) else {
        debug!(preview = %preview(text), "No JSON structure found in model output");
        return None;
    };
    let payload = escape_stray_backslashes(&payload);

    match serde_json::from_str::<Value>(&payload) {
        Ok(value) => Some(value),
        Err(first_error) => {
            for closer in CLOSERS {
                let candidate = format!("{payload}{closer}");
                if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
                    debug!(closer, "Recovered truncated JSON");
                    return Some(value);
                }
            }
            warn!(error = %first_error, "Unrecoverable JSON in model output");
            None
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
