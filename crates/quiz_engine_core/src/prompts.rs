//! crates/quiz_engine_core/src/prompts.rs
//!
//! Prompt assembly for the generation pipeline.
//!
//! Every call is laid out as three messages: a fixed system prompt, a context
//! message holding the chunk text (identical across all calls for one chunk so
//! provider-side prefix caching applies), and a short task message.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{BloomLevel, Concept, GeneratedQuestion, Importance, SubjectGuidelines, UsageType, ValidationResult};
use crate::ports::ChatMessage;

pub const IMAGE_PLACEHOLDER: &str = "[IMAGE]";
const OPTION_LETTERS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

static MARKDOWN_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]+\)").unwrap());

//=========================================================================================
// Assembly helpers
//=========================================================================================

pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

/// Replaces markdown image references with a stable placeholder.
pub fn clean_reference_images(content: &str) -> String {
    MARKDOWN_IMAGE.replace_all(content, IMAGE_PLACEHOLDER).into_owned()
}

pub fn assemble(system_prompt: &str, context_prompt: &str, task_prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(normalize_text(system_prompt)),
        ChatMessage::user(normalize_text(context_prompt)),
        ChatMessage::user(format!("--- TASK ---\n{}", normalize_text(task_prompt))),
    ]
}

fn pretty(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// Builds the shared context message for one chunk.
pub fn build_context(
    content: &str,
    course_name: Option<&str>,
    section_title: Option<&str>,
    guidelines: Option<&SubjectGuidelines>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(course) = course_name.map(str::trim).filter(|c| !c.is_empty()) {
        parts.push(format!("## COURSE: {course}"));
    }
    if let Some(section) = section_title.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(format!("## SECTION: {section}"));
    }

    if let Some(g) = guidelines {
        parts.push("## COURSE GUIDELINES AND RULES:".to_string());
        if let Some(instruction) = g.instruction.as_deref().map(str::trim).filter(|i| !i.is_empty()) {
            parts.push(format!("### TECHNICAL RULES\n{instruction}"));
        }
        if let Some(example) = &g.few_shot_example {
            parts.push(format!("### GOOD EXAMPLE (follow this):\n{}", pretty(example)));
        }
        if let Some(example) = &g.bad_few_shot_example {
            parts.push(format!("### BAD EXAMPLE (avoid this):\n{}", pretty(example)));
        }
    }

    parts.push(GENERAL_QUALITY_RULES.to_string());
    parts.push(COMMON_OUTPUT_FORMAT.to_string());
    parts.push("## SOURCE TEXT:".to_string());
    parts.push(normalize_text(content));

    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

//=========================================================================================
// Static prompt blocks
//=========================================================================================

pub const GENERAL_QUALITY_RULES: &str = r#"## GENERAL QUALITY RULES:
1. **Academic register:** stem and options use formal exam language.
2. **Scope:** stay inside the source text; you may test its facts in a new context or example.
3. **Distractors:** at least two wrong options must be closely related concepts from the text that contradict the focus being asked. "All of the above" and "None of the above" are forbidden.
4. **Option count:** always exactly 5 options.
5. **Option balance:** options have similar length and structure.
6. **JSON and LaTeX:** every LaTeX backslash MUST be doubled inside JSON strings (\\alpha, \\frac{1}{2}). A single backslash breaks parsing.
7. **Image references:** if a question relies on an image, the stem must contain the tag "[IMAGE: X]"."#;

pub const COMMON_OUTPUT_FORMAT: &str = r#"## OUTPUT FORMAT:
Return only JSON matching this shape. No markdown, no commentary.
{
  "q": "Question text (may contain [IMAGE: X]; double every LaTeX backslash)",
  "o": ["Option 1", "Option 2", "Option 3", "Option 4", "Option 5"],
  "a": 0,
  "exp": "Explanation (double every LaTeX backslash)",
  "evidence": "Verbatim quote from the text that proves the answer",
  "img": null
}
Options carry no "A)" style prefixes. "a" is the 0-4 index of the correct option.
Set "img" to the referenced image number (0, 1, 2...) or null when no image is used."#;

pub const GLOBAL_SYSTEM_PROMPT: &str = "You are an expert exam author writing academically phrased multiple-choice questions. \
Respond with JSON only. No text, commentary or markdown outside the JSON object.";

pub const VALIDATION_SYSTEM_PROMPT: &str = r#"## ROLE
You are the accuracy and safety reviewer for generated exam questions. Focus on the absence of errors.

## SCORING
Start from 100 and deduct for every fault found:
| Fault | Deduction | Meaning |
| :--- | :--- | :--- |
| Factual or technical error | -100 | Wrong fact, wrong solution or contradicts the text (immediate REJECTED). |
| Weak distractors | -40 | Illogical, obviously wrong or unrelated options. |
| LaTeX errors | -30 | Missing $ or unescaped backslashes. |
| Explanation or evidence mismatch | -30 | exp or evidence contradicts the question or the text. |
| Register mismatch | -20 | Casual or simplistic language. |

## DECISION
- total_score >= 70: "APPROVED"
- total_score < 70: "REJECTED"

If APPROVED, leave critical_faults empty ([]) and improvement_suggestion empty ("").
If REJECTED, list the faults and a concrete fix.
Reject only clear errors, hallucinations and technical mistakes. A correct, solvable question is approved even if it could be better.

## OUTPUT FORMAT (mandatory, English keys):
{
  "total_score": 0,
  "decision": "APPROVED",
  "critical_faults": [],
  "improvement_suggestion": ""
}"#;

/// Appended when a structured response failed schema validation.
pub const SCHEMA_RETRY_MESSAGE: &str = r#"Your previous answer did not match the required JSON schema.
Return valid JSON only. Rules:
1. "o" has exactly 5 elements.
2. "a" is an integer between 0 and 4.
3. "img" is an image index or null.
4. "evidence" is a non-empty quote from the text.
5. No commentary outside the JSON."#;

pub fn bloom_instruction(level: BloomLevel) -> &'static str {
    match level {
        BloomLevel::Knowledge => {
            "Write an instructive question at the knowledge and comprehension level. Focus on definitions, principles or conceptual properties."
        }
        BloomLevel::Application => {
            "Do not ask for a bare definition. Build a concrete scenario (vignette) with names and events the learner could meet in real life."
        }
        BloomLevel::Analysis => {
            "Write a reasoning question that compares two concepts from the text or probes an exception to a rule. It should require a cause and effect chain such as 'if X happens, how is Y affected?'."
        }
    }
}

//=========================================================================================
// Task prompts
//=========================================================================================

pub fn analysis_system_prompt(section_title: &str, course_name: &str, importance: Importance, target_count: u32) -> String {
    format!(
        r#"You are an expert educational content analyst.
Task: scan the text titled **"{section_title}"** from the course {course_name} and build a complete question bank map.
COURSE IMPORTANCE: {importance}
Aim for roughly {target_count} concepts. Extract every concept scoring 7/10 or higher in importance and every exception. Dense text yields more concepts, shallow text fewer. Never invent content.

Rules:
1. EXCEPTION HUNTER: look for sentences introducing carve-outs ("however", "except", "provided that", "notwithstanding"). List each exception as its own concept and mark it "isException": true.
2. Balance concepts across the beginning, middle and end of the text.
3. Concepts must not overlap semantically; each represents an independent part of the text.
4. Set "seviye" using these definitions:
   - "knowledge": definitions, concepts and basic facts.
   - "application": processes, methods and how-to knowledge.
   - "analysis": cause and effect, comparisons and inferences.
5. "odak" is a learning objective of at most 15 words.
6. Every concept carries the key "gorsel"; use null when no image applies. Never omit the key.
7. When an image exists, describe it technically in "altText".
8. Always use "baslik" as the concept title key.
9. List prerequisite concept titles in "prerequisites" when a concept depends on others from this text.

Difficulty index guide:
- 1: introductory, narrative text
- 3: standard regulation or topic exposition
- 5: heavy doctrine, dense technical procedure or terminology

Suggest pool sizes in "quotas" for training (antrenman), archive (arsiv) and exam simulation (deneme).

Return pure JSON only:
{{
  "difficulty_index": 3,
  "concepts": [{{"baslik": "...", "odak": "...", "seviye": "knowledge", "gorsel": null, "altText": null, "isException": false, "prerequisites": []}}],
  "quotas": {{"antrenman": 5, "arsiv": 2, "deneme": 2}}
}}"#,
        importance = importance.as_str().to_uppercase(),
    )
}

pub fn analysis_task_prompt(importance: Importance) -> String {
    format!(
        "Course importance: {}\nBuild the concept map, the cognitive difficulty index and the ideal pool quotas. Respond in JSON.",
        importance.as_str()
    )
}

pub fn drafting_task_prompt(
    concept: &Concept,
    bloom: BloomLevel,
    usage: UsageType,
    previous_diagnoses: &[String],
) -> String {
    let mut parts = vec![
        "GOAL: write ONE question for the concept below, following the pedagogical strategy.".to_string(),
    ];

    if usage == UsageType::Deneme {
        parts.push(
            "!!! EXAM SIMULATION MODE !!! Difficulty is raised.\n\
             - Options must be very close to each other; no obviously wrong option.\n\
             - Include one strong distractor right next to the correct answer.\n\
             - Evoke terms from the wider course that are easily confused with this concept."
                .to_string(),
        );
    }

    parts.push(
        "DISTRACTOR RULES:\nEach wrong option must come from at least one of:\n\
         1. Concept confusion: a similar term used in a different context.\n\
         2. Reasoning slip: the result of a common mistake in the correct line of reasoning.\n\
         3. Half truth: starts right and ends wrong, or the reverse.\n\
         Never produce random or absurd options."
            .to_string(),
    );

    let mut target = format!(
        "TARGET CONCEPT:\n- Concept: {}\n- Focus: {}\n- Bloom level: {}",
        concept.title,
        concept.focus,
        bloom.as_str()
    );
    if concept.is_exception {
        target.push_str("\n- This concept is an exception to a general rule; test the carve-out itself.");
    }
    if let Some(image) = concept.image.as_deref().filter(|i| !i.is_empty()) {
        target.push_str(&format!(
            "\nIMAGE REFERENCE: build the question around image '{image}' or the situation it illustrates."
        ));
        if let Some(alt) = concept.alt_text.as_deref().filter(|a| !a.is_empty()) {
            target.push_str(&format!("\nImage description: {alt}"));
        }
    }
    parts.push(target);

    parts.push(format!(
        "PEDAGOGICAL STRATEGY:\n{}\n\nEVIDENCE REQUIREMENT:\nFor scenario or analysis questions, put the governing rule or definition from the text in \"evidence\" with a short note linking it to the scenario. If the text offers no supporting evidence, do not write the question.",
        bloom_instruction(bloom)
    ));

    if !previous_diagnoses.is_empty() {
        parts.push(format!(
            "LEARNER'S PAST MISTAKES ON THIS TOPIC (probe these weak spots):\n{}",
            bullet_list(previous_diagnoses)
        ));
    }

    parts.push("Use the SOURCE TEXT as reference and return JSON only.".to_string());
    parts.join("\n\n")
}

fn bullet_list(items: &[String]) -> String {
    items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
}

fn lettered_options(options: &[String]) -> String {
    options
        .iter()
        .zip(OPTION_LETTERS)
        .map(|(option, letter)| format!("{letter}) {option}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn letter(index: usize) -> char {
    OPTION_LETTERS.get(index).copied().unwrap_or('?')
}

pub fn validation_task_prompt(question: &GeneratedQuestion) -> String {
    format!(
        "## QUESTION TO REVIEW:\n\n**Question:** {}\n\n**Options:**\n{}\n\n**Correct answer:** {}\n\n**Explanation:** {}\n\n**Evidence:** {}\n\nReview this question against the source text and return only the requested JSON.",
        question.text,
        lettered_options(&question.options),
        letter(question.correct_index),
        question.explanation,
        question.evidence,
    )
}

fn question_json(question: &GeneratedQuestion) -> String {
    let value = serde_json::json!({
        "q": question.text,
        "o": question.options,
        "a": question.correct_index,
        "exp": question.explanation,
        "img": question.image_index,
    });
    serde_json::to_string_pretty(&value).unwrap_or_default()
}

pub fn revision_task_prompt(question: &GeneratedQuestion, validation: &ValidationResult) -> String {
    format!(
        "The question below was REJECTED. Revise it using the feedback.\n\n## REJECTED QUESTION:\n{}\n\n## CRITICAL FAULTS:\n{}\n\n## IMPROVEMENT SUGGESTION:\n{}\n\nFix the faults and keep the academic register. Return JSON only with exactly 5 options, an integer answer index from 0 to 4 and non-empty evidence.",
        question_json(question),
        bullet_list(&validation.critical_faults),
        validation.improvement_suggestion,
    )
}

/// Inputs for a remediation question after a wrong answer.
#[derive(Debug, Clone)]
pub struct FollowUpPrompt<'a> {
    pub evidence: &'a str,
    pub original: &'a GeneratedQuestion,
    pub incorrect_index: Option<usize>,
    pub target_bloom: BloomLevel,
    pub scaffolding_note: Option<String>,
    pub previous_diagnoses: &'a [String],
}

pub fn scaffolding_note(consecutive_fails: u32, target: BloomLevel) -> String {
    format!(
        "SCAFFOLDING ACTIVE: the learner keeps struggling here (miss #{consecutive_fails}). Lower the question one cognitive tier to {}.",
        target.as_str()
    )
}

pub fn follow_up_task_prompt(input: &FollowUpPrompt<'_>) -> String {
    let original = input.original;
    let chosen = match input.incorrect_index {
        Some(i) => format!(
            "{} (\"{}\")",
            letter(i),
            original.options.get(i).map(String::as_str).unwrap_or_default()
        ),
        None => "left blank".to_string(),
    };
    let correct = format!(
        "{} (\"{}\")",
        letter(original.correct_index),
        original.options.get(original.correct_index).map(String::as_str).unwrap_or_default()
    );

    let mut difficulty = format!("DIFFICULTY: target level {}", input.target_bloom.as_str());
    if let Some(note) = &input.scaffolding_note {
        difficulty.push('\n');
        difficulty.push_str(note);
    }

    let mut parts = vec![
        "## SPECIAL INSTRUCTIONS\nUse the wider source text only to sharpen distractors. The correct answer MUST rest solely on the evidence sentence.".to_string(),
        format!(
            "## FOLLOW-UP QUESTION\nThe learner answered the previous question WRONG. Write a new question.\n**SINGLE SOURCE (for the correct answer):** \"{}\"\n1. The correct answer is fully faithful to the single source sentence.\n2. Build distractors from other concepts in the source text.\n3. The learner must not be able to answer from anywhere else in the text.",
            input.evidence
        ),
        difficulty,
        format!("## MISSED QUESTION:\n{}", question_json(original)),
        format!("Learner's answer: {chosen}"),
        format!("Correct answer: {correct}"),
    ];

    if !input.previous_diagnoses.is_empty() {
        parts.push(format!("## LEARNER'S PAST MISTAKES:\n{}", bullet_list(input.previous_diagnoses)));
    }

    parts.push(
        "EXTRA RULES:\n\
         1. Distractors create concept confusion from the text but are wrong for this question.\n\
         2. Numbers are written in LaTeX ($P=10$).\n\
         3. Copy the single source sentence verbatim into \"evidence\".\n\
         4. \"diagnosis\": a short professional diagnosis of why the learner erred.\n\
         5. \"insight\": a one or two sentence mentor note that shows the right line of thought without giving the answer away.\n\n\
         Return JSON only:\n\
         {\"q\": \"...\", \"o\": [\"...\", \"...\", \"...\", \"...\", \"...\"], \"a\": 0, \"exp\": \"...\", \"evidence\": \"...\", \"img\": null, \"diagnosis\": \"...\", \"insight\": \"...\"}"
            .to_string(),
    );

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ChatRole;

    #[test]
    fn assemble_produces_three_normalized_messages() {
        let messages = assemble("  system\r\n", "context\r\nline", "do it  ");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content, "system");
        assert_eq!(messages[1].content, "context\nline");
        assert_eq!(messages[2].content, "--- TASK ---\ndo it");
    }

    #[test]
    fn images_become_placeholders() {
        let text = "See ![chart](https://x/y.png) and ![](img.jpg) here.";
        assert_eq!(clean_reference_images(text), "See [IMAGE] and [IMAGE] here.");
    }

    #[test]
    fn context_includes_guidelines_in_order() {
        let guidelines = SubjectGuidelines {
            instruction: Some("Use ratios.".into()),
            few_shot_example: Some(serde_json::json!({"q": "good"})),
            bad_few_shot_example: None,
        };
        let ctx = build_context("Body text", Some("Finance"), Some("Leverage"), Some(&guidelines));

        let course = ctx.find("## COURSE: Finance").unwrap();
        let rules = ctx.find("### TECHNICAL RULES").unwrap();
        let good = ctx.find("### GOOD EXAMPLE").unwrap();
        let body = ctx.find("Body text").unwrap();
        assert!(course < rules && rules < good && good < body);
        assert!(!ctx.contains("BAD EXAMPLE"));
    }

    #[test]
    fn context_skips_blank_headers() {
        let ctx = build_context("Body", Some("  "), None, None);
        assert!(!ctx.contains("## COURSE"));
        assert!(ctx.ends_with("Body"));
    }

    #[test]
    fn drafting_prompt_mentions_simulation_and_diagnoses() {
        let concept = Concept::new("Inflation", "define inflation");
        let prompt = drafting_task_prompt(
            &concept,
            BloomLevel::Application,
            UsageType::Deneme,
            &["confuses CPI with GDP deflator".to_string()],
        );
        assert!(prompt.contains("EXAM SIMULATION MODE"));
        assert!(prompt.contains("- confuses CPI with GDP deflator"));
        assert!(prompt.contains("Bloom level: application"));
    }
}
