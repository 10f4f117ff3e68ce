//! crates/quiz_engine_core/src/tasks/strategy.rs
//!
//! Picks the bloom level a drafted question should target.

use crate::domain::BloomLevel::{Analysis as An, Application as Ap, Knowledge as Kn};
use crate::domain::{BloomLevel, Concept};
use crate::prompts::bloom_instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseCategory {
    /// Problem-solving courses: mostly application.
    SkillBased,
    /// Law and accounting: case-driven.
    ScenarioBased,
    /// Economics and management theory.
    TheoryBased,
}

pub const DEFAULT_CATEGORY: CourseCategory = CourseCategory::TheoryBased;

// Course names as they appear in the catalogue, with English aliases.
const SKILL_COURSES: &[&str] = &[
    "İngilizce",
    "Sözel Mantık",
    "Matematik",
    "Sayısal Mantık",
    "İstatistik",
    "english",
    "verbal logic",
    "mathematics",
    "numerical logic",
    "statistics",
];

const SCENARIO_COURSES: &[&str] = &[
    "Medeni Hukuk",
    "Borçlar Hukuku",
    "Ticaret Hukuku",
    "Bankacılık Hukuku",
    "İcra ve İflas Hukuku",
    "Türk Ceza Kanunu",
    "İş Hukuku",
    "Medeni Usul Hukuku",
    "Genel Muhasebe",
    "Banka Muhasebesi",
    "Finans Matematiği",
    "Finansal Yönetim",
    "civil law",
    "law of obligations",
    "commercial law",
    "banking law",
    "enforcement and bankruptcy law",
    "criminal law",
    "labour law",
    "civil procedure",
    "general accounting",
    "bank accounting",
    "financial mathematics",
    "financial management",
];

pub fn course_category(course_name: &str) -> CourseCategory {
    let name = course_name.trim().to_lowercase();
    let listed = |courses: &[&str]| courses.iter().any(|c| c.to_lowercase() == name);
    if listed(SKILL_COURSES) {
        CourseCategory::SkillBased
    } else if listed(SCENARIO_COURSES) {
        CourseCategory::ScenarioBased
    } else {
        DEFAULT_CATEGORY
    }
}

/// Ten-slot bloom cycle per course category.
fn distribution(category: CourseCategory) -> [BloomLevel; 10] {
    match category {
        CourseCategory::SkillBased => [Kn, Ap, Ap, Ap, Ap, Ap, Ap, An, An, An],
        CourseCategory::ScenarioBased | CourseCategory::TheoryBased => [Kn, Kn, Ap, Ap, Ap, Ap, Ap, Ap, An, An],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStrategy {
    pub bloom_level: BloomLevel,
    pub instruction: &'static str,
}

/// A declared concept level wins; otherwise the position in the concept map
/// selects a slot from the course category's cycle.
pub fn determine_node_strategy(index: usize, concept: Option<&Concept>, course_name: &str) -> NodeStrategy {
    let bloom_level = concept
        .and_then(|c| c.level)
        .unwrap_or_else(|| distribution(course_category(course_name))[index % 10]);

    NodeStrategy { bloom_level, instruction: bloom_instruction(bloom_level) }
}
