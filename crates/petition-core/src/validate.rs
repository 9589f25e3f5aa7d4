//! Structural checks on generated petition text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::rules::SectionMarker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Canonical names of markers with no matching heading.
    pub missing_sections: Vec<String>,
    pub issues: Vec<String>,
    pub char_count: usize,
}

static PLACEHOLDERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\{\{[^}]*\}\}", "template braces"),
        (r"\[[A-Z][A-Z _/]{2,}\]", "bracketed placeholder"),
        (r"(?i)<\s*insert[^>]*>", "insert marker"),
        (r"_{4,}", "blank line for manual fill-in"),
        (r"\bX{3,}\b", "XXX filler"),
    ]
    .into_iter()
    .filter_map(|(pat, what)| Regex::new(pat).ok().map(|re| (re, what)))
    .collect()
});

/// Validates a draft against a jurisdiction's markers. Pure: never touches workflow state.
#[derive(Debug, Clone)]
pub struct OutputValidator {
    markers: Vec<SectionMarker>,
    min_chars: usize,
}

impl OutputValidator {
    pub fn new(markers: Vec<SectionMarker>, min_chars: usize) -> Self {
        Self { markers, min_chars }
    }

    pub fn validate(&self, text: &str) -> ValidationReport {
        let headings: Vec<String> = text.lines().filter_map(heading_of).collect();

        let missing_sections: Vec<String> = self
            .markers
            .iter()
            .filter(|m| !m.spellings().any(|s| headings.iter().any(|h| h.contains(s))))
            .map(|m| m.name.to_string())
            .collect();

        let mut issues = Vec::new();
        let char_count = text.trim().chars().count();
        if char_count < self.min_chars {
            issues.push(format!(
                "document too short: {char_count} characters, minimum is {}",
                self.min_chars
            ));
        }
        for (re, what) in PLACEHOLDERS.iter() {
            if let Some(m) = re.find(text) {
                issues.push(format!("unfilled placeholder ({what}): {}", m.as_str()));
            }
        }

        ValidationReport {
            valid: missing_sections.is_empty() && issues.is_empty(),
            missing_sections,
            issues,
            char_count,
        }
    }
}

/// Uppercased heading text if `line` looks like a section heading.
fn heading_of(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 80 {
        return None;
    }
    let stripped = trimmed
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_ascii_digit() || c == '.' || c == ')' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '*' || c == ':' || c.is_whitespace());
    if stripped.is_empty() {
        return None;
    }
    // Sentences mentioning "relief" in passing are not headings: a heading is
    // either marked up or written in capitals.
    let marked = trimmed.starts_with('#') || trimmed.starts_with("**");
    let capitals = stripped
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(|c| c.is_uppercase());
    (marked || capitals).then(|| stripped.to_uppercase())
}
