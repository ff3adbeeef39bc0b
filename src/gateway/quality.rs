//! Heuristics for provider responses that succeed but carry bad data.
//!
//! Two failure modes are recognized: collapse, where distinct inputs all come
//! back as one identical output, and wrong-script output for languages with a
//! known writing system.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Devanagari,
    Bengali,
    Oriya,
    Tamil,
    Malayalam,
    Telugu,
    Kannada,
    Latin,
}

/// Detection order matters: the first script with any matching character wins.
static SCRIPT_TABLE: LazyLock<Vec<(Script, Regex)>> = LazyLock::new(|| {
    [
        (Script::Devanagari, r"[\x{0900}-\x{097F}]"),
        (Script::Bengali, r"[\x{0980}-\x{09FF}]"),
        (Script::Oriya, r"[\x{0B00}-\x{0B7F}]"),
        (Script::Tamil, r"[\x{0B80}-\x{0BFF}]"),
        (Script::Malayalam, r"[\x{0D00}-\x{0D7F}]"),
        (Script::Telugu, r"[\x{0C00}-\x{0C7F}]"),
        (Script::Kannada, r"[\x{0C80}-\x{0CFF}]"),
        (Script::Latin, r"[A-Za-z\x{00C0}-\x{024F}]"),
    ]
    .into_iter()
    .map(|(script, pattern)| (script, Regex::new(pattern).unwrap()))
    .collect()
});

/// Writing system expected for a target language, if the language has one on record.
pub fn script_for(target_language: &str) -> Option<Script> {
    let primary = target_language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match primary.as_str() {
        "hi" => Some(Script::Devanagari),
        "bn" | "as" => Some(Script::Bengali),
        "ta" => Some(Script::Tamil),
        "ml" => Some(Script::Malayalam),
        "te" => Some(Script::Telugu),
        "kn" => Some(Script::Kannada),
        "or" | "od" => Some(Script::Oriya),
        _ => None,
    }
}

pub fn detect_script(text: &str) -> Option<Script> {
    SCRIPT_TABLE
        .iter()
        .find(|(_, matcher)| matcher.is_match(text))
        .map(|(script, _)| *script)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub collapsed: bool,
    pub many_script_problems: bool,
    /// Indices whose detected script differs from the expected one.
    pub mismatched: Vec<usize>,
}

impl QualityReport {
    pub fn suspicious(&self) -> bool {
        self.collapsed || self.many_script_problems
    }

    /// Whether index `i` needs an individual retry under this report.
    pub fn needs_retry(&self, i: usize) -> bool {
        self.collapsed || self.mismatched.binary_search(&i).is_ok()
    }
}

/// Classify a composed batch result. Pure; `inputs` and `outputs` are index-aligned.
pub fn assess(inputs: &[String], outputs: &[String], target_language: &str) -> QualityReport {
    let unique_inputs: HashSet<&str> = inputs.iter().map(|s| s.trim()).collect();
    let unique_outputs: HashSet<&str> = outputs.iter().map(|s| s.trim()).collect();
    let collapsed = unique_outputs.len() == 1 && unique_inputs.len() > 1;

    let mismatched: Vec<usize> = match script_for(target_language) {
        Some(expected) => outputs
            .iter()
            .enumerate()
            .filter(|(_, output)| detect_script(output).is_some_and(|found| found != expected))
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    };

    let threshold = f64::max(1.0, 0.25 * outputs.len() as f64);
    let many_script_problems = mismatched.len() as f64 > threshold;

    QualityReport {
        collapsed,
        many_script_problems,
        mismatched,
    }
}
