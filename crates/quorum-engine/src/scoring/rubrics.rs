//! Task-specific scoring rubrics.
//!
//! Every rubric is a pure function returning named dimension scores in
//! [0, 100]. Dimensions that need caller context (required fields,
//! personalization tokens, keywords) are omitted when the context does
//! not supply any, so they never dilute the aggregate with guesses.

use super::ScoreContext;
use std::collections::{BTreeMap, BTreeSet};

/// Field count assumed when the caller does not say how many structured
/// fields a complete output carries.
const DEFAULT_EXPECTED_FIELD_COUNT: usize = 5;

/// Markers of boilerplate the model failed to fill in.
const PLACEHOLDER_MARKERS: [&str; 8] = [
    "lorem ipsum",
    "todo",
    "tbd",
    "placeholder",
    "xxx",
    "<insert",
    "[insert",
    "fill in",
];

/// Rubric for structured-output tasks (website analysis, sentiment,
/// lead scoring).
pub fn structured_rubric(output: &str, context: &ScoreContext) -> BTreeMap<String, f64> {
    let mut dimensions = BTreeMap::new();

    let (structure, fields) = extract_fields(output);
    dimensions.insert("structure".to_string(), structure);

    if !context.expected_fields.is_empty() {
        let present = context
            .expected_fields
            .iter()
            .filter(|f| fields.contains(f.to_lowercase().as_str()))
            .count();
        dimensions.insert(
            "required_fields".to_string(),
            present as f64 / context.expected_fields.len() as f64 * 100.0,
        );
    }

    let expected_count = if context.expected_fields.is_empty() {
        DEFAULT_EXPECTED_FIELD_COUNT
    } else {
        context.expected_fields.len()
    };
    let completeness = (fields.len() as f64 / expected_count as f64).min(1.0) * 100.0;
    dimensions.insert("completeness".to_string(), completeness);

    dimensions.insert(
        "no_placeholders".to_string(),
        placeholder_penalty(output),
    );

    dimensions
}

/// Rubric for natural-language email drafting.
pub fn email_rubric(output: &str, context: &ScoreContext) -> BTreeMap<String, f64> {
    let mut dimensions = BTreeMap::new();
    let lower = output.to_lowercase();

    // Whole words only, so "this" does not read as "hi".
    let opening: String = lower.chars().take(60).collect();
    let opening_words: Vec<&str> = opening
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .collect();
    let greeting = ["hi", "hello", "dear", "hey", "greetings"]
        .iter()
        .any(|g| opening_words.contains(g))
        || opening.contains("good morning")
        || opening.contains("good afternoon");
    dimensions.insert("greeting".to_string(), if greeting { 100.0 } else { 0.0 });

    let cta = [
        "let me know",
        "schedule",
        "reply",
        "book a",
        "get back to",
        "call me",
        "would you",
        "?",
    ]
    .iter()
    .any(|c| lower.contains(c));
    dimensions.insert("call_to_action".to_string(), if cta { 100.0 } else { 0.0 });

    if !context.personalization.is_empty() {
        let present = context
            .personalization
            .iter()
            .filter(|token| lower.contains(token.to_lowercase().as_str()))
            .count();
        dimensions.insert(
            "personalization".to_string(),
            present as f64 / context.personalization.len() as f64 * 100.0,
        );
    }

    let (min, max) = context.expected_length.unwrap_or((200, 1500));
    dimensions.insert(
        "length".to_string(),
        length_band_score(output.len(), min, max),
    );

    dimensions
}

/// Rubric for generated code.
pub fn code_rubric(output: &str, _context: &ScoreContext) -> BTreeMap<String, f64> {
    let mut dimensions = BTreeMap::new();

    dimensions.insert(
        "balanced_delimiters".to_string(),
        delimiter_balance_score(output),
    );
    dimensions.insert("no_truncation".to_string(), truncation_score(output));

    let lower = output.to_lowercase();
    let documented = ["///", "//!", "/*", "\"\"\"", "# ", "// "]
        .iter()
        .any(|marker| output.contains(marker));
    dimensions.insert(
        "documentation".to_string(),
        if documented { 100.0 } else { 0.0 },
    );

    let anti_patterns = ["todo", "fixme", "unimplemented", "not implemented", "your code here"]
        .iter()
        .filter(|p| lower.contains(*p))
        .count();
    dimensions.insert(
        "no_anti_patterns".to_string(),
        (100.0 - 25.0 * anti_patterns as f64).clamp(0.0, 100.0),
    );

    dimensions
}

/// Length and keyword-density fallback for tasks without a specialized
/// rubric.
pub fn generic_rubric(output: &str, context: &ScoreContext) -> BTreeMap<String, f64> {
    let mut dimensions = BTreeMap::new();

    let (min, max) = context.expected_length.unwrap_or((50, 4000));
    dimensions.insert(
        "length".to_string(),
        length_band_score(output.len(), min, max),
    );

    if !context.keywords.is_empty() {
        let lower = output.to_lowercase();
        let present = context
            .keywords
            .iter()
            .filter(|k| lower.contains(k.to_lowercase().as_str()))
            .count();
        dimensions.insert(
            "keyword_density".to_string(),
            present as f64 / context.keywords.len() as f64 * 100.0,
        );
    }

    dimensions.insert("substance".to_string(), substance_score(output));

    dimensions
}

/// Detects structured fields in an output.
///
/// JSON objects score full structure; "key: value" lines score partial
/// structure. Returns the structure score and the lowercased field
/// names found.
fn extract_fields(output: &str) -> (f64, BTreeSet<String>) {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(output) {
        let fields = map.keys().map(|k| k.to_lowercase()).collect();
        return (100.0, fields);
    }

    let fields: BTreeSet<String> = output
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let key = key.trim();
            (!key.is_empty() && !rest.trim().is_empty() && key.len() < 40)
                .then(|| key.to_lowercase())
        })
        .collect();

    if fields.is_empty() {
        (0.0, fields)
    } else {
        (40.0, fields)
    }
}

fn placeholder_penalty(output: &str) -> f64 {
    let lower = output.to_lowercase();
    let found = PLACEHOLDER_MARKERS
        .iter()
        .filter(|m| lower.contains(*m))
        .count();
    (100.0 - 25.0 * found as f64).clamp(0.0, 100.0)
}

/// Scores a length against an expected band: 100 inside the band,
/// scaled down proportionally to the deviation outside it.
fn length_band_score(len: usize, min: usize, max: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    if len < min {
        return len as f64 / min as f64 * 100.0;
    }
    if len > max {
        return max as f64 / len as f64 * 100.0;
    }
    100.0
}

/// Checks paren/brace/bracket balance. Each unmatched or prematurely
/// closed delimiter costs 30 points.
fn delimiter_balance_score(output: &str) -> f64 {
    let mut imbalance = 0i64;
    for (open, close) in [('(', ')'), ('{', '}'), ('[', ']')] {
        let mut depth = 0i64;
        for ch in output.chars() {
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth < 0 {
                    imbalance += 1;
                    depth = 0;
                }
            }
        }
        imbalance += depth.abs();
    }
    (100.0 - 30.0 * imbalance as f64).clamp(0.0, 100.0)
}

/// Penalizes outputs that look cut off mid-stream.
fn truncation_score(output: &str) -> f64 {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        return 0.0;
    }

    let mut score: f64 = 100.0;
    if trimmed.ends_with("...") {
        score -= 30.0;
    }
    // An odd number of code fences means one was never closed.
    if trimmed.matches("```").count() % 2 == 1 {
        score -= 50.0;
    }
    if trimmed
        .chars()
        .last()
        .is_some_and(|c| matches!(c, ',' | '+' | '-' | '*' | '/' | '=' | '(' | '&' | '|'))
    {
        score -= 50.0;
    }
    score.clamp(0.0, 100.0)
}

/// Rewards outputs with actual lexical variety over degenerate
/// repetition.
fn substance_score(output: &str) -> f64 {
    let words: Vec<&str> = output.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let unique: BTreeSet<&str> = words.iter().copied().collect();
    (unique.len() as f64 / words.len() as f64 * 200.0).min(100.0)
}
