//! Quality scoring for model outputs.
//!
//! Dispatches on task type through a rubric table resolved once at
//! scorer build time. Scoring is a pure function of its inputs, so
//! identical (task, output, context) triples always produce identical
//! scores and dimension maps.

pub mod rubrics;

use crate::types::TaskType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Signature of a task rubric: output + context in, named dimension
/// scores (each 0-100) out.
pub type RubricFn = fn(&str, &ScoreContext) -> BTreeMap<String, f64>;

/// Caller-supplied context a rubric can score against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreContext {
    /// Structured fields the output is expected to contain.
    pub expected_fields: Vec<String>,
    /// Personalization tokens (names, company, etc.) that should appear.
    pub personalization: Vec<String>,
    /// Expected output length band in characters (min, max).
    pub expected_length: Option<(usize, usize)>,
    /// Keywords the generic rubric checks for.
    pub keywords: Vec<String>,
}

/// Computes 0-100 quality scores for produced outputs.
pub struct QualityScorer {
    /// Task-to-rubric table, resolved at build time.
    rubrics: HashMap<TaskType, RubricFn>,
}

impl QualityScorer {
    /// Creates a scorer with the default rubric table.
    #[must_use]
    pub fn new() -> Self {
        let mut rubrics: HashMap<TaskType, RubricFn> = HashMap::new();
        rubrics.insert(TaskType::WebsiteAnalysis, rubrics::structured_rubric);
        rubrics.insert(TaskType::SentimentAnalysis, rubrics::structured_rubric);
        rubrics.insert(TaskType::LeadScoring, rubrics::structured_rubric);
        rubrics.insert(TaskType::EmailWriting, rubrics::email_rubric);
        rubrics.insert(TaskType::CodeGeneration, rubrics::code_rubric);
        rubrics.insert(TaskType::Conversation, rubrics::generic_rubric);
        rubrics.insert(TaskType::Generic, rubrics::generic_rubric);
        Self { rubrics }
    }

    /// Scores an output for a task, 0-100.
    ///
    /// The aggregate is the mean of the rubric's dimension scores.
    #[must_use]
    pub fn score(&self, task: TaskType, output: &str, context: &ScoreContext) -> f64 {
        let dimensions = self.score_with_dimensions(task, output, context);
        if dimensions.is_empty() {
            return 0.0;
        }
        let sum: f64 = dimensions.values().sum();
        (sum / dimensions.len() as f64).clamp(0.0, 100.0)
    }

    /// Exposes the sub-scores feeding the aggregate, keyed by dimension
    /// name, for transparency and testability.
    #[must_use]
    pub fn score_with_dimensions(
        &self,
        task: TaskType,
        output: &str,
        context: &ScoreContext,
    ) -> BTreeMap<String, f64> {
        let rubric = self
            .rubrics
            .get(&task)
            .copied()
            .unwrap_or(rubrics::generic_rubric as RubricFn);
        rubric(output, context)
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}
