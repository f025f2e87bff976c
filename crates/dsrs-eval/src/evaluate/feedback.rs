use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Evaluation score paired with textual feedback.
///
/// The feedback should explain *why* the score is what it is, e.g.
/// "priority: expected `Urgent`, got `High`", rather than restating the number.
///
/// ```
/// use dsrs_eval::FeedbackMetric;
///
/// let fb = FeedbackMetric::new(0.5, "priority: expected `Urgent`, got `High`");
/// assert_eq!(fb.score, 0.5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackMetric {
    /// Numerical score in [0, 1].
    pub score: f32,

    /// Textual feedback explaining the score.
    pub feedback: String,

    /// Structured details, e.g. which fields matched.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FeedbackMetric {
    pub fn new(score: f32, feedback: impl Into<String>) -> Self {
        Self {
            score,
            feedback: feedback.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl From<f32> for FeedbackMetric {
    fn from(score: f32) -> Self {
        Self::new(score, String::new())
    }
}
