use indexmap::IndexMap;

use crate::{Example, FeedbackMetric, Prediction};

/// Canonical form used for comparisons: trimmed and lowercased.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Scores a prediction against an example's labels.
///
/// Metrics are pure: same inputs, same score, no side effects. They read
/// expected values through [`Example::label`] only and return a value in
/// [0, 1]. A field absent from the prediction is a non-match, never an error.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, example: &Example, prediction: &Prediction) -> f32;

    /// Score plus an explanation. The default carries no text.
    fn feedback(&self, example: &Example, prediction: &Prediction) -> FeedbackMetric {
        FeedbackMetric::new(self.score(example, prediction), String::new())
    }
}

/// Whether `field` in the prediction equals the expected label after normalization.
pub fn field_matches(example: &Example, prediction: &Prediction, field: &str) -> bool {
    match (example.label(field), prediction.get(field)) {
        (Some(expected), Some(produced)) => normalize(expected) == normalize(produced),
        _ => false,
    }
}

fn mismatch_feedback(fields: &[String], example: &Example, prediction: &Prediction) -> String {
    let lines: Vec<String> = fields
        .iter()
        .filter(|field| !field_matches(example, prediction, field))
        .map(|field| {
            let expected = example.label(field).unwrap_or("<none>");
            match prediction.get(field) {
                Some(produced) => format!("{field}: expected `{expected}`, got `{produced}`"),
                None => format!("{field}: expected `{expected}`, but the field was missing"),
            }
        })
        .collect();

    if lines.is_empty() {
        "all fields match".to_string()
    } else {
        lines.join("\n")
    }
}

fn field_list<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fields.into_iter().map(Into::into).collect()
}

/// 1.0 when every listed field matches, otherwise 0.0.
///
/// With a single field this is the category-only / priority-only metric.
#[derive(Debug, Clone)]
pub struct ExactMatch {
    name: String,
    fields: Vec<String>,
}

impl ExactMatch {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "exact_match".to_string(),
            fields: field_list(fields),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Metric for ExactMatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, example: &Example, prediction: &Prediction) -> f32 {
        let all = !self.fields.is_empty()
            && self
                .fields
                .iter()
                .all(|field| field_matches(example, prediction, field));
        if all { 1.0 } else { 0.0 }
    }

    fn feedback(&self, example: &Example, prediction: &Prediction) -> FeedbackMetric {
        FeedbackMetric::new(
            self.score(example, prediction),
            mismatch_feedback(&self.fields, example, prediction),
        )
    }
}

/// 1.0 when every listed field matches, 0.5 when some do, 0.0 when none do.
#[derive(Debug, Clone)]
pub struct PartialMatch {
    name: String,
    fields: Vec<String>,
}

impl PartialMatch {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "partial_match".to_string(),
            fields: field_list(fields),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Metric for PartialMatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, example: &Example, prediction: &Prediction) -> f32 {
        let matched = self
            .fields
            .iter()
            .filter(|field| field_matches(example, prediction, field))
            .count();
        match matched {
            0 => 0.0,
            n if n == self.fields.len() => 1.0,
            _ => 0.5,
        }
    }

    fn feedback(&self, example: &Example, prediction: &Prediction) -> FeedbackMetric {
        let matched: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| field_matches(example, prediction, field))
            .map(String::as_str)
            .collect();
        FeedbackMetric::new(
            self.score(example, prediction),
            mismatch_feedback(&self.fields, example, prediction),
        )
        .add_metadata("matched", serde_json::json!(matched))
    }
}

/// Per-field credit for near misses.
///
/// 1.0 when every weighted field matches, otherwise the largest credit among
/// the fields that do match, 0.0 when none match. With
/// `[("category", 0.7), ("priority", 0.5)]` a right category alone scores 0.7.
#[derive(Debug, Clone)]
pub struct WeightedMatch {
    name: String,
    credits: IndexMap<String, f32>,
}

impl WeightedMatch {
    pub fn new<I, S>(credits: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        Self {
            name: "weighted_match".to_string(),
            credits: credits
                .into_iter()
                .map(|(field, credit)| (field.into(), credit.clamp(0.0, 1.0)))
                .collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Metric for WeightedMatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, example: &Example, prediction: &Prediction) -> f32 {
        let matched: Vec<f32> = self
            .credits
            .iter()
            .filter(|(field, _)| field_matches(example, prediction, field))
            .map(|(_, credit)| *credit)
            .collect();

        if !self.credits.is_empty() && matched.len() == self.credits.len() {
            1.0
        } else {
            matched.into_iter().fold(0.0, f32::max)
        }
    }

    fn feedback(&self, example: &Example, prediction: &Prediction) -> FeedbackMetric {
        let fields: Vec<String> = self.credits.keys().cloned().collect();
        FeedbackMetric::new(
            self.score(example, prediction),
            mismatch_feedback(&fields, example, prediction),
        )
    }
}

type ScoreFn = dyn Fn(&Example, &Prediction) -> f32 + Send + Sync;

/// Named closure metric.
pub struct FnMetric {
    name: String,
    score: Box<ScoreFn>,
}

impl FnMetric {
    pub fn new(
        name: impl Into<String>,
        score: impl Fn(&Example, &Prediction) -> f32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            score: Box::new(score),
        }
    }
}

impl Metric for FnMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, example: &Example, prediction: &Prediction) -> f32 {
        (self.score)(example, prediction)
    }
}
