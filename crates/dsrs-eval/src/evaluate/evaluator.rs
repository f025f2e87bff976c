use std::error::Error as StdError;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Example, Metric, Module, PredictError, Prediction};

/// What the harness does when a module call fails on one example.
///
/// A malformed answer is not a failure here: the fields that parsed are scored
/// by the metric and missing ones count as non-matches, under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record 0.0 for the example, log a warning and keep going.
    #[default]
    ScoreZero,
    /// Stop the run and return the failure.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "zero" | "score_zero" | "score-zero" => Ok(Self::ScoreZero),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown failure policy `{other}` (expected `zero` or `abort`)")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("prediction failed on example {index}")]
    Prediction {
        index: usize,
        #[source]
        source: PredictError,
    },
}

impl EvaluationError {
    pub fn is_backend_unavailable(&self) -> bool {
        match self {
            Self::Prediction { source, .. } => source.is_backend_unavailable(),
        }
    }
}

/// Result for one example, in dataset order.
#[derive(Debug, Clone, Serialize)]
pub struct ExampleOutcome {
    pub index: usize,
    pub score: f32,
    pub prediction: Option<Prediction>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    pub metric: String,
    pub outcomes: Vec<ExampleOutcome>,
}

impl EvaluationReport {
    /// Arithmetic mean of the per-example scores; 0.0 for an empty run.
    pub fn mean(&self) -> f32 {
        average_score(&self.scores())
    }

    pub fn scores(&self) -> Vec<f32> {
        self.outcomes.iter().map(|outcome| outcome.score).collect()
    }

    /// Examples whose call produced nothing to score.
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.prediction.is_none())
            .count()
    }

    /// Examples scored from a malformed answer, on the fields that parsed.
    pub fn malformed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.prediction.is_some() && outcome.error.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub fn average_score(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f32>() / scores.len() as f32
}

/// Renders an error with its whole source chain on one line.
pub fn describe_error(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Runs a module over a labeled dataset, one example at a time, and averages
/// a metric.
///
/// The module only sees [`Example::inputs`]. Neither the module nor the
/// examples are modified. Per-example call failures follow [`FailurePolicy`].
///
/// ```no_run
/// # async fn demo(module: &dsrs_eval::Predict, valset: &[dsrs_eval::Example]) -> anyhow::Result<()> {
/// use dsrs_eval::{Evaluator, ExactMatch, FailurePolicy};
///
/// let evaluator = Evaluator::builder().failure_policy(FailurePolicy::Abort).build();
/// let score = evaluator
///     .evaluate(module, valset, &ExactMatch::new(["category", "priority"]))
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Builder, Debug, Clone, Copy, Default)]
pub struct Evaluator {
    #[builder(default)]
    failure_policy: FailurePolicy,
    /// Log expected vs. predicted fields for every example at `info`.
    #[builder(default = false)]
    verbose: bool,
}

impl Evaluator {
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    #[tracing::instrument(
        name = "dsrs.evaluate",
        level = "debug",
        skip_all,
        fields(metric = metric.name(), examples = examples.len(), policy = ?self.failure_policy)
    )]
    pub async fn run<M: Module + ?Sized>(
        &self,
        module: &M,
        examples: &[Example],
        metric: &dyn Metric,
    ) -> Result<EvaluationReport, EvaluationError> {
        let mut reports = self.run_metrics(module, examples, &[metric]).await?;
        Ok(reports.pop().unwrap_or_default())
    }

    /// Calls the module once per example and scores every prediction under
    /// each metric. Returns one report per metric, in `metrics` order.
    pub async fn run_metrics<M: Module + ?Sized>(
        &self,
        module: &M,
        examples: &[Example],
        metrics: &[&dyn Metric],
    ) -> Result<Vec<EvaluationReport>, EvaluationError> {
        let mut reports: Vec<EvaluationReport> = metrics
            .iter()
            .map(|metric| EvaluationReport {
                metric: metric.name().to_string(),
                outcomes: Vec::with_capacity(examples.len()),
            })
            .collect();

        for (index, example) in examples.iter().enumerate() {
            let (prediction, error) = match module.forward(&example.inputs()).await {
                Ok(prediction) => (Some(prediction), None),
                Err(source) => match source.partial_prediction().cloned() {
                    Some(partial) => {
                        let error = describe_error(&source);
                        warn!(index, error = %error, "malformed prediction, scoring the fields that parsed");
                        (Some(partial), Some(error))
                    }
                    None => match self.failure_policy {
                        FailurePolicy::Abort => {
                            return Err(EvaluationError::Prediction { index, source });
                        }
                        FailurePolicy::ScoreZero => {
                            let error = describe_error(&source);
                            warn!(index, class = ?source.class(), error = %error, "prediction failed, scoring 0.0");
                            (None, Some(error))
                        }
                    },
                },
            };

            for (metric, report) in metrics.iter().zip(reports.iter_mut()) {
                let score = match &prediction {
                    Some(prediction) => clamp_score(metric.score(example, prediction)),
                    None => 0.0,
                };
                if self.verbose {
                    info!(
                        index,
                        metric = metric.name(),
                        score,
                        expected = ?example.labels().data,
                        predicted = ?prediction.as_ref().map(|p| &p.data),
                        "scored example"
                    );
                }
                report.outcomes.push(ExampleOutcome {
                    index,
                    score,
                    prediction: prediction.clone(),
                    error: error.clone(),
                });
            }
        }

        for report in &reports {
            debug!(
                metric = %report.metric,
                mean = report.mean(),
                failures = report.failures(),
                "evaluation complete"
            );
        }
        Ok(reports)
    }

    pub async fn evaluate<M: Module + ?Sized>(
        &self,
        module: &M,
        examples: &[Example],
        metric: &dyn Metric,
    ) -> Result<f32, EvaluationError> {
        Ok(self.run(module, examples, metric).await?.mean())
    }
}

/// Mean score of `module` over `examples` with the default [`Evaluator`].
pub async fn evaluate<M: Module + ?Sized>(
    module: &M,
    examples: &[Example],
    metric: &dyn Metric,
) -> Result<f32, EvaluationError> {
    Evaluator::default().evaluate(module, examples, metric).await
}
