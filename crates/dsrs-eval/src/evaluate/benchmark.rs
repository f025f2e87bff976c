use std::fmt::Write as _;
use std::time::Duration;

use bon::Builder;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{Evaluator, Example, Metric, Module, describe_error};

/// Score and timing of one unit over one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub identifier: String,
    pub score: f32,
    /// Wall-clock time for the whole evaluation.
    pub elapsed: Duration,
    /// `elapsed` divided by the number of examples; zero for an empty dataset.
    pub per_example: Duration,
    pub examples: usize,
    pub failed_examples: usize,
    /// Set when the evaluation stopped early; `score` is then 0.0.
    pub error: Option<String>,
}

impl BenchmarkResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub started_at: DateTime<Utc>,
    pub metric: String,
    /// One entry per requested unit, in request order.
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    /// Highest-scoring unit that finished; the earliest wins a tie.
    pub fn best(&self) -> Option<&BenchmarkResult> {
        self.results
            .iter()
            .filter(|result| result.is_success())
            .fold(None, |best: Option<&BenchmarkResult>, result| match best {
                Some(current) if current.score >= result.score => Some(current),
                _ => Some(result),
            })
    }

    /// Results ordered by score (descending), then total time.
    pub fn ranked(&self) -> Vec<&BenchmarkResult> {
        let mut ranked: Vec<&BenchmarkResult> = self.results.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.elapsed.cmp(&b.elapsed))
        });
        ranked
    }

    pub fn render_table(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|result| result.identifier.chars().count())
            .max()
            .unwrap_or(0)
            .max(4);

        let mut table = String::new();
        let _ = writeln!(
            table,
            "{:<width$}  {:>7}  {:>10}  {:>12}  {:>8}",
            "Unit", "Score", "Total (s)", "Per ex. (s)", "Failures"
        );
        let _ = writeln!(table, "{}", "-".repeat(width + 47));
        for result in &self.results {
            match &result.error {
                None => {
                    let _ = writeln!(
                        table,
                        "{:<width$}  {:>6.1}%  {:>10.2}  {:>12.2}  {:>8}",
                        result.identifier,
                        result.score * 100.0,
                        result.elapsed.as_secs_f64(),
                        result.per_example.as_secs_f64(),
                        result.failed_examples,
                    );
                }
                Some(error) => {
                    let _ = writeln!(table, "{:<width$}  FAILED: {error}", result.identifier);
                }
            }
        }
        if let Some(best) = self.best() {
            let _ = writeln!(
                table,
                "\nBest: {} ({:.1}%)",
                best.identifier,
                best.score * 100.0
            );
        }
        table
    }
}

/// Runs the same dataset and metric over several units and times each run.
///
/// Units run strictly one after another with a fresh evaluation each, so no
/// state leaks between them. A unit whose evaluation aborts is still reported,
/// with its error.
#[derive(Builder, Debug, Clone, Copy, Default)]
pub struct BenchmarkRunner {
    #[builder(default)]
    evaluator: Evaluator,
}

impl BenchmarkRunner {
    #[tracing::instrument(
        name = "dsrs.benchmark",
        level = "debug",
        skip_all,
        fields(units = units.len(), examples = examples.len(), metric = metric.name())
    )]
    pub async fn run(
        &self,
        units: &[(&str, &dyn Module)],
        examples: &[Example],
        metric: &dyn Metric,
    ) -> BenchmarkReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(units.len());

        for (identifier, module) in units {
            info!(unit = %identifier, "benchmarking");
            let start = Instant::now();
            let outcome = self.evaluator.run(*module, examples, metric).await;
            let elapsed = start.elapsed();
            let per_example = per_example(elapsed, examples.len());

            let result = match outcome {
                Ok(report) => BenchmarkResult {
                    identifier: identifier.to_string(),
                    score: report.mean(),
                    elapsed,
                    per_example,
                    examples: examples.len(),
                    failed_examples: report.failures(),
                    error: None,
                },
                Err(err) => {
                    let error = describe_error(&err);
                    warn!(unit = %identifier, error = %error, "benchmark unit failed");
                    BenchmarkResult {
                        identifier: identifier.to_string(),
                        score: 0.0,
                        elapsed,
                        per_example,
                        examples: examples.len(),
                        failed_examples: examples.len(),
                        error: Some(error),
                    }
                }
            };
            info!(
                unit = %result.identifier,
                score = result.score,
                elapsed_secs = result.elapsed.as_secs_f64(),
                "unit finished"
            );
            results.push(result);
        }

        BenchmarkReport {
            started_at,
            metric: metric.name().to_string(),
            results,
        }
    }

    /// Scores every unit under several metrics, calling each unit once per example.
    pub async fn compare(
        &self,
        units: &[(&str, &dyn Module)],
        examples: &[Example],
        metrics: &[&dyn Metric],
    ) -> Vec<ComparisonRow> {
        let mut rows = Vec::with_capacity(units.len());
        for (identifier, module) in units {
            info!(unit = %identifier, metrics = metrics.len(), "comparing");
            let row = match self.evaluator.run_metrics(*module, examples, metrics).await {
                Ok(reports) => ComparisonRow {
                    module: identifier.to_string(),
                    scores: reports
                        .iter()
                        .map(|report| (report.metric.clone(), report.mean()))
                        .collect(),
                    error: None,
                },
                Err(err) => ComparisonRow {
                    module: identifier.to_string(),
                    scores: IndexMap::new(),
                    error: Some(describe_error(&err)),
                },
            };
            rows.push(row);
        }
        rows
    }
}

fn per_example(elapsed: Duration, examples: usize) -> Duration {
    match u32::try_from(examples) {
        Ok(0) => Duration::ZERO,
        Ok(n) => elapsed / n,
        Err(_) => Duration::from_secs_f64(elapsed.as_secs_f64() / examples as f64),
    }
}

/// Benchmarks `units` with the default runner.
pub async fn benchmark(
    units: &[(&str, &dyn Module)],
    examples: &[Example],
    metric: &dyn Metric,
) -> BenchmarkReport {
    BenchmarkRunner::default().run(units, examples, metric).await
}

/// Mean score of one unit under several metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub module: String,
    pub scores: IndexMap<String, f32>,
    pub error: Option<String>,
}

/// Renders the comparison as a table followed by the best unit per metric.
pub fn render_comparison_table(rows: &[ComparisonRow], metrics: &[&dyn Metric]) -> String {
    let names: Vec<&str> = metrics.iter().map(|metric| metric.name()).collect();
    let width = rows
        .iter()
        .map(|row| row.module.chars().count())
        .max()
        .unwrap_or(0)
        .max(6);

    let mut table = String::new();
    let _ = write!(table, "{:<width$}", "Module");
    for name in &names {
        let _ = write!(table, "  {:>15}", name);
    }
    let _ = writeln!(table);
    let _ = writeln!(table, "{}", "-".repeat(width + names.len() * 17));

    for row in rows {
        let _ = write!(table, "{:<width$}", row.module);
        match &row.error {
            Some(error) => {
                let _ = write!(table, "  FAILED: {error}");
            }
            None => {
                for name in &names {
                    match row.scores.get(*name) {
                        Some(score) => {
                            let _ = write!(table, "  {:>14.1}%", score * 100.0);
                        }
                        None => {
                            let _ = write!(table, "  {:>15}", "-");
                        }
                    }
                }
            }
        }
        let _ = writeln!(table);
    }

    let _ = writeln!(table, "\nBest performers:");
    for name in &names {
        let best = rows
            .iter()
            .filter_map(|row| row.scores.get(*name).map(|score| (row, *score)))
            .fold(None, |best: Option<(&ComparisonRow, f32)>, (row, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((row, score)),
            });
        if let Some((row, score)) = best {
            let _ = writeln!(table, "  {name}: {} ({:.1}%)", row.module, score * 100.0);
        }
    }
    table
}
