//! The five walkthrough scenarios, each usable on its own or chained by `run all`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Result, bail};
use dsrs_eval::{
    BenchmarkReport, BenchmarkRunner, BootstrapFewShot, ComparisonRow, Copro, Dataset, Effort,
    EvaluationReport, Evaluator, ExactMatch, Example, LanguageModel, Metric, Module, Optimizable,
    Optimizer, PartialMatch, example, render_comparison_table,
};
use tracing::{error, info};

use crate::data::SAMPLE_TICKET;
use crate::modules::{
    HybridTicketClassifier, SequentialClassifier, SimpleTicketClassifier, validated_classifier,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    BasicUsage = 1,
    Evaluation = 2,
    Optimization = 3,
    Benchmark = 4,
    Comparison = 5,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::BasicUsage,
        Scenario::Evaluation,
        Scenario::Optimization,
        Scenario::Benchmark,
        Scenario::Comparison,
    ];
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self {
            Scenario::BasicUsage => "basic usage",
            Scenario::Evaluation => "evaluation",
            Scenario::Optimization => "optimization",
            Scenario::Benchmark => "multi-model benchmark",
            Scenario::Comparison => "module comparison",
        };
        write!(f, "{}. {title}", *self as u8)
    }
}

/// Scenarios picked on the command line: one number or `all`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection(pub Vec<Scenario>);

impl FromStr for Selection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(Selection(Scenario::ALL.to_vec())),
            other => other
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| Scenario::ALL.get(index).copied())
                .map(|scenario| Selection(vec![scenario]))
                .ok_or_else(|| format!("unknown scenario `{value}` (expected 1-5 or all)")),
        }
    }
}

/// Everything the scenarios run against.
pub struct Workbench {
    pub lm: Arc<dyn LanguageModel>,
    /// Units compared by the benchmark scenario, in display order.
    pub models: Vec<(String, Arc<dyn LanguageModel>)>,
    pub dataset: Dataset,
    pub evaluator: Evaluator,
    pub effort: Effort,
}

pub fn exact() -> ExactMatch {
    ExactMatch::new(["category", "priority"])
}

pub fn partial() -> PartialMatch {
    PartialMatch::new(["category", "priority"])
}

fn percent(score: f32) -> String {
    format!("{:.1}%", score * 100.0)
}

/// The first three demos of a predictor, one line each.
fn render_demos(name: &str, demos: &[Example]) -> String {
    let mut out = format!("{name}: {} demo(s)\n", demos.len());
    for (index, demo) in demos.iter().take(3).enumerate() {
        out.push_str(&format!(
            "  {}. {} -> {} / {}\n",
            index + 1,
            demo.get("ticket").unwrap_or_default(),
            demo.get("category").unwrap_or_default(),
            demo.get("priority").unwrap_or_default(),
        ));
    }
    out
}

impl Workbench {
    pub async fn run(&self, scenario: Scenario) -> Result<()> {
        println!("\n=== Scenario {scenario} ===");
        match scenario {
            Scenario::BasicUsage => self.basic_usage().await,
            Scenario::Evaluation => self.evaluation().await.map(|_| ()),
            Scenario::Optimization => self.optimization().await.map(|_| ()),
            Scenario::Benchmark => {
                print!("{}", self.benchmark().await?.render_table());
                Ok(())
            }
            Scenario::Comparison => self.comparison().await.map(|_| ()),
        }
    }

    /// Runs every selected scenario, carrying on past failures. Fails at the
    /// end if any scenario did.
    pub async fn run_all(&self, selection: &Selection) -> Result<()> {
        let mut failed = Vec::new();
        for scenario in &selection.0 {
            if let Err(err) = self.run(*scenario).await {
                error!(%scenario, error = %format!("{err:#}"), "scenario failed");
                println!("Scenario {scenario} failed: {err:#}");
                failed.push(*scenario);
            }
        }

        if !failed.is_empty() {
            let names: Vec<String> = failed.iter().map(ToString::to_string).collect();
            bail!("{} scenario(s) failed: {}", failed.len(), names.join(", "));
        }
        Ok(())
    }

    pub async fn basic_usage(&self) -> Result<()> {
        let classifier = SimpleTicketClassifier::new(self.lm.clone());
        let prediction = classifier
            .forward(&example! { "ticket": "input" => SAMPLE_TICKET })
            .await?;

        println!("Ticket:    {SAMPLE_TICKET}");
        println!("Category:  {}", prediction.get("category").unwrap_or_default());
        println!("Priority:  {}", prediction.get("priority").unwrap_or_default());
        if let Some(reasoning) = prediction.get("reasoning") {
            println!("Reasoning: {reasoning}");
        }
        Ok(())
    }

    /// Exact and partial scores of the baseline on the validation split.
    pub async fn evaluation(&self) -> Result<(f32, f32)> {
        let classifier = SimpleTicketClassifier::new(self.lm.clone());
        let (exact, partial) = (exact(), partial());
        let metrics: [&dyn Metric; 2] = [&exact, &partial];
        let reports = self
            .evaluator
            .run_metrics(&classifier, self.dataset.validation(), &metrics)
            .await?;

        print_outcomes(&reports[0], self.dataset.validation().len());
        let scores = (reports[0].mean(), reports[1].mean());
        println!(
            "\nExact match:   {}\nPartial match: {}",
            percent(scores.0),
            percent(scores.1)
        );
        Ok(scores)
    }

    /// Validation score before and after few-shot bootstrapping on the training split.
    pub async fn optimization(&self) -> Result<(f32, f32)> {
        let metric = exact();
        let baseline = SimpleTicketClassifier::new(self.lm.clone());
        let before = self
            .evaluator
            .evaluate(&baseline, self.dataset.validation(), &metric)
            .await?;
        println!("Before optimization: {}", percent(before));

        let optimizer = BootstrapFewShot::builder()
            .max_bootstrapped_demos(4)
            .max_labeled_demos(4)
            .build();
        let mut optimized = optimizer
            .compile(&baseline, self.dataset.train(), &metric, self.effort)
            .await?;
        for (name, predictor) in optimized.parameters() {
            info!(predictor = %name, demos = predictor.demos().len(), "optimized predictor");
            print!("{}", render_demos(&name, predictor.demos()));
        }

        // Instruction search on top of the bootstrapped demos.
        let mut optimized = Copro::builder()
            .breadth(3)
            .depth(1)
            .build()
            .compile(&optimized, self.dataset.train(), &metric, self.effort)
            .await?;
        for (name, predictor) in optimized.parameters() {
            println!("Instruction for {name}: {}", predictor.instruction());
        }

        let after = self
            .evaluator
            .evaluate(&optimized, self.dataset.validation(), &metric)
            .await?;
        println!("After optimization:  {}", percent(after));
        println!("Improvement:         {:+.1} points", (after - before) * 100.0);
        Ok((before, after))
    }

    /// Baseline classifier on each configured model, timed. The caller
    /// decides how to render the report.
    pub async fn benchmark(&self) -> Result<BenchmarkReport> {
        if self.models.is_empty() {
            bail!("no models configured for the benchmark");
        }

        let classifiers: Vec<(String, SimpleTicketClassifier)> = self
            .models
            .iter()
            .map(|(name, lm)| (name.clone(), SimpleTicketClassifier::new(lm.clone())))
            .collect();
        let units: Vec<(&str, &dyn Module)> = classifiers
            .iter()
            .map(|(name, classifier)| (name.as_str(), classifier as &dyn Module))
            .collect();

        let report = BenchmarkRunner::builder()
            .evaluator(self.evaluator)
            .build()
            .run(&units, self.dataset.validation(), &partial())
            .await;
        Ok(report)
    }

    /// Every module variant under four metrics.
    pub async fn comparison(&self) -> Result<Vec<ComparisonRow>> {
        let simple = SimpleTicketClassifier::new(self.lm.clone());
        let sequential = SequentialClassifier::new(self.lm.clone());
        let validated = validated_classifier(self.lm.clone());
        let hybrid = match self.models.as_slice() {
            [(_, fast), .., (_, accurate)] => {
                Some(HybridTicketClassifier::new(fast.clone(), accurate.clone()))
            }
            _ => None,
        };

        let mut units: Vec<(&str, &dyn Module)> = vec![
            ("Simple", &simple),
            ("Sequential", &sequential),
            ("Validated", &validated),
        ];
        if let Some(hybrid) = &hybrid {
            units.push(("Hybrid", hybrid));
        }

        let exact = exact();
        let partial = partial();
        let category = ExactMatch::new(["category"]).named("category_only");
        let priority = ExactMatch::new(["priority"]).named("priority_only");
        let metrics: Vec<&dyn Metric> = vec![&exact, &category, &priority, &partial];

        let rows = BenchmarkRunner::builder()
            .evaluator(self.evaluator)
            .build()
            .compare(&units, self.dataset.validation(), &metrics)
            .await;
        print!("{}", render_comparison_table(&rows, &metrics));
        Ok(rows)
    }
}

fn print_outcomes(report: &EvaluationReport, total: usize) {
    for outcome in &report.outcomes {
        let mark = if outcome.score >= 1.0 { "ok" } else { "--" };
        match (&outcome.prediction, &outcome.error) {
            (Some(prediction), _) => println!(
                "[{mark}] {}/{total}  {} / {}",
                outcome.index + 1,
                prediction.get("category").unwrap_or_default(),
                prediction.get("priority").unwrap_or_default()
            ),
            (None, Some(error)) => println!("[!!] {}/{total}  {error}", outcome.index + 1),
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use dsrs_eval::{DummyLM, FailurePolicy};
    use rstest::rstest;

    use super::*;
    use crate::data;

    fn always(category: &'static str, priority: &'static str) -> Arc<dyn LanguageModel> {
        Arc::new(DummyLM::new(move |_| {
            format!(
                "[[ ## reasoning ## ]]\n...\n\n[[ ## category ## ]]\n{category}\n\n[[ ## priority ## ]]\n{priority}"
            )
        }))
    }

    fn workbench(lm: Arc<dyn LanguageModel>) -> Workbench {
        Workbench {
            models: vec![("dummy".to_string(), lm.clone())],
            lm,
            dataset: data::dataset().expect("bundled data"),
            evaluator: Evaluator::default(),
            effort: Effort::Light,
        }
    }

    #[rstest]
    #[case("1", vec![Scenario::BasicUsage])]
    #[case(" 5 ", vec![Scenario::Comparison])]
    #[case("ALL", Scenario::ALL.to_vec())]
    fn selection_parses(#[case] raw: &str, #[case] expected: Vec<Scenario>) {
        assert_eq!(raw.parse::<Selection>(), Ok(Selection(expected)));
    }

    #[rstest]
    #[case("0")]
    #[case("6")]
    #[case("two")]
    fn selection_rejects_unknown(#[case] raw: &str) {
        assert!(raw.parse::<Selection>().is_err());
    }

    #[tokio::test]
    async fn evaluation_scores_the_validation_split() {
        // Right on one validation ticket, half right on two more.
        let bench = workbench(always("Application", "Critical"));
        let (exact, partial) = bench.evaluation().await.expect("runs");
        assert!((exact - 1.0 / 7.0).abs() < 1e-6);
        assert!((partial - 2.0 / 7.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn optimization_reports_before_and_after() {
        let bench = workbench(always("Hardware", "Low"));
        let (before, after) = bench.optimization().await.expect("runs");
        // A constant backend ignores the demos.
        assert_eq!(before, after);
    }

    #[test]
    fn demo_listing_stops_at_three() {
        let demos: Vec<Example> = (1..=4)
            .map(|i| {
                example! {
                    "ticket": "input" => format!("ticket {i}"),
                    "category": "output" => "Network",
                    "priority": "output" => "High",
                }
            })
            .collect();

        let listing = render_demos("classifier", &demos);

        assert!(listing.starts_with("classifier: 4 demo(s)\n"));
        assert!(listing.contains("  3. ticket 3 -> Network / High\n"));
        assert!(!listing.contains("ticket 4"));
    }

    #[tokio::test]
    async fn offline_backend_fails_scenario_under_abort() {
        let mut bench = workbench(Arc::new(DummyLM::unavailable()));
        bench.evaluator = Evaluator::builder()
            .failure_policy(FailurePolicy::Abort)
            .build();
        assert!(bench.evaluation().await.is_err());

        let err = bench
            .run_all(&Selection(vec![Scenario::BasicUsage, Scenario::Evaluation]))
            .await
            .expect_err("both scenarios fail");
        assert!(err.to_string().starts_with("2 scenario(s) failed"));
    }

    #[tokio::test]
    async fn comparison_includes_hybrid_with_two_models() {
        let mut bench = workbench(always("Hardware", "Low"));
        bench.models.push(("second".to_string(), always("Network", "High")));

        let rows = bench.comparison().await.expect("runs");

        let names: Vec<&str> = rows.iter().map(|row| row.module.as_str()).collect();
        assert_eq!(names, vec!["Simple", "Sequential", "Validated", "Hybrid"]);
        assert!(rows.iter().all(|row| row.scores.len() == 4));
    }

    #[tokio::test]
    async fn benchmark_keeps_model_order() {
        let mut bench = workbench(always("Hardware", "Low"));
        bench.models = vec![
            ("b".to_string(), always("Application", "Critical")),
            ("a".to_string(), always("Hardware", "Low")),
        ];
        let report = bench.benchmark().await.expect("runs");
        let ids: Vec<&str> = report.results.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(report.metric, "partial_match");
    }
}
