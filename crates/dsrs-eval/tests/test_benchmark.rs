use std::time::Duration;

use async_trait::async_trait;
use dsrs_eval::{
    BenchmarkRunner, Evaluator, Example, ExactMatch, FailurePolicy, LmError, Metric, Module,
    PartialMatch, PredictError, Prediction, benchmark, example, prediction,
    render_comparison_table,
};

/// Sleeps for `latency`, then answers with a fixed category and priority.
struct TimedModule {
    latency: Duration,
    category: &'static str,
    priority: &'static str,
}

#[async_trait]
impl Module for TimedModule {
    async fn forward(&self, _inputs: &Example) -> Result<Prediction, PredictError> {
        tokio::time::sleep(self.latency).await;
        Ok(prediction! { "category" => self.category, "priority" => self.priority })
    }
}

struct OfflineModule;

#[async_trait]
impl Module for OfflineModule {
    async fn forward(&self, _inputs: &Example) -> Result<Prediction, PredictError> {
        Err(LmError::Unavailable {
            endpoint: "http://localhost:11434/api/chat".into(),
            reason: "connection refused".into(),
        }
        .into())
    }
}

fn dataset() -> Vec<Example> {
    vec![
        example! {
            "ticket": "input" => "Mon écran reste noir",
            "category": "output" => "Hardware",
            "priority": "output" => "High",
        },
        example! {
            "ticket": "input" => "Impossible d'envoyer des mails",
            "category": "output" => "Email",
            "priority": "output" => "High",
        },
    ]
}

fn both_fields() -> PartialMatch {
    PartialMatch::new(["category", "priority"])
}

#[tokio::test(start_paused = true)]
async fn reports_score_and_time_per_unit_in_order() {
    let fast = TimedModule {
        latency: Duration::from_millis(10),
        category: "Hardware",
        priority: "High",
    };
    // Right priority on both tickets, wrong category on both.
    let slow = TimedModule {
        latency: Duration::from_secs(1),
        category: "Software",
        priority: "High",
    };
    let units: Vec<(&str, &dyn Module)> = vec![("A", &fast), ("B", &slow)];
    let examples = vec![dataset()[0].clone(), dataset()[0].clone()];

    let report = benchmark(&units, &examples, &both_fields()).await;

    let ids: Vec<&str> = report
        .results
        .iter()
        .map(|result| result.identifier.as_str())
        .collect();
    assert_eq!(ids, vec!["A", "B"]);

    let a = &report.results[0];
    assert_eq!(a.score, 1.0);
    assert!(a.elapsed >= Duration::from_millis(20));
    assert!(a.elapsed < Duration::from_millis(25));
    assert!(a.per_example >= Duration::from_millis(10));

    let b = &report.results[1];
    assert_eq!(b.score, 0.5);
    assert!(b.elapsed >= Duration::from_secs(2));
    assert!(b.elapsed < Duration::from_millis(2_050));

    assert_eq!(report.best().map(|r| r.identifier.as_str()), Some("A"));
    assert_eq!(report.metric, "partial_match");
}

#[tokio::test(start_paused = true)]
async fn empty_dataset_has_zero_per_example_time() {
    let unit = TimedModule {
        latency: Duration::from_millis(10),
        category: "Hardware",
        priority: "High",
    };
    let units: Vec<(&str, &dyn Module)> = vec![("only", &unit)];

    let report = benchmark(&units, &[], &both_fields()).await;

    assert_eq!(report.results[0].score, 0.0);
    assert_eq!(report.results[0].per_example, Duration::ZERO);
    assert_eq!(report.results[0].examples, 0);
}

#[tokio::test]
async fn aborted_unit_is_reported_not_dropped() {
    let good = TimedModule {
        latency: Duration::ZERO,
        category: "Hardware",
        priority: "High",
    };
    let units: Vec<(&str, &dyn Module)> = vec![("offline", &OfflineModule), ("good", &good)];
    let runner = BenchmarkRunner::builder()
        .evaluator(
            Evaluator::builder()
                .failure_policy(FailurePolicy::Abort)
                .build(),
        )
        .build();

    let report = runner.run(&units, &dataset(), &both_fields()).await;

    assert_eq!(report.results.len(), 2);
    let offline = &report.results[0];
    assert!(!offline.is_success());
    assert_eq!(offline.score, 0.0);
    assert!(
        offline
            .error
            .as_deref()
            .is_some_and(|error| error.contains("connection refused"))
    );
    assert!(report.results[1].is_success());
    assert_eq!(report.best().map(|r| r.identifier.as_str()), Some("good"));
    assert!(report.render_table().contains("offline  FAILED"));
}

#[tokio::test]
async fn failing_examples_are_counted_under_score_zero() {
    let units: Vec<(&str, &dyn Module)> = vec![("offline", &OfflineModule)];
    let report = benchmark(&units, &dataset(), &both_fields()).await;

    let result = &report.results[0];
    assert!(result.is_success());
    assert_eq!(result.score, 0.0);
    assert_eq!(result.failed_examples, 2);
}

#[tokio::test]
async fn ties_go_to_the_first_unit() {
    let first = TimedModule {
        latency: Duration::ZERO,
        category: "Hardware",
        priority: "High",
    };
    let second = TimedModule {
        latency: Duration::ZERO,
        category: "Hardware",
        priority: "High",
    };
    let units: Vec<(&str, &dyn Module)> = vec![("first", &first), ("second", &second)];

    let report = benchmark(&units, &dataset()[..1], &both_fields()).await;

    assert_eq!(report.best().map(|r| r.identifier.as_str()), Some("first"));
}

#[tokio::test]
async fn comparison_scores_every_metric_and_names_best_performers() {
    let hardware = TimedModule {
        latency: Duration::ZERO,
        category: "Hardware",
        priority: "High",
    };
    let email = TimedModule {
        latency: Duration::ZERO,
        category: "Email",
        priority: "Low",
    };
    let units: Vec<(&str, &dyn Module)> = vec![("hardware", &hardware), ("email", &email)];
    let exact = ExactMatch::new(["category", "priority"]);
    let category = ExactMatch::new(["category"]).named("category");
    let metrics: Vec<&dyn Metric> = vec![&exact, &category];

    let rows = BenchmarkRunner::default()
        .compare(&units, &dataset(), &metrics)
        .await;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].scores["exact_match"], 0.5);
    assert_eq!(rows[0].scores["category"], 0.5);
    assert_eq!(rows[1].scores["exact_match"], 0.0);
    assert_eq!(rows[1].scores["category"], 0.5);

    let table = render_comparison_table(&rows, &metrics);
    assert!(table.contains("Best performers:"));
    assert!(table.contains("exact_match: hardware (50.0%)"));
    assert!(table.contains("category: hardware (50.0%)"));
}
