use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dsrs_eval::{
    DummyLM, EvaluationError, Evaluator, Example, ExactMatch, FailurePolicy, LmError, Metric,
    Module, PartialMatch, Predict, PredictError, Prediction, Signature, evaluate, example,
    prediction,
};
use rstest::*;

/// Answers from the example's own labels when it can see them, which it
/// never should: the harness only passes input fields.
struct OracleModule {
    answers: Vec<(&'static str, &'static str, &'static str)>,
    seen: Mutex<Vec<Example>>,
}

impl OracleModule {
    fn new(answers: Vec<(&'static str, &'static str, &'static str)>) -> Self {
        Self {
            answers,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Module for OracleModule {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        self.seen.lock().expect("lock").push(inputs.clone());
        let ticket = inputs.get("ticket").unwrap_or_default();
        let (_, category, priority) = self
            .answers
            .iter()
            .find(|(t, _, _)| *t == ticket)
            .copied()
            .unwrap_or(("", "Unknown", "Unknown"));
        Ok(prediction! { "category" => category, "priority" => priority })
    }
}

/// Fails on tickets containing "boom".
struct FlakyModule;

#[async_trait]
impl Module for FlakyModule {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        if inputs.get("ticket").unwrap_or_default().contains("boom") {
            return Err(PredictError::from(LmError::Unavailable {
                endpoint: "http://localhost:11434/api/chat".into(),
                reason: "connection refused".into(),
            }));
        }
        Ok(prediction! { "category" => "Hardware", "priority" => "High" })
    }
}

fn ticket(text: &str, category: &str, priority: &str) -> Example {
    example! {
        "ticket": "input" => text,
        "category": "output" => category,
        "priority": "output" => priority,
    }
}

fn both_fields() -> ExactMatch {
    ExactMatch::new(["category", "priority"])
}

#[tokio::test]
async fn correct_unit_scores_one() {
    let dataset = vec![
        ticket("Mon PC ne démarre plus", "Hardware", "Urgent"),
        ticket("Le VPN est coupé", "Network", "High"),
    ];
    let unit = OracleModule::new(vec![
        ("Mon PC ne démarre plus", "Hardware", "Urgent"),
        ("Le VPN est coupé", "Network", "High"),
    ]);

    let score = evaluate(&unit, &dataset, &both_fields())
        .await
        .expect("evaluation succeeds");
    assert_eq!(score, 1.0);
}

#[tokio::test]
async fn category_right_priority_wrong() {
    let dataset = vec![ticket("Le VPN est coupé", "Network", "High")];
    let unit = OracleModule::new(vec![("Le VPN est coupé", "Network", "Low")]);

    let partial = evaluate(&unit, &dataset, &PartialMatch::new(["category", "priority"]))
        .await
        .expect("evaluation succeeds");
    let exact = evaluate(&unit, &dataset, &both_fields())
        .await
        .expect("evaluation succeeds");

    assert_eq!(partial, 0.5);
    assert_eq!(exact, 0.0);
}

#[tokio::test]
async fn empty_dataset_scores_zero() {
    let unit = OracleModule::new(vec![]);
    let score = evaluate(&unit, &[], &both_fields())
        .await
        .expect("evaluation succeeds");
    assert_eq!(score, 0.0);
    assert!(unit.seen.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn module_only_sees_inputs_in_dataset_order() {
    let dataset = vec![
        ticket("first", "Hardware", "Low"),
        ticket("second", "Network", "High"),
        ticket("third", "Email", "Medium"),
    ];
    let unit = OracleModule::new(vec![]);

    let report = Evaluator::default()
        .run(&unit, &dataset, &both_fields())
        .await
        .expect("evaluation succeeds");

    let seen = unit.seen.lock().expect("lock");
    let tickets: Vec<&str> = seen.iter().filter_map(|ex| ex.get("ticket")).collect();
    assert_eq!(tickets, vec!["first", "second", "third"]);
    assert!(seen.iter().all(|ex| ex.get("category").is_none() && ex.get("priority").is_none()));

    let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn evaluation_is_repeatable_and_leaves_dataset_untouched() {
    let dataset = vec![
        ticket("Le VPN est coupé", "Network", "High"),
        ticket("Imprimante HS", "Peripherals", "Low"),
    ];
    let snapshot = dataset.clone();
    let unit = OracleModule::new(vec![("Le VPN est coupé", "Network", "High")]);
    let metric = PartialMatch::new(["category", "priority"]);

    let first = evaluate(&unit, &dataset, &metric).await.expect("first run");
    let second = evaluate(&unit, &dataset, &metric).await.expect("second run");

    assert_eq!(first, second);
    assert_eq!(first, 0.5);
    assert_eq!(dataset, snapshot);
}

#[tokio::test]
async fn failures_score_zero_by_default() {
    let dataset = vec![
        ticket("écran cassé", "Hardware", "High"),
        ticket("boom", "Hardware", "High"),
    ];

    let report = Evaluator::default()
        .run(&FlakyModule, &dataset, &both_fields())
        .await
        .expect("score-zero policy never aborts");

    assert_eq!(report.mean(), 0.5);
    assert_eq!(report.failures(), 1);
    let failed = &report.outcomes[1];
    assert_eq!(failed.score, 0.0);
    assert!(failed.prediction.is_none());
    assert!(
        failed
            .error
            .as_deref()
            .is_some_and(|error| error.contains("connection refused"))
    );
}

#[tokio::test]
async fn abort_policy_surfaces_the_failing_example() {
    let dataset = vec![
        ticket("écran cassé", "Hardware", "High"),
        ticket("boom", "Hardware", "High"),
        ticket("clavier", "Hardware", "High"),
    ];
    let evaluator = Evaluator::builder()
        .failure_policy(FailurePolicy::Abort)
        .build();

    let err = evaluator
        .evaluate(&FlakyModule, &dataset, &both_fields())
        .await
        .expect_err("abort policy propagates");

    assert!(err.is_backend_unavailable());
    let EvaluationError::Prediction { index, .. } = err;
    assert_eq!(index, 1);
}

#[tokio::test]
async fn one_call_scores_several_metrics() {
    let dataset = vec![ticket("Le VPN est coupé", "Network", "High")];
    let unit = OracleModule::new(vec![("Le VPN est coupé", "Network", "Low")]);
    let exact = both_fields();
    let partial = PartialMatch::new(["category", "priority"]);
    let metrics: Vec<&dyn Metric> = vec![&exact, &partial];

    let reports = Evaluator::default()
        .run_metrics(&unit, &dataset, &metrics)
        .await
        .expect("evaluation succeeds");

    assert_eq!(unit.seen.lock().expect("lock").len(), 1);
    assert_eq!(reports[0].metric, "exact_match");
    assert_eq!(reports[0].mean(), 0.0);
    assert_eq!(reports[1].mean(), 0.5);
}

#[rstest]
#[case("zero", FailurePolicy::ScoreZero)]
#[case("score_zero", FailurePolicy::ScoreZero)]
#[case("ABORT", FailurePolicy::Abort)]
fn failure_policy_parses(#[case] raw: &str, #[case] expected: FailurePolicy) {
    assert_eq!(raw.parse::<FailurePolicy>(), Ok(expected));
}

#[rstest]
#[case(FailurePolicy::ScoreZero)]
#[case(FailurePolicy::Abort)]
#[tokio::test]
async fn answer_missing_a_section_is_scored_on_what_parsed(#[case] policy: FailurePolicy) {
    let lm = Arc::new(DummyLM::new(|_| "[[ ## category ## ]]\nNetwork".to_string()));
    let signature: Signature = "ticket -> category, priority".parse().expect("signature");
    let predict = Predict::new(signature, lm);
    let dataset = vec![
        ticket("Le VPN ne fonctionne plus.", "Network", "High"),
        ticket("Wifi instable en salle B.", "Network", "Medium"),
    ];

    let report = Evaluator::builder()
        .failure_policy(policy)
        .build()
        .run(&predict, &dataset, &PartialMatch::new(["category", "priority"]))
        .await
        .expect("a malformed answer never stops the run");

    assert!((report.mean() - 0.5).abs() < 1e-6);
    assert_eq!(report.failures(), 0);
    assert_eq!(report.malformed(), 2);
    let outcome = &report.outcomes[0];
    assert_eq!(
        outcome.prediction.as_ref().and_then(|p| p.get("category")),
        Some("Network")
    );
    assert!(
        outcome
            .error
            .as_deref()
            .is_some_and(|error| error.contains("no `priority` section"))
    );
}
