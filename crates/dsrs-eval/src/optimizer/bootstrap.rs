use std::collections::HashSet;

use bon::Builder;
use tracing::{debug, info, warn};

use crate::optimizer::{install_demos, warn_if_small};
use crate::{
    Effort, Example, Metric, Module, Optimizable, OptimizeError, Optimizer, Prediction,
    describe_error,
};

/// Few-shot demos from the module's own successful runs.
///
/// The original module is run over the training set (up to the rollout budget
/// of the [`Effort`]). Each run whose score reaches `threshold` becomes a demo
/// holding the example's inputs and everything the module produced, including
/// auxiliary fields such as `reasoning`. Remaining slots, up to
/// `max_labeled_demos` in total, are filled with unused labeled examples.
///
/// # Hyperparameters
///
/// - `max_bootstrapped_demos` (default 4): demos taken from passing runs.
/// - `max_labeled_demos` (default 16): cap on bootstrapped plus raw demos.
/// - `threshold` (default 1.0): minimum metric score for a run to count.
///
/// A failed run is skipped, except when the backend is unreachable, which
/// stops compilation.
#[derive(Builder, Debug, Clone)]
pub struct BootstrapFewShot {
    #[builder(default = 4)]
    max_bootstrapped_demos: usize,
    #[builder(default = 16)]
    max_labeled_demos: usize,
    #[builder(default = 1.0)]
    threshold: f32,
}

impl Default for BootstrapFewShot {
    fn default() -> Self {
        BootstrapFewShot::builder().build()
    }
}

/// Demo built from a passing run: inputs plus every produced field as output.
fn trace_to_demo(example: &Example, prediction: &Prediction) -> Example {
    prediction
        .data
        .iter()
        .fold(example.inputs(), |demo, (field, value)| {
            demo.with_field(field.clone(), value.clone(), true)
        })
}

impl Optimizer for BootstrapFewShot {
    #[tracing::instrument(
        name = "dsrs.optimizer.bootstrap",
        level = "debug",
        skip_all,
        fields(trainset = trainset.len(), metric = metric.name(), %effort)
    )]
    async fn compile<M>(
        &self,
        module: &M,
        trainset: &[Example],
        metric: &dyn Metric,
        effort: Effort,
    ) -> Result<M, OptimizeError>
    where
        M: Module + Optimizable + Clone,
    {
        warn_if_small(trainset);
        let mut student = module.clone();
        if trainset.is_empty() {
            return Ok(student);
        }

        let budget = effort
            .rollout_budget()
            .unwrap_or(trainset.len())
            .min(trainset.len());

        let mut bootstrapped = Vec::new();
        let mut used = HashSet::new();
        for (index, example) in trainset.iter().enumerate().take(budget) {
            if bootstrapped.len() >= self.max_bootstrapped_demos {
                break;
            }

            match module.forward(&example.inputs()).await {
                Ok(prediction) => {
                    let score = metric.score(example, &prediction);
                    debug!(index, score, "rollout scored");
                    if score >= self.threshold {
                        bootstrapped.push(trace_to_demo(example, &prediction));
                        used.insert(index);
                    }
                }
                Err(source) if source.is_backend_unavailable() => {
                    return Err(OptimizeError::Prediction { index, source });
                }
                Err(source) => {
                    warn!(index, error = %describe_error(&source), "rollout failed, skipping");
                }
            }
        }

        let labeled_slots = self.max_labeled_demos.saturating_sub(bootstrapped.len());
        let labeled: Vec<Example> = trainset
            .iter()
            .enumerate()
            .filter(|(index, _)| !used.contains(index))
            .take(labeled_slots)
            .map(|(_, example)| example.clone())
            .collect();

        let bootstrapped_count = bootstrapped.len();
        let mut demos = bootstrapped;
        demos.extend(labeled);

        let predictors = install_demos(&mut student, &demos)?;
        info!(
            bootstrapped = bootstrapped_count,
            labeled = demos.len() - bootstrapped_count,
            predictors,
            "bootstrap complete"
        );
        Ok(student)
    }
}
