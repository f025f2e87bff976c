use bon::Builder;
use tracing::{debug, info, warn};

use crate::optimizer::warn_if_small;
use crate::{
    Effort, Example, Metric, Module, Optimizable, OptimizeError, Optimizer, Predict, Signature,
    average_score, describe_error, example,
};

/// Instruction search, breadth first.
///
/// For each predictor the predictor's own LM proposes `breadth - 1` rewrites
/// of the current instruction. The current instruction and every distinct
/// proposal are scored on the training set (up to the rollout budget of the
/// [`Effort`]) and the best one is kept; the current instruction wins ties.
/// `depth` rounds refine the previous winner.
///
/// Demos are left as they are, so this composes with [`BootstrapFewShot`]
/// run before it.
///
/// # Hyperparameters
///
/// - `breadth` (default 4): candidates per round and predictor, the current
///   instruction included. Must be at least 2.
/// - `depth` (default 2): refinement rounds.
///
/// # Cost
///
/// Per round and predictor: `breadth - 1` proposal calls plus one module call
/// per scored example and candidate.
///
/// [`BootstrapFewShot`]: crate::BootstrapFewShot
#[derive(Builder, Debug, Clone)]
pub struct Copro {
    #[builder(default = 4)]
    breadth: usize,
    #[builder(default = 2)]
    depth: usize,
}

impl Default for Copro {
    fn default() -> Self {
        Copro::builder().build()
    }
}

fn proposal_signature() -> Signature {
    Signature::new(
        "Rewrite the instruction given to a language model so that it solves the task more \
         reliably. Keep the same input and output fields. Answer with the new instruction only.",
    )
    .input("instruction", "Current instruction")
    .input("fields", "Inputs and outputs of the task")
    .input("variant", "Which alternative to write; make each one different")
    .output("proposed_instruction", "Improved instruction")
}

fn describe_fields(signature: &Signature) -> String {
    format!(
        "{} -> {}",
        signature.input_names().join(", "),
        signature.output_names().join(", ")
    )
}

fn with_predictor<M, T>(
    module: &mut M,
    name: &str,
    apply: impl FnOnce(&mut Predict) -> T,
) -> Result<T, OptimizeError>
where
    M: Optimizable,
{
    let mut parameters = module.parameters();
    match parameters.get_mut(name) {
        Some(predictor) => Ok(apply(predictor)),
        None => Err(OptimizeError::NoPredictors),
    }
}

impl Copro {
    /// Up to `breadth - 1` distinct rewrites of `current`. Failed proposals are
    /// skipped unless the backend is down.
    async fn propose(
        &self,
        name: &str,
        current: &str,
        predictor: &Predict,
    ) -> Result<Vec<String>, OptimizeError> {
        let proposer = Predict::new(proposal_signature(), predictor.lm().clone());
        let fields = describe_fields(predictor.signature());

        let mut candidates: Vec<String> = Vec::new();
        for variant in 1..self.breadth {
            let inputs = example! {
                "instruction": "input" => current,
                "fields": "input" => fields,
                "variant": "input" => variant,
            };
            match proposer.forward(&inputs).await {
                Ok(prediction) => {
                    let proposed = prediction
                        .get("proposed_instruction")
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    if !proposed.is_empty() && proposed != current && !candidates.contains(&proposed)
                    {
                        candidates.push(proposed);
                    }
                }
                Err(source) if source.is_backend_unavailable() => {
                    return Err(OptimizeError::Proposal {
                        predictor: name.to_string(),
                        source,
                    });
                }
                Err(source) => {
                    warn!(predictor = name, variant, error = %describe_error(&source), "proposal failed, skipping");
                }
            }
        }
        Ok(candidates)
    }

    /// Mean metric score of `module` on `examples`. Malformed answers are
    /// scored on what parsed, other failures count 0.0, and an unreachable
    /// backend stops the search.
    async fn score<M: Module>(
        module: &M,
        examples: &[Example],
        metric: &dyn Metric,
    ) -> Result<f32, OptimizeError> {
        let mut scores = Vec::with_capacity(examples.len());
        for (index, example) in examples.iter().enumerate() {
            let score = match module.forward(&example.inputs()).await {
                Ok(prediction) => metric.score(example, &prediction),
                Err(source) if source.is_backend_unavailable() => {
                    return Err(OptimizeError::Prediction { index, source });
                }
                Err(source) => match source.partial_prediction() {
                    Some(partial) => metric.score(example, partial),
                    None => 0.0,
                },
            };
            scores.push(score.clamp(0.0, 1.0));
        }
        Ok(average_score(&scores))
    }
}

impl Optimizer for Copro {
    #[tracing::instrument(
        name = "dsrs.optimizer.copro",
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
        if self.breadth < 2 {
            return Err(OptimizeError::InvalidSetting(format!(
                "breadth must be at least 2, got {}",
                self.breadth
            )));
        }

        warn_if_small(trainset);
        let mut student = module.clone();
        if trainset.is_empty() {
            return Ok(student);
        }

        let names: Vec<String> = student.parameters().keys().cloned().collect();
        if names.is_empty() {
            return Err(OptimizeError::NoPredictors);
        }

        let budget = effort
            .rollout_budget()
            .unwrap_or(trainset.len())
            .min(trainset.len());
        let scored = &trainset[..budget];

        for round in 0..self.depth {
            for name in &names {
                let predictor = with_predictor(&mut student, name, |predictor| predictor.clone())?;
                let current = predictor.instruction().to_string();
                let proposals = self.propose(name, &current, &predictor).await?;
                if proposals.is_empty() {
                    debug!(predictor = %name, round, "no usable proposals");
                    continue;
                }

                let mut best = (current.clone(), Self::score(&student, scored, metric).await?);
                for candidate in proposals {
                    with_predictor(&mut student, name, |predictor| {
                        predictor.set_instruction(candidate.clone())
                    })?;
                    let score = Self::score(&student, scored, metric).await?;
                    debug!(predictor = %name, round, score, "candidate scored");
                    if score > best.1 {
                        best = (candidate, score);
                    }
                }

                let (instruction, score) = best;
                info!(
                    predictor = %name,
                    round,
                    score,
                    changed = instruction != current,
                    "instruction selected"
                );
                with_predictor(&mut student, name, |predictor| {
                    predictor.set_instruction(instruction)
                })?;
            }
        }
        Ok(student)
    }
}
