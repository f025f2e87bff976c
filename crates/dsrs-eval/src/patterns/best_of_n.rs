use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{Example, Module, Optimizable, Predict, PredictError, Prediction, describe_error};

type RewardFn = dyn Fn(&Example, &Prediction) -> f32 + Send + Sync;

/// Runs the wrapped module up to `n` times and keeps the highest-reward answer.
///
/// The reward sees the inputs and the prediction, never labels. Sampling stops
/// early once an answer reaches `threshold`. Useful with a sampling temperature
/// above zero; a deterministic backend returns the same answer every time.
#[derive(Clone)]
pub struct BestOfN<M> {
    inner: M,
    n: usize,
    threshold: f32,
    reward: Arc<RewardFn>,
}

impl<M> BestOfN<M> {
    pub fn new(
        inner: M,
        n: usize,
        reward: impl Fn(&Example, &Prediction) -> f32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            n: n.max(1),
            threshold: 1.0,
            reward: Arc::new(reward),
        }
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl<M: Module> Module for BestOfN<M> {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        let mut best: Option<(f32, Prediction)> = None;
        let mut last_error = None;

        for attempt in 0..self.n {
            match self.inner.forward(inputs).await {
                Ok(prediction) => {
                    let reward = (self.reward)(inputs, &prediction);
                    debug!(attempt, reward, "candidate scored");
                    if best.as_ref().is_none_or(|(top, _)| reward > *top) {
                        best = Some((reward, prediction));
                    }
                    if reward >= self.threshold {
                        break;
                    }
                }
                Err(err) => {
                    warn!(attempt, error = %describe_error(&err), "candidate failed");
                    last_error = Some(err);
                }
            }
        }

        match (best, last_error) {
            (Some((_, prediction)), _) => Ok(prediction),
            (None, Some(err)) => Err(err),
            (None, None) => Err(PredictError::NoPrediction {
                reason: "no candidates were sampled".to_string(),
            }),
        }
    }
}

impl<M: Optimizable> Optimizable for BestOfN<M> {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        self.inner.parameters()
    }
}
