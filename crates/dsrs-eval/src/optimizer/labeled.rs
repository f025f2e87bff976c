use bon::Builder;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::optimizer::{install_demos, warn_if_small};
use crate::{Effort, Example, Metric, Module, Optimizable, OptimizeError, Optimizer};

/// Attaches `k` training examples, sampled with a fixed seed, as demos.
///
/// Never calls the module; `metric` and `effort` are accepted for the common
/// interface only.
#[derive(Builder, Debug, Clone)]
pub struct LabeledFewShot {
    #[builder(default = 16)]
    k: usize,
    #[builder(default = 0)]
    seed: u64,
}

impl Default for LabeledFewShot {
    fn default() -> Self {
        LabeledFewShot::builder().build()
    }
}

impl Optimizer for LabeledFewShot {
    async fn compile<M>(
        &self,
        module: &M,
        trainset: &[Example],
        _metric: &dyn Metric,
        _effort: Effort,
    ) -> Result<M, OptimizeError>
    where
        M: Module + Optimizable + Clone,
    {
        warn_if_small(trainset);
        let mut student = module.clone();
        if trainset.is_empty() {
            return Ok(student);
        }

        let mut demos = trainset.to_vec();
        demos.shuffle(&mut StdRng::seed_from_u64(self.seed));
        demos.truncate(self.k);

        let predictors = install_demos(&mut student, &demos)?;
        info!(demos = demos.len(), predictors, "labeled demos installed");
        Ok(student)
    }
}
