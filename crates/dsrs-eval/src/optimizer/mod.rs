//! Optimizers behind one fixed entry point.
//!
//! Every optimizer takes a module, a training split, a metric and an
//! [`Effort`] token, and returns a reconfigured clone. Knobs that differ
//! between optimizers live on the optimizer's own builder, so call sites
//! never change when an optimizer's internals do.

pub mod bootstrap;
pub mod copro;
pub mod labeled;

pub use bootstrap::*;
pub use copro::*;
pub use labeled::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Example, Metric, Module, Optimizable, PredictError};

/// Training sets smaller than this still compile, with a warning.
pub const MIN_VIABLE_TRAINSET: usize = 10;

/// Coarse search budget. Each optimizer maps it to its own internal limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    #[default]
    Light,
    Medium,
    Heavy,
}

impl Effort {
    /// Maximum number of training examples an optimizer may run the module on.
    /// `None` means the whole training set.
    pub fn rollout_budget(self) -> Option<usize> {
        match self {
            Effort::Light => Some(20),
            Effort::Medium => Some(50),
            Effort::Heavy => None,
        }
    }
}

impl FromStr for Effort {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "light" => Ok(Effort::Light),
            "medium" => Ok(Effort::Medium),
            "heavy" => Ok(Effort::Heavy),
            other => Err(format!(
                "unknown effort `{other}` (expected light, medium or heavy)"
            )),
        }
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Effort::Light => "light",
            Effort::Medium => "medium",
            Effort::Heavy => "heavy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error("module exposes no predictors to optimize")]
    NoPredictors,

    #[error("invalid optimizer setting: {0}")]
    InvalidSetting(String),

    /// The backend became unreachable while proposing instructions.
    #[error("instruction proposal for `{predictor}` failed")]
    Proposal {
        predictor: String,
        #[source]
        source: PredictError,
    },

    /// The backend became unreachable while running the module on the training set.
    #[error("rollout on training example {index} failed")]
    Prediction {
        index: usize,
        #[source]
        source: PredictError,
    },
}

#[allow(async_fn_in_trait)]
pub trait Optimizer {
    /// Returns an optimized copy of `module`. `module` itself is left untouched.
    async fn compile<M>(
        &self,
        module: &M,
        trainset: &[Example],
        metric: &dyn Metric,
        effort: Effort,
    ) -> Result<M, OptimizeError>
    where
        M: Module + Optimizable + Clone;
}

/// Logs when the training set is too small for optimization to mean much.
pub(crate) fn warn_if_small(trainset: &[Example]) {
    if trainset.len() < MIN_VIABLE_TRAINSET {
        warn!(
            examples = trainset.len(),
            recommended = MIN_VIABLE_TRAINSET,
            "training set is small; optimization may not generalize"
        );
    }
}

/// Installs `demos` on every predictor of `module`.
pub(crate) fn install_demos<M: Optimizable>(
    module: &mut M,
    demos: &[Example],
) -> Result<usize, OptimizeError> {
    let mut parameters = module.parameters();
    if parameters.is_empty() {
        return Err(OptimizeError::NoPredictors);
    }
    for predictor in parameters.values_mut() {
        predictor.set_demos(demos.to_vec());
    }
    Ok(parameters.len())
}
