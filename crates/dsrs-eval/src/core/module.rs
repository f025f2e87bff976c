use async_trait::async_trait;
use indexmap::IndexMap;

use crate::{Example, Predict, PredictError, Prediction};

/// A prediction unit: turns the input fields of an example into a prediction.
///
/// Implementations receive [`Example::inputs`], never the labels. The harness
/// treats a module as a black box and only ever borrows it immutably.
#[async_trait]
pub trait Module: Send + Sync {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError>;
}

#[async_trait]
impl<M: Module + ?Sized> Module for Box<M> {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        (**self).forward(inputs).await
    }
}

#[async_trait]
impl<M: Module + ?Sized> Module for std::sync::Arc<M> {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        (**self).forward(inputs).await
    }
}

/// Exposes the predictors an optimizer may reconfigure, keyed by a dotted path
/// (`classify`, `category.predictor`).
pub trait Optimizable {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict>;
}

impl Optimizable for Predict {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        IndexMap::from([("predictor".to_string(), self)])
    }
}
