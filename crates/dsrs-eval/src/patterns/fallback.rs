use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::warn;

use crate::{Example, Module, Optimizable, Predict, PredictError, Prediction, describe_error};

/// Tries `primary`, then `fallback` if it fails.
///
/// The prediction records which side answered in `model_used`
/// (`primary` / `fallback`). When both fail the fallback's error is returned.
#[derive(Debug, Clone)]
pub struct Fallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> Fallback<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P: Module, F: Module> Module for Fallback<P, F> {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        match self.primary.forward(inputs).await {
            Ok(prediction) => Ok(prediction.with_field("model_used", "primary")),
            Err(err) => {
                warn!(error = %describe_error(&err), "primary failed, switching to fallback");
                let prediction = self.fallback.forward(inputs).await?;
                Ok(prediction.with_field("model_used", "fallback"))
            }
        }
    }
}

impl<P: Optimizable, F: Optimizable> Optimizable for Fallback<P, F> {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        let mut parameters = IndexMap::new();
        for (name, predictor) in self.primary.parameters() {
            parameters.insert(format!("primary.{name}"), predictor);
        }
        for (name, predictor) in self.fallback.parameters() {
            parameters.insert(format!("fallback.{name}"), predictor);
        }
        parameters
    }
}
