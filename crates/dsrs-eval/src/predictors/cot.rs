use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::{
    Example, LanguageModel, Module, Optimizable, Predict, PredictError, Prediction, Signature,
};

/// [`Predict`] with a `reasoning` output placed ahead of the declared outputs.
///
/// The rationale stays in the prediction as an auxiliary field; metrics only
/// compare the fields they name.
#[derive(Clone, Debug)]
pub struct ChainOfThought {
    predictor: Predict,
}

impl ChainOfThought {
    pub fn new(signature: Signature, lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            predictor: Predict::new(signature.with_reasoning(), lm),
        }
    }

    pub fn predictor(&self) -> &Predict {
        &self.predictor
    }
}

#[async_trait]
impl Module for ChainOfThought {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        self.predictor.forward(inputs).await
    }
}

impl Optimizable for ChainOfThought {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        IndexMap::from([("predictor".to_string(), &mut self.predictor)])
    }
}
