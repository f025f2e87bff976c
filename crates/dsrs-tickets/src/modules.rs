use std::sync::Arc;

use async_trait::async_trait;
use dsrs_eval::{
    ChainOfThought, Ensemble, Example, LanguageModel, Module, Optimizable, Predict, PredictError,
    Prediction, Validated,
};
use indexmap::IndexMap;
use tracing::debug;

use crate::data::{category_labels, priority_labels};
use crate::signatures::{category_classifier, priority_classifier, ticket_classifier};

fn prefixed<'a>(
    prefix: &str,
    parameters: IndexMap<String, &'a mut Predict>,
) -> impl Iterator<Item = (String, &'a mut Predict)> {
    parameters
        .into_iter()
        .map(move |(name, predictor)| (format!("{prefix}.{name}"), predictor))
}

/// Baseline: one chain-of-thought call for category and priority.
#[derive(Clone)]
pub struct SimpleTicketClassifier {
    classifier: ChainOfThought,
}

impl SimpleTicketClassifier {
    pub fn new(lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            classifier: ChainOfThought::new(ticket_classifier(), lm),
        }
    }
}

#[async_trait]
impl Module for SimpleTicketClassifier {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        self.classifier.forward(inputs).await
    }
}

impl Optimizable for SimpleTicketClassifier {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        prefixed("classifier", self.classifier.parameters()).collect()
    }
}

/// Category first, then priority with the predicted category as extra input.
#[derive(Clone)]
pub struct SequentialClassifier {
    category: ChainOfThought,
    priority: ChainOfThought,
}

impl SequentialClassifier {
    pub fn new(lm: Arc<dyn LanguageModel>) -> Self {
        Self::with_models(lm.clone(), lm)
    }

    pub fn with_models(
        category_lm: Arc<dyn LanguageModel>,
        priority_lm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            category: ChainOfThought::new(category_classifier(), category_lm),
            priority: ChainOfThought::new(priority_classifier(), priority_lm),
        }
    }
}

#[async_trait]
impl Module for SequentialClassifier {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        let category = self.category.forward(inputs).await?;
        let label = category.get("category").unwrap_or_default().to_string();
        debug!(category = %label, "category step done");

        let priority = self
            .priority
            .forward(&inputs.with_field("category", label.clone(), false))
            .await?;

        let data = IndexMap::from([
            ("category".to_string(), label),
            (
                "priority".to_string(),
                priority.get("priority").unwrap_or_default().to_string(),
            ),
        ]);
        Ok(Prediction::new(data, category.lm_usage + priority.lm_usage))
    }
}

impl Optimizable for SequentialClassifier {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        prefixed("category", self.category.parameters())
            .chain(prefixed("priority", self.priority.parameters()))
            .collect()
    }
}

/// Two-stage pipeline with a fast model for the category and a stronger one
/// for the priority. Records both model names on the prediction.
#[derive(Clone)]
pub struct HybridTicketClassifier {
    pipeline: SequentialClassifier,
    fast_model: String,
    accurate_model: String,
}

impl HybridTicketClassifier {
    pub fn new(fast_lm: Arc<dyn LanguageModel>, accurate_lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            fast_model: fast_lm.model().to_string(),
            accurate_model: accurate_lm.model().to_string(),
            pipeline: SequentialClassifier::with_models(fast_lm, accurate_lm),
        }
    }
}

#[async_trait]
impl Module for HybridTicketClassifier {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        Ok(self
            .pipeline
            .forward(inputs)
            .await?
            .with_field("category_model", self.fast_model.as_str())
            .with_field("priority_model", self.accurate_model.as_str()))
    }
}

impl Optimizable for HybridTicketClassifier {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        self.pipeline.parameters()
    }
}

/// Baseline classifier whose answers are snapped onto the known labels.
pub fn validated_classifier(lm: Arc<dyn LanguageModel>) -> Validated<SimpleTicketClassifier> {
    Validated::new(SimpleTicketClassifier::new(lm))
        .field("category", category_labels())
        .field("priority", priority_labels())
}

/// Majority vote of one baseline classifier per backend.
pub fn ensemble_classifier(backends: &[(String, Arc<dyn LanguageModel>)]) -> Ensemble {
    backends
        .iter()
        .fold(
            Ensemble::new(["category", "priority"]),
            |ensemble, (name, lm)| {
                ensemble.member(name.clone(), SimpleTicketClassifier::new(lm.clone()), 1)
            },
        )
        .labels("category", category_labels())
        .labels("priority", priority_labels())
}
