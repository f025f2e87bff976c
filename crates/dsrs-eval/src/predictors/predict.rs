use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use tracing::debug;

use crate::utils::telemetry::truncate;
use crate::{ChatAdapter, Example, LanguageModel, Module, PredictError, Prediction, Signature};

/// Single LM call driven by a [`Signature`].
///
/// Holds its own backend handle, instruction (inside the signature) and
/// few-shot demos. Optimizers rewrite the latter two on a clone.
///
/// ```
/// use std::sync::Arc;
/// use dsrs_eval::{DummyLM, Predict, Signature};
///
/// let lm = Arc::new(DummyLM::new(|_| "[[ ## answer ## ]]\n4".to_string()));
/// let predict = Predict::builder()
///     .signature("question -> answer".parse::<Signature>().unwrap())
///     .lm(lm)
///     .build();
/// assert!(predict.demos().is_empty());
/// ```
#[derive(Builder, Clone)]
pub struct Predict {
    signature: Signature,
    lm: Arc<dyn LanguageModel>,
    #[builder(default)]
    demos: Vec<Example>,
    #[builder(default)]
    adapter: ChatAdapter,
}

impl std::fmt::Debug for Predict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predict")
            .field("signature", &self.signature)
            .field("demos", &self.demos.len())
            .field("model", &self.lm.model())
            .finish()
    }
}

impl Predict {
    pub fn new(signature: Signature, lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            signature,
            lm,
            demos: Vec::new(),
            adapter: ChatAdapter,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn instruction(&self) -> &str {
        &self.signature.instruction
    }

    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        self.signature.instruction = instruction.into();
    }

    pub fn demos(&self) -> &[Example] {
        &self.demos
    }

    pub fn set_demos(&mut self, demos: Vec<Example>) {
        self.demos = demos;
    }

    pub fn lm(&self) -> &Arc<dyn LanguageModel> {
        &self.lm
    }

    /// Same signature and demos, different backend.
    pub fn with_lm(&self, lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            lm,
            ..self.clone()
        }
    }
}

#[async_trait]
impl Module for Predict {
    #[tracing::instrument(
        name = "dsrs.predict",
        level = "debug",
        skip(self, inputs),
        fields(model = %self.lm.model(), demos = self.demos.len())
    )]
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        let chat = self.adapter.format(&self.signature, &self.demos, inputs);
        let response = self.lm.call(chat).await?;

        let content = response.output.content();
        debug!(response = %truncate(content, 200), "lm response");

        self.adapter
            .parse_response(&self.signature, content, response.usage.clone())
            .map_err(|source| PredictError::Parse {
                source,
                raw_response: content.to_string(),
                lm_usage: response.usage.clone(),
                partial: self
                    .adapter
                    .parse_partial(&self.signature, content, response.usage.clone()),
            })
    }
}
