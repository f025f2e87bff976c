use std::sync::Arc;

use anyhow::{Context, Result, bail};
use dsrs_eval::{LM, LMConfig, LanguageModel, LmError, Provider};
use tracing::{info, warn};

/// Inference settings shared by every model the binary talks to. Only the
/// model name changes between backends.
#[derive(Clone, Debug)]
pub struct Backend {
    pub config: LMConfig,
    pub base_url: Option<String>,
}

impl Backend {
    /// Builds a client for `model`. A bare name such as `mistral:7b` is served
    /// through Ollama.
    pub fn connect(&self, model: &str) -> Result<Arc<LM>> {
        let model = if model.contains('/') {
            model.to_string()
        } else {
            format!("ollama_chat/{model}")
        };
        let config = LMConfig {
            model,
            ..self.config.clone()
        };

        let lm = LM::builder()
            .config(config)
            .maybe_base_url(self.base_url.as_deref().map(normalize_host))
            .build()
            .context("failed to configure the language model client")?;
        Ok(Arc::new(lm))
    }

    /// Connects to `model` and runs the liveness check.
    pub async fn connect_checked(&self, model: &str) -> Result<Arc<LM>> {
        let lm = self.connect(model)?;
        check_liveness(&lm).await?;
        Ok(lm)
    }

    /// One client per model, labelled with the name the caller gave.
    pub fn connect_all(&self, models: &[String]) -> Result<Vec<(String, Arc<dyn LanguageModel>)>> {
        models
            .iter()
            .map(|model| {
                let lm: Arc<dyn LanguageModel> = self.connect(model)?;
                Ok((model.clone(), lm))
            })
            .collect()
    }
}

/// `OLLAMA_HOST` is often set without a scheme (`0.0.0.0:11434`).
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Fails fast when the backend is down, and warns when an Ollama model has
/// not been pulled yet.
pub async fn check_liveness(lm: &LM) -> Result<()> {
    let served = match lm.health_check().await {
        Ok(served) => served,
        Err(LmError::Unavailable { endpoint, reason }) => {
            bail!(
                "cannot reach the model server at {endpoint} ({reason}). \
                 Start it with `ollama serve` or point --base-url / OLLAMA_HOST at a running instance"
            );
        }
        Err(err) => return Err(err).context("liveness check failed"),
    };

    if lm.provider() == Provider::Ollama
        && !served
            .iter()
            .any(|name| name == lm.model_id() || name == &format!("{}:latest", lm.model_id()))
    {
        warn!(
            model = lm.model_id(),
            "model is not pulled on this server; run `ollama pull {}`",
            lm.model_id()
        );
    }
    info!(endpoint = lm.endpoint(), models = served.len(), "backend reachable");
    Ok(())
}
