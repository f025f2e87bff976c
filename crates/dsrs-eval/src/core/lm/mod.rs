pub mod chat;
pub mod config;
pub mod dummy;
pub mod usage;

pub use chat::*;
pub use config::*;
pub use dummy::*;
pub use usage::*;

use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::LmError;

/// A single completion returned by a [`LanguageModel`].
///
/// Captures the assistant reply (`output`), the provider token accounting
/// (`usage`), and the final chat transcript (`chat`) so higher-level modules
/// can inspect the full exchange.
#[derive(Clone, Debug)]
pub struct LMResponse {
    /// Assistant message chosen by the provider.
    pub output: Message,
    /// Token usage reported by the provider for this call.
    pub usage: LmUsage,
    /// Chat history including the freshly appended assistant response.
    pub chat: Chat,
}

/// Backend seam for predictors. Every [`Predict`](crate::Predict) holds an
/// `Arc<dyn LanguageModel>`; nothing reads a process-global model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier used in logs and benchmark labels.
    fn model(&self) -> &str;

    async fn call(&self, chat: Chat) -> Result<LMResponse, LmError>;
}

/// Wire format spoken by [`LM`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Ollama native API: `POST /api/chat`, liveness via `GET /api/tags`.
    #[default]
    Ollama,
    /// OpenAI-compatible API: `POST /chat/completions`, liveness via `GET /models`.
    OpenAiCompatible,
}

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

fn get_base_url_by_provider(provider: &str) -> &str {
    match provider {
        "ollama" | "ollama_chat" => DEFAULT_OLLAMA_BASE_URL,
        "openai" => "https://api.openai.com/v1",
        "anthropic" => "https://api.anthropic.com/v1",
        "google" => "https://generativelanguage.googleapis.com/v1beta/openai",
        "groq" => "https://api.groq.com/openai/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "together" => "https://api.together.xyz/v1",
        "xai" => "https://api.x.ai/v1",
        _ => "https://openrouter.ai/api/v1",
    }
}

/// Splits `provider/model` into the wire format, the provider prefix and the
/// bare model id. A model without a prefix is served by Ollama.
pub fn resolve_model(model: &str) -> (Provider, Option<&str>, &str) {
    match model.split_once('/') {
        Some((prefix @ ("ollama" | "ollama_chat"), id)) => (Provider::Ollama, Some(prefix), id),
        Some((prefix, id)) => (Provider::OpenAiCompatible, Some(prefix), id),
        None => (Provider::Ollama, None, model),
    }
}

/// HTTP language-model client for Ollama and OpenAI-compatible servers.
///
/// The provider prefix of `config.model` picks the wire format and the default
/// base URL; `base_url` overrides the latter (e.g. a remote Ollama host).
/// API keys are only needed for hosted providers and default to
/// `<PREFIX>_API_KEY` from the environment.
///
/// ```no_run
/// # async fn demo() -> Result<(), dsrs_eval::LmError> {
/// use dsrs_eval::{LM, LMConfig};
///
/// let lm = LM::builder()
///     .config(LMConfig::builder().model("ollama_chat/llama3.1:8b").build())
///     .build()?;
/// let models = lm.health_check().await?;
/// # Ok(()) }
/// ```
#[derive(Builder, Clone)]
#[builder(finish_fn(vis = "", name = build_internal))]
pub struct LM {
    /// Model inference settings applied to each call.
    #[builder(default)]
    pub config: LMConfig,
    /// Base URL override for the serving endpoint.
    #[builder(into)]
    pub base_url: Option<String>,
    /// Provider API credential stored as a [`SecretString`].
    pub api_key: Option<SecretString>,
    #[builder(skip)]
    provider: Provider,
    #[builder(skip)]
    model_id: String,
    #[builder(skip)]
    endpoint: String,
    #[builder(skip)]
    client: reqwest::Client,
}

impl std::fmt::Debug for LM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LM")
            .field("model", &self.config.model)
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl<S: l_m_builder::IsComplete> LMBuilder<S> {
    /// Finalizes construction of an [`LM`], resolving the provider and
    /// initializing the HTTP client.
    pub fn build(self) -> Result<LM, LmError> {
        let mut lm = self.build_internal();

        let (provider, prefix, model_id) = resolve_model(&lm.config.model);
        lm.provider = provider;
        lm.model_id = model_id.to_string();
        lm.endpoint = lm
            .base_url
            .clone()
            .unwrap_or_else(|| get_base_url_by_provider(prefix.unwrap_or("ollama")).to_string())
            .trim_end_matches('/')
            .to_string();

        if provider == Provider::OpenAiCompatible && lm.api_key.is_none() {
            let var = format!("{}_API_KEY", prefix.unwrap_or("openai").to_uppercase());
            match std::env::var(&var) {
                Ok(key) => lm.api_key = Some(SecretString::from(key)),
                Err(_) => warn!(env = %var, "no API key configured for hosted provider"),
            }
        }

        lm.client = reqwest::Client::builder()
            .timeout(lm.config.timeout)
            .build()
            .map_err(|source| LmError::Provider {
                provider: format!("{provider:?}"),
                message: "failed to build HTTP client".to_string(),
                source: Some(Box::new(source)),
            })?;

        debug!(model = %lm.model_id, endpoint = %lm.endpoint, ?provider, "LM ready");
        Ok(lm)
    }
}

impl LM {
    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Model id without the provider prefix, as sent on the wire.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Liveness check. Returns the model names the backend currently serves.
    ///
    /// A refused connection surfaces as [`LmError::Unavailable`]; callers run
    /// this before starting an evaluation so an absent daemon fails fast.
    #[tracing::instrument(
        name = "dsrs.lm.health_check",
        level = "debug",
        skip(self),
        fields(endpoint = %self.endpoint)
    )]
    pub async fn health_check(&self) -> Result<Vec<String>, LmError> {
        let url = match self.provider {
            Provider::Ollama => format!("{}/api/tags", self.endpoint),
            Provider::OpenAiCompatible => format!("{}/models", self.endpoint),
        };

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|err| self.transport_error(err, &url))?;
        let response = self.check_status(response).await?;

        let names: Vec<String> = match self.provider {
            Provider::Ollama => {
                let tags: OllamaTags = response.json().await.map_err(|err| self.decode_error(err))?;
                tags.models.into_iter().map(|model| model.name).collect()
            }
            Provider::OpenAiCompatible => {
                let list: OpenAiModelList =
                    response.json().await.map_err(|err| self.decode_error(err))?;
                list.data.into_iter().map(|model| model.id).collect()
            }
        };

        debug!(count = names.len(), "backend reachable");
        Ok(names)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, LmError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(LmError::RateLimit { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LmError::InvalidResponse {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn transport_error(&self, err: reqwest::Error, url: &str) -> LmError {
        if err.is_timeout() {
            LmError::Timeout {
                after: self.config.timeout,
            }
        } else if err.is_connect() || err.is_request() {
            LmError::Unavailable {
                endpoint: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            self.decode_error(err)
        }
    }

    fn decode_error(&self, err: reqwest::Error) -> LmError {
        LmError::Provider {
            provider: format!("{:?}", self.provider),
            message: "unexpected response body".to_string(),
            source: Some(Box::new(err)),
        }
    }

    async fn call_ollama(&self, chat: &Chat) -> Result<(Message, LmUsage), LmError> {
        let url = format!("{}/api/chat", self.endpoint);
        let request = OllamaChatRequest {
            model: &self.model_id,
            messages: &chat.messages,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
                top_p: self.config.top_p,
                seed: self.config.seed,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.transport_error(err, &url))?;
        let response = self.check_status(response).await?;
        let body: OllamaChatResponse = response.json().await.map_err(|err| self.decode_error(err))?;

        let usage = LmUsage::new(body.prompt_eval_count, body.eval_count);
        Ok((Message::assistant(body.message.content), usage))
    }

    async fn call_openai(&self, chat: &Chat) -> Result<(Message, LmUsage), LmError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = OpenAiChatRequest {
            model: &self.model_id,
            messages: &chat.messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            seed: self.config.seed,
        };

        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|err| self.transport_error(err, &url))?;
        let response = self.check_status(response).await?;
        let body: OpenAiChatResponse = response.json().await.map_err(|err| self.decode_error(err))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = body
            .usage
            .map(|usage| LmUsage::new(usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or_default();
        Ok((Message::assistant(content), usage))
    }
}

#[async_trait]
impl LanguageModel for LM {
    fn model(&self) -> &str {
        &self.config.model
    }

    /// Executes a chat completion against the configured provider.
    #[tracing::instrument(
        name = "dsrs.lm.call",
        level = "debug",
        skip(self, chat),
        fields(model = %self.model_id, messages = chat.len())
    )]
    async fn call(&self, chat: Chat) -> Result<LMResponse, LmError> {
        let (output, usage) = match self.provider {
            Provider::Ollama => self.call_ollama(&chat).await?,
            Provider::OpenAiCompatible => self.call_openai(&chat).await?,
        };
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion received"
        );

        let mut full_chat = chat;
        full_chat.push_message(output.clone());

        Ok(LMResponse {
            output,
            usage,
            chat: full_chat,
        })
    }
}

#[derive(Serialize)]
pub(crate) struct OllamaChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
    pub options: OllamaOptions,
}

#[derive(Serialize)]
pub(crate) struct OllamaOptions {
    pub temperature: f32,
    pub num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Deserialize)]
struct OpenAiModel {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_request_uses_native_option_names() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let request = OllamaChatRequest {
            model: "llama3.1:8b",
            messages: &messages,
            stream: false,
            options: OllamaOptions {
                temperature: 0.3,
                num_predict: 256,
                top_p: None,
                seed: Some(7),
            },
        };

        let value = serde_json::to_value(&request).expect("request serializes");
        assert_eq!(value["model"], "llama3.1:8b");
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["options"]["num_predict"], 256);
        assert_eq!(value["options"]["seed"], 7);
        assert!(value["options"].get("top_p").is_none());
    }

    #[test]
    fn ollama_response_ignores_extra_fields() {
        let body = r#"{
            "model": "llama3.1:8b",
            "created_at": "2024-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "[[ ## category ## ]]\nNetwork"},
            "done": true,
            "prompt_eval_count": 42,
            "eval_count": 7
        }"#;
        let parsed: OllamaChatResponse = serde_json::from_str(body).expect("response parses");
        assert_eq!(parsed.message.content, "[[ ## category ## ]]\nNetwork");
        assert_eq!(LmUsage::new(parsed.prompt_eval_count, parsed.eval_count).total_tokens, 49);
    }

    #[test]
    fn resolve_model_prefers_ollama_without_prefix() {
        assert_eq!(
            resolve_model("ollama_chat/llama3.1:8b"),
            (Provider::Ollama, Some("ollama_chat"), "llama3.1:8b")
        );
        assert_eq!(
            resolve_model("openai/gpt-4o-mini"),
            (Provider::OpenAiCompatible, Some("openai"), "gpt-4o-mini")
        );
        assert_eq!(resolve_model("mistral:7b"), (Provider::Ollama, None, "mistral:7b"));
    }
}
