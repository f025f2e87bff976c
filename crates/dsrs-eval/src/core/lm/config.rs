use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Tunable inference parameters applied to each [`LM`](crate::LM) call.
#[derive(Clone, Debug, Builder, Serialize, Deserialize, PartialEq)]
pub struct LMConfig {
    /// Model identifier. Accepts `provider/model` to pick the wire format and base URL
    /// (`ollama_chat/llama3.1:8b`, `openai/gpt-4o-mini`).
    #[builder(default = "ollama_chat/llama3.1:8b".to_string(), into)]
    pub model: String,
    /// Sampling temperature. Higher values increase randomness.
    #[builder(default = 0.3)]
    pub temperature: f32,
    /// Nucleus sampling parameter, omitted from requests when unset.
    pub top_p: Option<f32>,
    /// Maximum tokens requested for the completion.
    #[builder(default = 1024)]
    pub max_tokens: u32,
    /// Optional deterministic seed when the provider supports it.
    pub seed: Option<i64>,
    /// Per-request timeout enforced by the HTTP client.
    #[builder(default = Duration::from_secs(120))]
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for LMConfig {
    fn default() -> Self {
        LMConfig::builder().build()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
