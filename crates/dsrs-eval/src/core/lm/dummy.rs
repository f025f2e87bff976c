use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::{Chat, LMResponse, LanguageModel, LmError, LmUsage, Message};

type Responder = dyn Fn(&Chat) -> Result<String, LmError> + Send + Sync;

/// In-memory LM used for deterministic tests and offline demos.
///
/// Answers come from a responder closure that sees the full chat. Every call
/// is recorded so tests can inspect the prompts a module produced.
#[derive(Clone)]
pub struct DummyLM {
    model: String,
    responder: Arc<Responder>,
    history: Arc<Mutex<Vec<Chat>>>,
}

impl DummyLM {
    pub fn new(respond: impl Fn(&Chat) -> String + Send + Sync + 'static) -> Self {
        Self::fallible(move |chat| Ok(respond(chat)))
    }

    pub fn fallible(
        respond: impl Fn(&Chat) -> Result<String, LmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            model: "dummy".to_string(),
            responder: Arc::new(respond),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replays `responses` in order; once exhausted every call fails with a
    /// provider error.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(responses.into_iter().map(Into::into).collect());
        Self::fallible(move |_| {
            queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| LmError::Provider {
                    provider: "dummy".to_string(),
                    message: "scripted responses exhausted".to_string(),
                    source: None,
                })
        })
    }

    /// A backend that always reports itself unreachable.
    pub fn unavailable() -> Self {
        Self::fallible(|_| {
            Err(LmError::Unavailable {
                endpoint: "dummy://offline".to_string(),
                reason: "connection refused".to_string(),
            })
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns the `n` most recent requests, oldest first.
    pub fn inspect_history(&self, n: usize) -> Vec<Chat> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let start = history.len().saturating_sub(n);
        history[start..].to_vec()
    }
}

#[async_trait]
impl LanguageModel for DummyLM {
    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, chat: Chat) -> Result<LMResponse, LmError> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chat.clone());

        let content = (self.responder)(&chat)?;
        let output = Message::assistant(content);
        let mut full_chat = chat;
        full_chat.push_message(output.clone());

        Ok(LMResponse {
            output,
            usage: LmUsage::default(),
            chat: full_chat,
        })
    }
}
