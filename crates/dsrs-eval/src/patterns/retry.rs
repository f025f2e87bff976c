use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::warn;

use crate::{Example, Module, Optimizable, Predict, PredictError, Prediction, describe_error};

/// Re-runs the wrapped module on retryable failures with exponential backoff.
///
/// Attempt `n` (zero-based) that fails waits `initial_delay * 2^n` before the
/// next one. Non-retryable errors return immediately. Successful predictions
/// carry an `attempts` field.
#[derive(Debug, Clone)]
pub struct Retry<M> {
    inner: M,
    max_attempts: usize,
    initial_delay: Duration,
}

impl<M> Retry<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }
}

#[async_trait]
impl<M: Module> Module for Retry<M> {
    async fn forward(&self, inputs: &Example) -> Result<Prediction, PredictError> {
        let mut attempt = 0;
        loop {
            match self.inner.forward(inputs).await {
                Ok(prediction) => {
                    return Ok(prediction.with_field("attempts", (attempt + 1).to_string()));
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt + 1 >= self.max_attempts => {
                    return Err(PredictError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs_f64(),
                        error = %describe_error(&err),
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl<M: Optimizable> Optimizable for Retry<M> {
    fn parameters(&mut self) -> IndexMap<String, &mut Predict> {
        self.inner.parameters()
    }
}
