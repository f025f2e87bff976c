use std::{error::Error as StdError, time::Duration};

use crate::{LmUsage, Prediction};

/// What kind of failure a prediction hit, as seen by the harness and the
/// retry/fallback patterns. Obtained through [`PredictError::class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The backend rejected the request (4xx other than 429).
    BadRequest,
    /// The model-serving backend could not be reached at all.
    Unavailable,
    /// Transient failure (rate limit, timeout, server 5xx). Retry may help.
    Temporary,
    /// The LM responded, but the output couldn't be parsed.
    BadResponse,
    /// Nothing a retry can fix: provider-side bugs, empty composites.
    Internal,
}

/// Failure from a [`Module::forward`](crate::Module::forward) invocation.
///
/// 1. **[`Lm`](PredictError::Lm)**: couldn't reach the LM or it errored.
/// 2. **[`Parse`](PredictError::Parse)**: the LM responded, but a declared output
///    field was missing from its answer. Includes the raw response for debugging.
/// 3. **[`RetriesExhausted`](PredictError::RetriesExhausted)** and
///    **[`NoPrediction`](PredictError::NoPrediction)**: raised by the composite
///    modules in [`patterns`](crate::patterns) once every attempt or member failed.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("language model call failed")]
    Lm {
        #[source]
        source: LmError,
    },

    /// The answer came back without the declared output sections. Tokens were
    /// still spent, so `lm_usage` is kept.
    /// `partial` holds the declared outputs that did have a section, so a
    /// metric can still score them.
    #[error("could not read the declared outputs from the model answer")]
    Parse {
        #[source]
        source: ParseError,
        raw_response: String,
        lm_usage: LmUsage,
        partial: Prediction,
    },

    #[error("failed after {attempts} attempt(s)")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: Box<PredictError>,
    },

    #[error("no prediction produced: {reason}")]
    NoPrediction { reason: String },
}

impl PredictError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Lm { source } => source.class(),
            Self::Parse { .. } => ErrorClass::BadResponse,
            Self::RetriesExhausted { last, .. } => last.class(),
            Self::NoPrediction { .. } => ErrorClass::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Lm { source } => source.is_retryable(),
            Self::Parse { .. } => true,
            Self::RetriesExhausted { .. } => false,
            Self::NoPrediction { .. } => false,
        }
    }

    /// The outputs recovered from a malformed answer, also through retry
    /// wrappers. `None` for every other failure.
    pub fn partial_prediction(&self) -> Option<&Prediction> {
        match self {
            Self::Parse { partial, .. } => Some(partial),
            Self::RetriesExhausted { last, .. } => last.partial_prediction(),
            Self::Lm { .. } | Self::NoPrediction { .. } => None,
        }
    }

    /// True when the failure comes from an unreachable backend, even through
    /// retry wrappers.
    pub fn is_backend_unavailable(&self) -> bool {
        self.class() == ErrorClass::Unavailable
    }
}

impl From<LmError> for PredictError {
    fn from(source: LmError) -> Self {
        PredictError::Lm { source }
    }
}

/// Why a model answer could not be mapped onto the signature's outputs.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// No `[[ ## field ## ]]` header for a declared output.
    #[error("answer has no `{field}` section")]
    MissingField { field: String, raw_response: String },

    /// The provider returned no text at all.
    #[error("response was empty")]
    EmptyResponse,

    #[error("{} output section(s) missing", errors.len())]
    Multiple { errors: Vec<ParseError> },
}

impl ParseError {
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field, .. } => Some(field),
            Self::EmptyResponse | Self::Multiple { .. } => None,
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Multiple { errors } => errors.iter().filter_map(|e| e.field()).collect(),
            other => other.field().into_iter().collect(),
        }
    }
}

/// Transport-level failure talking to a model server.
#[derive(Debug, thiserror::Error)]
pub enum LmError {
    /// Could not reach the serving endpoint (DNS, connection refused, daemon not running).
    #[error("could not reach {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },

    /// HTTP 429.
    #[error("backend is rate limiting requests")]
    RateLimit { retry_after: Option<Duration> },

    /// Any other non-2xx status, or a 2xx body that is not the expected JSON.
    #[error("backend answered HTTP {status}: {body}")]
    InvalidResponse { status: u16, body: String },

    #[error("no answer within {after:?}")]
    Timeout { after: Duration },

    #[error("{provider}: {message}")]
    Provider {
        provider: String,
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl LmError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable { .. } => ErrorClass::Unavailable,
            Self::RateLimit { .. } => ErrorClass::Temporary,
            Self::InvalidResponse { status, .. } if *status >= 500 => ErrorClass::Temporary,
            Self::InvalidResponse { .. } => ErrorClass::BadRequest,
            Self::Timeout { .. } => ErrorClass::Temporary,
            Self::Provider { .. } => ErrorClass::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::RateLimit { .. } => true,
            Self::Timeout { .. } => true,
            Self::InvalidResponse { status, .. } => *status >= 500,
            Self::Provider { .. } => false,
        }
    }
}
