use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is unset or blank.
pub const DEFAULT_DIRECTIVES: &str = "dsrs_eval=info,dsrs_tickets=info";

static INSTALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("RUST_LOG=`{directives}` is not a valid filter: {source}")]
    Filter {
        directives: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("could not install the log subscriber: {0}")]
    Install(#[source] Box<dyn StdError + Send + Sync>),
}

/// Sends compact log lines to stderr, filtered by `RUST_LOG` or
/// [`DEFAULT_DIRECTIVES`]. Calling it again after a successful install does
/// nothing.
pub fn init_tracing() -> Result<(), TelemetryError> {
    if INSTALLED.load(Ordering::Acquire) {
        return Ok(());
    }

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter_from_env()?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::Install)?;
    INSTALLED.store(true, Ordering::Release);
    Ok(())
}

fn filter_from_env() -> Result<EnvFilter, TelemetryError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => parse_filter(directives),
        _ => parse_filter(DEFAULT_DIRECTIVES.to_string()),
    }
}

fn parse_filter(directives: String) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::Filter { directives, source })
}

/// Cuts `value` to at most `max_chars` characters, on a char boundary.
pub fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((cutoff, _)) => &value[..cutoff],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_multibyte_chars() {
        assert_eq!(truncate("réseau en panne", 6), "réseau");
        assert_eq!(truncate("court", 10), "court");
    }

    #[test]
    fn default_directives_parse() {
        assert!(parse_filter(DEFAULT_DIRECTIVES.to_string()).is_ok());
    }

    #[test]
    fn bad_directives_are_reported() {
        let err = parse_filter("dsrs_eval=loud[".to_string()).expect_err("invalid");
        assert!(err.to_string().contains("dsrs_eval=loud["));
    }
}
