use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::Path;

use bedtime_core::GenerationError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to decode base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    #[error("unexpected http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("io error at `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("API returned an empty response")]
    EmptyResponse,
}

impl AdapterError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        AdapterError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        AdapterError::InvalidConfig(message.into())
    }
}

impl From<AdapterError> for GenerationError {
    fn from(err: AdapterError) -> Self {
        GenerationError::new(err)
    }
}

/// How a failed provider call is treated by the retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Timeout,
    RateLimit,
    Connection,
    Model,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Connection => "connection",
            Self::Model => "model",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Model)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider failure, tagged with the model and operation that produced it.
#[derive(Debug, Error)]
#[error("{kind} error from `{provider}` during {operation}: {source}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub operation: String,
    #[source]
    pub source: GenerationError,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        operation: impl Into<String>,
        source: GenerationError,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            operation: operation.into(),
            source,
        }
    }

    pub fn classify(
        provider: impl Into<String>,
        operation: impl Into<String>,
        source: GenerationError,
    ) -> Self {
        let kind = classify(&source);
        Self::new(kind, provider, operation, source)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Walks the whole source chain; the first matching class in priority order wins:
/// timeout, then rate limit, then connection, otherwise model.
pub fn classify(error: &(dyn StdError + 'static)) -> ProviderErrorKind {
    let mut timeout = false;
    let mut rate_limit = false;
    let mut connection = false;

    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => timeout = true,
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe => connection = true,
                _ => {}
            }
        }

        if let Some(http) = err.downcast_ref::<reqwest::Error>() {
            timeout |= http.is_timeout();
            connection |= http.is_connect();
            rate_limit |= http.status() == Some(StatusCode::TOO_MANY_REQUESTS);
        }

        if let Some(AdapterError::HttpStatus { status, .. }) = err.downcast_ref::<AdapterError>() {
            rate_limit |= *status == StatusCode::TOO_MANY_REQUESTS;
        }

        let message = err.to_string().to_lowercase();
        timeout |= message.contains("timeout") || message.contains("timed out");
        rate_limit |= message.contains("rate limit") || message.contains("too many requests");
        connection |= message.contains("connection") || message.contains("network");

        current = err.source();
    }

    if timeout {
        ProviderErrorKind::Timeout
    } else if rate_limit {
        ProviderErrorKind::RateLimit
    } else if connection {
        ProviderErrorKind::Connection
    } else {
        ProviderErrorKind::Model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(err: GenerationError) -> ProviderErrorKind {
        ProviderError::classify("test-model", "generate_story", err).kind
    }

    #[test]
    fn io_timeouts_are_timeouts() {
        let err = GenerationError::new(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(kind_of(err), ProviderErrorKind::Timeout);
    }

    #[test]
    fn refused_connections_are_connection_errors() {
        let err = GenerationError::new(io::Error::new(io::ErrorKind::ConnectionRefused, "nope"));
        assert_eq!(kind_of(err), ProviderErrorKind::Connection);
    }

    #[test]
    fn http_429_is_rate_limit() {
        let err = GenerationError::from(AdapterError::HttpStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "slow down".into(),
        });
        assert_eq!(kind_of(err), ProviderErrorKind::RateLimit);
    }

    #[test]
    fn messages_are_matched_case_insensitively() {
        assert_eq!(
            kind_of(GenerationError::msg("Rate Limit exceeded for model")),
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            kind_of(GenerationError::msg("Network unreachable")),
            ProviderErrorKind::Connection
        );
        assert_eq!(
            kind_of(GenerationError::msg("the prompt was rejected")),
            ProviderErrorKind::Model
        );
    }

    #[test]
    fn timeout_outranks_connection() {
        let err = GenerationError::msg("connection timed out");
        assert_eq!(kind_of(err), ProviderErrorKind::Timeout);
    }

    #[test]
    fn nested_sources_are_inspected() {
        let inner = io::Error::new(io::ErrorKind::ConnectionReset, "peer went away");
        let err = GenerationError::new(AdapterError::io(Path::new("/tmp/x"), inner));
        assert_eq!(kind_of(err), ProviderErrorKind::Connection);
    }

    #[test]
    fn only_model_errors_are_final() {
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(ProviderErrorKind::RateLimit.is_retryable());
        assert!(ProviderErrorKind::Connection.is_retryable());
        assert!(!ProviderErrorKind::Model.is_retryable());
    }
}
