use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The complete error taxonomy for the acquisition pipeline. Every
/// component reports failures through this type rather than raising
/// ad-hoc exceptions, so callers can match on `kind()` instead of
/// inspecting message strings.
#[derive(Debug, Error)]
pub enum CapcatError {
    #[error("network error contacting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },

    #[error("feed at {url} is not valid RSS or Atom: {reason}")]
    InvalidFeed { url: String, reason: String },

    #[error("no discovery URL for source '{source_id}' yielded any articles")]
    ArticleDiscoveryFailed { source_id: String },

    #[error("content fetch failed for {url}: {reason}")]
    ContentFetch { url: String, reason: String },

    #[error("circuit open for source '{source_id}'")]
    CircuitOpen { source_id: String },

    #[error("invalid configuration: {field}: {requirement}")]
    Validation { field: String, requirement: String },

    #[error("filesystem error during {operation} at {path}: {source}")]
    FileSystem {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing error for {url}: {reason}")]
    Parsing { url: String, reason: String },
}

/// A coarse classification used by the retry executor. Mirrors the
/// table in the error handling design: network hiccups and timeouts are
/// worth retrying, everything else propagates immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    InvalidFeed,
    ArticleDiscoveryFailed,
    ContentFetch,
    CircuitOpen,
    Validation,
    FileSystem,
    Parsing,
}

impl CapcatError {
    /// Classify a `reqwest::Error` into `Timeout` when the client's
    /// deadline was the actual cause, `Network` otherwise (DNS/connect/
    /// read failures and non-timeout transport errors alike).
    pub fn from_reqwest(url: impl Into<String>, timeout: Duration, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            CapcatError::Timeout {
                url: url.into(),
                elapsed: timeout,
            }
        } else {
            CapcatError::Network {
                url: url.into(),
                source,
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CapcatError::Network { .. } => ErrorKind::Network,
            CapcatError::Timeout { .. } => ErrorKind::Timeout,
            CapcatError::InvalidFeed { .. } => ErrorKind::InvalidFeed,
            CapcatError::ArticleDiscoveryFailed { .. } => ErrorKind::ArticleDiscoveryFailed,
            CapcatError::ContentFetch { .. } => ErrorKind::ContentFetch,
            CapcatError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            CapcatError::Validation { .. } => ErrorKind::Validation,
            CapcatError::FileSystem { .. } => ErrorKind::FileSystem,
            CapcatError::Parsing { .. } => ErrorKind::Parsing,
        }
    }

    /// Whether the retry executor should give this error another attempt.
    /// Non-retryable errors propagate on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidFeed => "invalid_feed",
            ErrorKind::ArticleDiscoveryFailed => "article_discovery_failed",
            ErrorKind::ContentFetch => "content_fetch_error",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Validation => "validation_error",
            ErrorKind::FileSystem => "filesystem_error",
            ErrorKind::Parsing => "parsing_error",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, CapcatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_timeout_are_retryable() {
        let e = CapcatError::Timeout {
            url: "https://example.com".into(),
            elapsed: Duration::from_secs(10),
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn validation_is_not_retryable() {
        let e = CapcatError::Validation {
            field: "rate_limit".into(),
            requirement: "must be > 0".into(),
        };
        assert!(!e.is_retryable());
    }
}
