//! Crate-wide error type and result alias.
//!
//! Variants follow the operational taxonomy of the service: upstream
//! transport failures, rate limiting, and server errors are retryable;
//! client errors, validation failures, and store conflicts are not.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-level failure talking to an upstream API (timeout, connect).
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Upstream returned HTTP 429.
    #[error("Upstream rate limited: {0}")]
    RateLimited(String),

    /// Upstream returned a 5xx status.
    #[error("Upstream server error ({status}): {message}")]
    UpstreamServer { status: u16, message: String },

    /// Upstream returned a non-429 4xx status. Never retried.
    #[error("Upstream client error ({status}): {message}")]
    UpstreamClient { status: u16, message: String },

    /// A record failed the ingest validity predicate.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Connection pool error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Unique-constraint violation; callers usually treat this as
    /// "another run already created the row".
    #[error("Store conflict: {0}")]
    Conflict(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Analyzer-local failure, isolated from sibling analyzers.
    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors the upstream client retries with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited(_) | Self::UpstreamServer { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Transport(err.to_string())
        } else {
            match err.status() {
                Some(status) if status.as_u16() == 429 => Self::RateLimited(err.to_string()),
                Some(status) if status.is_server_error() => Self::UpstreamServer {
                    status: status.as_u16(),
                    message: err.to_string(),
                },
                Some(status) if status.is_client_error() => Self::UpstreamClient {
                    status: status.as_u16(),
                    message: err.to_string(),
                },
                _ => Self::Transport(err.to_string()),
            }
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::Transport("timeout".into()).is_retryable());
        assert!(Error::RateLimited("429".into()).is_retryable());
        assert!(Error::UpstreamServer { status: 502, message: "bad gateway".into() }.is_retryable());

        assert!(!Error::UpstreamClient { status: 404, message: "not found".into() }.is_retryable());
        assert!(!Error::Validation("bad trade".into()).is_retryable());
        assert!(!Error::Conflict("unique".into()).is_retryable());
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            Box::new("UNIQUE constraint failed: alerts.dedup_key".to_string()),
        );
        assert!(matches!(Error::from(err), Error::Conflict(_)));
    }
}
