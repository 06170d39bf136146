//! Error taxonomy for the Stratus core.
//!
//! Only [`Error::ScopeViolation`] aborts a whole operation; everything else
//! degrades to partial results with per-item or per-group reporting so
//! callers can tell "no results" apart from "failed to search".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// The top-level error type for all Stratus operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A raw input record is missing required fields or is structurally
    /// malformed. Recovered locally: the record is skipped and reported.
    #[error("normalization failed: {reason}")]
    Normalization { reason: String },

    /// The cloud inventory collaborator failed for one resource type.
    /// Recovered at per-resource-type granularity.
    #[error("provider fetch failed for {resource_type}: {reason}")]
    Provider {
        resource_type: String,
        reason: String,
    },

    /// A lookup by id matched nothing.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A derived index name or session key would escape its scope key.
    /// Fatal — the operation aborts before any I/O.
    #[error("scope violation: {0}")]
    ScopeViolation(String),

    /// A fan-out group exceeded its deadline; that group returns empty.
    #[error("group {group} timed out after {timeout_ms}ms")]
    GroupTimeout { group: String, timeout_ms: u64 },

    /// The document-index collaborator failed.
    #[error("index store error: {0}")]
    Store(String),

    /// The ephemeral session store failed.
    #[error("session store error: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn normalization(reason: impl Into<String>) -> Self {
        Self::Normalization {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Normalization { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::ScopeViolation(_) => StatusCode::BAD_REQUEST,
            Error::Provider { .. } | Error::Store(_) | Error::Session(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_resource_type() {
        let err = Error::Provider {
            resource_type: "compute-instance".into(),
            reason: "credentials expired".into(),
        };
        assert!(err.to_string().contains("compute-instance"));
        assert!(err.to_string().contains("credentials expired"));
    }

    #[test]
    fn timeout_error_displays_group_and_deadline() {
        let err = Error::GroupTimeout {
            group: "memory".into(),
            timeout_ms: 2500,
        };
        assert!(err.to_string().contains("memory"));
        assert!(err.to_string().contains("2500"));
    }
}
