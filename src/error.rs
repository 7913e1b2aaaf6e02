//! Error type shared by the registrar, fixtures and the interception server.

use thiserror::Error;

/// Errors surfaced while building or serving stubs.
#[derive(Debug, Error)]
pub enum StubError {
    /// A static body could not be encoded as JSON.
    #[error("failed to encode response body as JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A fixture file is not valid YAML for the stub format.
    #[error("failed to parse stub fixture: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A full-URL matcher could not be parsed.
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A regex or glob path pattern failed to compile.
    #[error("invalid {kind} pattern {pattern:?}: {reason}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        reason: String,
    },

    /// A fixture stub failed validation.
    #[error("stub {stub}: {reason}")]
    Invalid { stub: String, reason: String },

    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The interception server could not bind its listener.
    #[error("failed to bind stub server: {0}")]
    Bind(#[source] std::io::Error),
}

pub type Result<T, E = StubError> = std::result::Result<T, E>;
