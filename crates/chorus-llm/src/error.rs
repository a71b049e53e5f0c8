use chorus_core::HttpError;
use http::StatusCode;
use thiserror::Error;

use crate::parser::FrameError;

/// Errors raised while relaying a completion request
#[derive(Debug, Error)]
pub enum LlmError {
    /// The vendor answered with a non-success status
    #[error("{message} ({status})")]
    Provider { status: StatusCode, message: String },

    /// Provider identifier is not in the registry
    #[error("unknown provider '{0}'")]
    NotFound(String),

    /// Registry cannot build an adapter for this identifier
    #[error("unsupported provider '{0}'")]
    UnsupportedProvider(String),

    /// Caller sent an unusable request (missing key, no messages)
    #[error("{0}")]
    BadRequest(String),

    /// Vendor payload was malformed or the vendor reported a stream error
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Network failure or premature end of the response body
    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether the error was detected before any network call
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::UnsupportedProvider(_) | Self::BadRequest(_)
        )
    }

    /// Message without the category prefix
    ///
    /// Used for in-band error records, which carry the category separately
    /// as their `type`.
    pub fn bare_message(&self) -> String {
        match self {
            Self::Upstream(message) | Self::Transport(message) => message.clone(),
            other => other.client_message(),
        }
    }
}

impl From<FrameError> for LlmError {
    fn from(error: FrameError) -> Self {
        match error.error_type.as_deref() {
            Some("transport_error") => Self::Transport(error.message),
            _ => Self::Upstream(error.message),
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Provider { status, .. } => *status,
            Self::NotFound(_) | Self::UnsupportedProvider(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Provider { .. } => "provider_error",
            Self::NotFound(_) | Self::UnsupportedProvider(_) => "not_found_error",
            Self::BadRequest(_) => "invalid_request_error",
            Self::Upstream(_) => "upstream_error",
            Self::Transport(_) => "transport_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Provider { message, .. } => message.clone(),
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}
