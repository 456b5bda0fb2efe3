//! Error types for Satellite API calls.

use thiserror::Error;

/// Result type alias for Satellite API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by a [`SatelliteApi`](super::SatelliteApi) implementation.
///
/// The `Display` output of each variant is what ends up in protocol messages
/// (`console` of host updates, `satellite_connection_error` of the completion),
/// so it is kept to the bare message.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request failed at the application level.
    #[error("{0}")]
    Request(String),

    /// The request could not be sent or no response was received.
    #[error("{message}")]
    Transport {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Satellite answered with an unexpected HTTP status.
    #[error("Satellite returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response from Satellite: {0}")]
    Decode(String),

    /// A call was made outside of an open session.
    #[error("No open Satellite session")]
    NoSession,
}

impl ApiError {
    /// Creates a new application-level request error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    /// Creates a new transport error with a source.
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport {
                message: err.to_string(),
                source: Some(Box::new(err)),
            }
        }
    }
}
