//! Error types for locus-core.
//!
//! None of the clients retry. A failed call surfaces as one of these errors
//! and the caller (a scheduled job or the HTTP entry point) decides whether
//! to log it or report it.
//!
//! | Error | Typical cause |
//! |-------|---------------|
//! | [`Error::Request`] | Network failure, timeout, TLS error |
//! | [`Error::Api`] | Non-success HTTP status from a service |
//! | [`Error::InvalidResponse`] | Body did not match the expected schema |
//! | [`Error::MissingCredential`] | API key or user not configured |
//! | [`Error::EmptyReply`] | Text generation returned no content |

use thiserror::Error;

/// Errors that can occur when talking to external services.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("{service} returned HTTP {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response from {service}: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    /// A required credential is not configured.
    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// Text generation returned an empty message.
    #[error("Text generation returned an empty message")]
    EmptyReply,

    /// Failed to parse a value in a response.
    #[error(transparent)]
    Parse(#[from] locus_types::ParseError),

    /// Failure injected by a mock implementation.
    #[error("Mock failure: {0}")]
    Mock(String),
}

impl Error {
    pub(crate) fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidResponse {
            service,
            message: message.into(),
        }
    }
}

/// Result type for locus-core operations.
pub type Result<T> = std::result::Result<T, Error>;
