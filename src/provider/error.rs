//! Errors surfaced by cloud provider clients.

use thiserror::Error;

/// Failures reported by a [`super::CloudSession`] or [`super::CloudConnector`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// The addressed resource does not exist (HTTP 404 or empty lookup).
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind, for example `vpc`.
        kind: String,
        /// Identifier that was requested.
        id: String,
    },
    /// A polling wait expired before the resource reached its target status.
    #[error("timed out waiting for {kind} {id} to reach status {status}")]
    Timeout {
        /// Resource kind being polled.
        kind: String,
        /// Identifier being polled.
        id: String,
        /// Target status.
        status: String,
    },
    /// The resource entered a terminal failure status while being polled.
    #[error("{kind} {id} entered status {status}")]
    FailedStatus {
        /// Resource kind being polled.
        kind: String,
        /// Identifier being polled.
        id: String,
        /// Status reported by the provider.
        status: String,
    },
    /// The identity service rejected the credentials.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Provider response or local diagnostic.
        message: String,
    },
    /// The configured authentication method is not implemented by the client.
    #[error("authentication method {method} is not supported by this client")]
    UnsupportedAuth {
        /// Method name, for example `clouds.yaml`.
        method: String,
    },
    /// The provider answered with a non-success status.
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        /// Operation being performed.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },
    /// The request never reached the provider or the response was cut short.
    #[error("{operation} failed: {message}")]
    Transport {
        /// Operation being performed.
        operation: String,
        /// Transport error text.
        message: String,
    },
    /// A response body could not be decoded.
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        /// Operation whose response was malformed.
        operation: String,
        /// Decoder error text.
        message: String,
    },
    /// Instance address payload did not have the expected pool layout.
    #[error("unexpected address payload: {message}")]
    UnexpectedAddressShape {
        /// Decoder error text.
        message: String,
    },
}

impl ProviderError {
    /// Returns `true` when the error means the resource is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Shorthand for [`ProviderError::NotFound`].
    #[must_use]
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound {
            kind: kind.to_owned(),
            id: id.to_owned(),
        }
    }
}
