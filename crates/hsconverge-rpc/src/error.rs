//! Transport resolution error types.

use std::path::PathBuf;

use thiserror::Error;

/// A result type using `TransportError`.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while resolving or opening the service connection.
///
/// All of these are fatal: no reconciliation runs without a client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Neither the settings nor the environment name an endpoint.
    #[error("endpoint is not set: configure `endpoint` or HEADSCALE_ENDPOINT")]
    MissingEndpoint,

    /// The endpoint uses a scheme this client cannot dial.
    #[error("unsupported endpoint {endpoint:?}: {reason}")]
    UnsupportedEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A file named by an environment variable could not be read.
    #[error("failed to read {var} ({}): {source}", path.display())]
    ReadFile {
        /// The environment variable that named the file.
        var: &'static str,
        /// The file path.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// PEM material is missing the expected block or is malformed.
    #[error("invalid PEM for {what}: {reason}")]
    InvalidPem {
        /// Which setting carried the PEM.
        what: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Only one half of the client certificate/key pair was supplied.
    #[error("client certificate and client key must be configured together")]
    IncompleteClientIdentity,

    /// A boolean environment variable could not be parsed.
    #[error("{var} is not a valid boolean: {value:?}")]
    InvalidBool {
        /// The environment variable.
        var: &'static str,
        /// Its value.
        value: String,
    },

    /// The API key cannot be carried in a request header.
    #[error("api key contains characters not allowed in a header value")]
    InvalidApiKey,

    /// rustls rejected the TLS client configuration.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// The channel could not be configured.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl TransportError {
    /// Returns true if the error comes from the settings themselves rather
    /// than from the environment or the network stack.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingEndpoint
                | Self::UnsupportedEndpoint { .. }
                | Self::InvalidPem { .. }
                | Self::IncompleteClientIdentity
                | Self::InvalidBool { .. }
                | Self::InvalidApiKey
                | Self::Tls(_)
        )
    }
}
