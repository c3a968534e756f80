//! Error types for the x402-fetch library

use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for x402-fetch operations
pub type Result<T> = std::result::Result<T, X402Error>;

/// Why a network send failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCause {
    /// The attempt exceeded its timeout and was aborted
    Timeout,
    /// The upstream answered with a gateway timeout status (504, 524, ...)
    UpstreamTimeout { status: StatusCode },
    /// The connection could not be established or was reset
    Connection { message: String },
    /// Any other transport failure
    Other { message: String },
}

impl NetworkCause {
    /// Classify a transport error produced by reqwest
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else {
            Self::Other {
                message: err.to_string(),
            }
        }
    }

    /// Whether the retry policy may try again after this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::UpstreamTimeout { .. })
    }
}

impl fmt::Display for NetworkCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::UpstreamTimeout { status } => write!(f, "upstream timeout ({})", status.as_u16()),
            Self::Connection { message } => write!(f, "connection failed: {}", message),
            Self::Other { message } => write!(f, "{}", message),
        }
    }
}

/// Errors a [`Signer`](crate::signer::Signer) may report
#[derive(Error, Debug)]
pub enum SignerError {
    /// The account cannot cover the requested amount
    #[error("Insufficient funds: {required} requested, {available} allowed")]
    InsufficientFunds { required: String, available: String },

    /// Constructing or signing the authorization failed
    #[error("Signing failed: {message}")]
    Signing { message: String },

    /// None of the offered payment options can be satisfied by this signer
    #[error("No acceptable payment requirement: {message}")]
    NoAcceptableRequirement { message: String },
}

impl SignerError {
    /// Create a signing error
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Create a no-acceptable-requirement error
    pub fn no_acceptable_requirement(message: impl Into<String>) -> Self {
        Self::NoAcceptableRequirement {
            message: message.into(),
        }
    }
}

/// Main error type for x402-fetch operations
#[derive(Error, Debug)]
pub enum X402Error {
    /// Transport failure, possibly after exhausting the retry budget
    #[error("Network error after {attempts} attempt(s): {cause}")]
    Network {
        cause: NetworkCause,
        /// Network sends performed by the whole call, unpaid and paid
        attempts: u32,
        /// Backoff delays slept before each retry of the failing send, in order
        delays: Vec<Duration>,
    },

    /// The remote service broke the x402 contract
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The signer refused or failed to authorize a payment
    #[error("Authorization error: {0}")]
    Authorization(#[from] SignerError),

    /// Non-402, non-success status
    #[error("Upstream error: {} {body}", .status.as_u16())]
    Upstream { status: StatusCode, body: String },

    /// Successful status but the body did not parse
    #[error("Body parse error: {message}")]
    BodyParse { message: String },

    /// The payment-response header could not be decoded
    #[error("Receipt decode error: {message}")]
    ReceiptDecode { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 encoding/decoding error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// HTTP client error not tied to a send, such as building the client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl X402Error {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a body parse error
    pub fn body_parse(message: impl Into<String>) -> Self {
        Self::BodyParse {
            message: message.into(),
        }
    }

    /// Create a receipt decode error
    pub fn receipt_decode(message: impl Into<String>) -> Self {
        Self::ReceiptDecode {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error may be retried by the retry policy
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { cause, .. } => cause.is_transient(),
            _ => false,
        }
    }

    /// The network cause, if this is a network error
    pub fn network_cause(&self) -> Option<&NetworkCause> {
        match self {
            Self::Network { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_causes() {
        assert!(NetworkCause::Timeout.is_transient());
        assert!(NetworkCause::UpstreamTimeout {
            status: StatusCode::GATEWAY_TIMEOUT
        }
        .is_transient());
        assert!(!NetworkCause::Connection {
            message: "refused".into()
        }
        .is_transient());
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        let err = X402Error::Network {
            cause: NetworkCause::Timeout,
            attempts: 1,
            delays: vec![],
        };
        assert!(err.is_transient());
        assert!(!X402Error::protocol("bad 402 body").is_transient());
        assert!(!X402Error::Upstream {
            status: StatusCode::BAD_REQUEST,
            body: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_upstream_display_includes_status_and_body() {
        let err = X402Error::Upstream {
            status: StatusCode::NOT_FOUND,
            body: "no such route".into(),
        };
        assert_eq!(err.to_string(), "Upstream error: 404 no such route");
    }
}
