//! Error types for the verdict client
//!
//! Every public operation fails with exactly one [`VerdictError`] variant.
//! Client, server and authentication failures carry the [`ProblemDetails`]
//! reported by the service (or synthesized locally for protocol violations).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which side of the exchange a problem is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemKind {
    ClientError,
    ServerError,
    AuthError,
}

/// Problem description as reported by the verdict service (RFC 7807 shape)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemDetails {
    pub kind: ProblemKind,
    /// Problem type, e.g. `VaasClientException`
    pub problem_type: String,
    pub detail: String,
}

impl ProblemDetails {
    pub fn new(kind: ProblemKind, problem_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            problem_type: problem_type.into(),
            detail: detail.into(),
        }
    }

    /// Classify a problem type string reported inside an `Error` frame.
    ///
    /// Unrecognised types are attributed to the server.
    pub fn from_reported(problem_type: impl Into<String>, detail: impl Into<String>) -> Self {
        let problem_type = problem_type.into();
        let kind = if problem_type.contains("Authentication") || problem_type.contains("Unauthorized") {
            ProblemKind::AuthError
        } else if problem_type.contains("Client") {
            ProblemKind::ClientError
        } else {
            ProblemKind::ServerError
        };
        Self::new(kind, problem_type, detail)
    }
}

impl fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.problem_type, self.detail)
    }
}

/// Main error type for verdict operations
#[derive(Debug, thiserror::Error)]
pub enum VerdictError {
    #[error("Authentication failed: {0}")]
    Authentication(ProblemDetails),

    #[error("Client error: {0}")]
    Client(ProblemDetails),

    #[error("Server error: {0}")]
    Server(ProblemDetails),

    #[error("No verdict within {0:?}")]
    Timeout(Duration),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
}

impl VerdictError {
    /// Pick the variant matching the problem's kind
    pub fn from_problem(problem: ProblemDetails) -> Self {
        match problem.kind {
            ProblemKind::ClientError => Self::Client(problem),
            ProblemKind::ServerError => Self::Server(problem),
            ProblemKind::AuthError => Self::Authentication(problem),
        }
    }

    pub fn client(problem_type: &str, detail: impl Into<String>) -> Self {
        Self::Client(ProblemDetails::new(ProblemKind::ClientError, problem_type, detail))
    }

    pub fn server(problem_type: &str, detail: impl Into<String>) -> Self {
        Self::Server(ProblemDetails::new(ProblemKind::ServerError, problem_type, detail))
    }

    pub fn authentication(problem_type: &str, detail: impl Into<String>) -> Self {
        Self::Authentication(ProblemDetails::new(ProblemKind::AuthError, problem_type, detail))
    }

    /// The service-reported problem, if this failure carries one
    pub fn problem(&self) -> Option<&ProblemDetails> {
        match self {
            Self::Authentication(p) | Self::Client(p) | Self::Server(p) => Some(p),
            _ => None,
        }
    }

    /// Whether a hash-only lookup failing this way may fall through to a
    /// full content submission
    pub fn is_service_rejection(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Client(_) | Self::Server(_))
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for VerdictError {
    fn from(err: std::io::Error) -> Self {
        Self::client("IoError", err.to_string())
    }
}

impl From<serde_json::Error> for VerdictError {
    fn from(err: serde_json::Error) -> Self {
        Self::server("InvalidMessage", format!("JSON error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VerdictError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::ConnectionClosed(err.to_string())
    }
}

/// Result type alias for verdict operations
pub type Result<T> = std::result::Result<T, VerdictError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_problem_picks_variant() {
        let err = VerdictError::from_problem(ProblemDetails::new(ProblemKind::AuthError, "t", "d"));
        assert!(matches!(err, VerdictError::Authentication(_)));

        let err = VerdictError::from_problem(ProblemDetails::new(ProblemKind::ClientError, "t", "d"));
        assert!(matches!(err, VerdictError::Client(_)));

        let err = VerdictError::from_problem(ProblemDetails::new(ProblemKind::ServerError, "t", "d"));
        assert!(matches!(err, VerdictError::Server(_)));
    }

    #[test]
    fn test_reported_problem_classification() {
        assert_eq!(
            ProblemDetails::from_reported("VaasClientException", "bad hash").kind,
            ProblemKind::ClientError
        );
        assert_eq!(
            ProblemDetails::from_reported("VaasAuthenticationException", "expired").kind,
            ProblemKind::AuthError
        );
        assert_eq!(
            ProblemDetails::from_reported("VaasServerException", "boom").kind,
            ProblemKind::ServerError
        );
        assert_eq!(
            ProblemDetails::from_reported("SomethingElse", "?").kind,
            ProblemKind::ServerError
        );
    }

    #[test]
    fn test_io_error_is_client_side() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.bin");
        let err: VerdictError = io.into();
        assert!(matches!(err, VerdictError::Client(ref p) if p.problem_type == "IoError"));
        assert!(err.is_service_rejection());
    }

    #[test]
    fn test_display_includes_problem() {
        let err = VerdictError::client("VaasClientException", "Invalid SHA256");
        assert_eq!(err.to_string(), "Client error: VaasClientException - Invalid SHA256");
    }
}
