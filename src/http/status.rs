//! HTTP status and transport failure mapping

use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::message::ProblemBody;
use crate::types::{ProblemDetails, ProblemKind, VerdictError};

/// Map a reqwest failure that produced no status
pub(crate) fn http_failure(err: reqwest::Error, budget: Duration) -> VerdictError {
    if err.is_timeout() {
        VerdictError::Timeout(budget)
    } else if err.is_builder() {
        VerdictError::client("InvalidRequest", err.to_string())
    } else if err.is_decode() {
        VerdictError::server("InvalidMessage", err.to_string())
    } else {
        VerdictError::ConnectionClosed(err.to_string())
    }
}

/// Consume a non-success response into its error
pub(crate) async fn error_from_response(response: Response) -> VerdictError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_for_status(status, &body)
}

/// 401 → Authentication, 5xx → Server, anything else → Client.
///
/// RFC 7807 bodies supply type and detail; other bodies fall back to the
/// status line.
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> VerdictError {
    let kind = if status == StatusCode::UNAUTHORIZED {
        ProblemKind::AuthError
    } else if status.is_server_error() {
        ProblemKind::ServerError
    } else {
        ProblemKind::ClientError
    };

    let problem = match serde_json::from_str::<ProblemBody>(body) {
        Ok(reported) => {
            let detail = if reported.detail.is_empty() {
                status.to_string()
            } else {
                reported.detail
            };
            ProblemDetails::new(kind, reported.problem_type, detail)
        }
        Err(_) => ProblemDetails::new(kind, default_problem_type(kind), status.to_string()),
    };

    VerdictError::from_problem(problem)
}

fn default_problem_type(kind: ProblemKind) -> &'static str {
    match kind {
        ProblemKind::AuthError => "VaasAuthenticationException",
        ProblemKind::ClientError => "VaasClientException",
        ProblemKind::ServerError => "VaasServerException",
    }
}
