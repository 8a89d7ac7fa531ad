//! Session wire protocol
//!
//! Frames are JSON text messages discriminated by a `kind` field:
//!
//! - `AuthRequest{token}` → `AuthResponse{success, session_id, text}`
//! - `VerdictRequest{sha256}` / `VerdictRequestForUrl{url}` /
//!   `VerdictRequestForStream{}` → `VerdictResponse{guid, ...}` or `Error{guid, ...}`

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::report::ProblemBody;
use super::verdict::VerdictResponse;
use crate::types::{ProblemDetails, Result};

/// Every frame exchanged over the session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Frame {
    AuthRequest(AuthRequest),
    AuthResponse(AuthResponse),
    VerdictRequest(VerdictRequest),
    VerdictRequestForUrl(VerdictRequestForUrl),
    VerdictRequestForStream(VerdictRequestForStream),
    VerdictResponse(VerdictResponse),
    Error(ErrorFrame),
    /// Any kind this client does not know
    #[serde(other)]
    Unsupported,
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Request-level flags shared by all verdict request frames
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFlags {
    pub use_cache: bool,
    pub use_hash_lookup: bool,
    pub attributes: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRequest {
    pub sha256: String,
    pub guid: String,
    pub session_id: String,
    pub use_hash_lookup: bool,
    pub use_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict_request_attributes: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRequestForUrl {
    pub url: String,
    pub guid: String,
    pub session_id: String,
    pub use_hash_lookup: bool,
    pub use_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict_request_attributes: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRequestForStream {
    pub guid: String,
    pub session_id: String,
    pub use_hash_lookup: bool,
    pub use_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict_request_attributes: Option<HashMap<String, String>>,
}

impl VerdictRequest {
    pub fn new(sha256: &str, guid: String, session_id: String, flags: &RequestFlags) -> Self {
        Self {
            sha256: sha256.to_string(),
            guid,
            session_id,
            use_hash_lookup: flags.use_hash_lookup,
            use_cache: flags.use_cache,
            verdict_request_attributes: flags.attributes.clone(),
        }
    }
}

impl VerdictRequestForUrl {
    pub fn new(url: &str, guid: String, session_id: String, flags: &RequestFlags) -> Self {
        Self {
            url: url.to_string(),
            guid,
            session_id,
            use_hash_lookup: flags.use_hash_lookup,
            use_cache: flags.use_cache,
            verdict_request_attributes: flags.attributes.clone(),
        }
    }
}

impl VerdictRequestForStream {
    pub fn new(guid: String, session_id: String, flags: &RequestFlags) -> Self {
        Self {
            guid,
            session_id,
            use_hash_lookup: flags.use_hash_lookup,
            use_cache: flags.use_cache,
            verdict_request_attributes: flags.attributes.clone(),
        }
    }
}

/// Server-pushed failure for a request.
///
/// Newer gateways send `problem_details`; older ones only `type` and `text`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_details: Option<ProblemBody>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ErrorFrame {
    pub fn problem(&self) -> ProblemDetails {
        match &self.problem_details {
            Some(body) => ProblemDetails::from_reported(body.problem_type.clone(), body.detail.clone()),
            None => ProblemDetails::from_reported(
                self.error_type.clone().unwrap_or_else(|| "VaasServerException".to_string()),
                self.text.clone().unwrap_or_default(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Verdict;
    use crate::types::ProblemKind;

    #[test]
    fn test_verdict_request_wire_shape() {
        let flags = RequestFlags {
            use_cache: true,
            use_hash_lookup: false,
            attributes: None,
        };
        let frame = Frame::VerdictRequest(VerdictRequest::new("ab", "g-1".into(), "s-1".into(), &flags));
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();

        assert_eq!(json["kind"], "VerdictRequest");
        assert_eq!(json["sha256"], "ab");
        assert_eq!(json["guid"], "g-1");
        assert_eq!(json["session_id"], "s-1");
        assert_eq!(json["use_cache"], true);
        assert_eq!(json["use_hash_lookup"], false);
        assert!(json.get("verdict_request_attributes").is_none());
    }

    #[test]
    fn test_attributes_are_sent_when_present() {
        let mut attrs = HashMap::new();
        attrs.insert("tenant".to_string(), "acme".to_string());
        let flags = RequestFlags {
            use_cache: false,
            use_hash_lookup: true,
            attributes: Some(attrs),
        };
        let frame = Frame::VerdictRequestForStream(VerdictRequestForStream::new("g".into(), "s".into(), &flags));
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["kind"], "VerdictRequestForStream");
        assert_eq!(json["verdict_request_attributes"]["tenant"], "acme");
    }

    #[test]
    fn test_parse_verdict_response() {
        let raw = r#"{"kind":"VerdictResponse","guid":"g","sha256":"aa","verdict":"Unknown",
            "upload_token":"t","url":"https://u"}"#;
        match Frame::parse(raw).unwrap() {
            Frame::VerdictResponse(resp) => {
                assert_eq!(resp.guid, "g");
                assert_eq!(resp.verdict, Verdict::Unknown);
                assert_eq!(resp.upload_token.as_deref(), Some("t"));
                assert_eq!(resp.upload_url.as_deref(), Some("https://u"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_auth_response() {
        let raw = r#"{"kind":"AuthResponse","success":true,"session_id":"s-9","text":""}"#;
        match Frame::parse(raw).unwrap() {
            Frame::AuthResponse(resp) => {
                assert!(resp.success);
                assert_eq!(resp.session_id.as_deref(), Some("s-9"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        assert!(matches!(
            Frame::parse(r#"{"kind":"Ping","guid":"g"}"#).unwrap(),
            Frame::Unsupported
        ));
    }

    #[test]
    fn test_error_frame_problem_details() {
        let raw = r#"{"kind":"Error","guid":"g","problem_details":{"type":"VaasClientException","detail":"bad"}}"#;
        match Frame::parse(raw).unwrap() {
            Frame::Error(e) => {
                assert_eq!(e.guid.as_deref(), Some("g"));
                let problem = e.problem();
                assert_eq!(problem.kind, ProblemKind::ClientError);
                assert_eq!(problem.detail, "bad");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_legacy_error_frame() {
        let raw = r#"{"kind":"Error","type":"InternalError","text":"oops"}"#;
        match Frame::parse(raw).unwrap() {
            Frame::Error(e) => {
                assert!(e.guid.is_none());
                let problem = e.problem();
                assert_eq!(problem.kind, ProblemKind::ServerError);
                assert_eq!(problem.problem_type, "InternalError");
                assert_eq!(problem.detail, "oops");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }
}
