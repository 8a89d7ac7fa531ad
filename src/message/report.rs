//! HTTP API bodies (camelCase JSON)

use serde::{Deserialize, Serialize};

use super::verdict::{Verdict, VerdictResponse};
use crate::sha256::Sha256;

/// `GET /files/{sha256}/report` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub sha256: Sha256,
    pub verdict: Verdict,
    #[serde(default)]
    pub detection: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// `GET /urls/{id}/report` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlReport {
    pub sha256: Sha256,
    pub verdict: Verdict,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub detection: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// `POST /files` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysisStarted {
    pub sha256: Sha256,
}

/// `POST /urls` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlAnalysisRequest<'a> {
    pub url: &'a str,
    pub use_hash_lookup: bool,
}

/// `POST /urls` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlAnalysisStarted {
    pub id: String,
}

/// RFC 7807 problem body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemBody {
    #[serde(rename = "type")]
    pub problem_type: String,
    #[serde(default)]
    pub detail: String,
}

impl FileReport {
    pub fn into_response(self, guid: String) -> VerdictResponse {
        VerdictResponse {
            guid,
            sha256: Some(self.sha256.into()),
            verdict: self.verdict,
            detection: self.detection,
            file_type: self.file_type,
            mime_type: self.mime_type,
            upload_token: None,
            upload_url: None,
        }
    }
}

impl UrlReport {
    pub fn into_response(self, guid: String) -> VerdictResponse {
        VerdictResponse {
            guid,
            sha256: Some(self.sha256.into()),
            verdict: self.verdict,
            detection: self.detection,
            file_type: self.file_type,
            mime_type: self.mime_type,
            upload_token: None,
            upload_url: None,
        }
    }
}
