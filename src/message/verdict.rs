//! Verdict types shared by both transports

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sha256::Sha256;
use crate::types::{Result, VerdictError};

/// Classification of submitted content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// No malicious content found
    Clean,
    /// Malicious content found
    Malicious,
    /// The service cannot tell without more information
    Unknown,
    /// Potentially unwanted program
    Pup,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Clean => "Clean",
            Self::Malicious => "Malicious",
            Self::Unknown => "Unknown",
            Self::Pup => "Pup",
        };
        f.write_str(s)
    }
}

/// One-time credential and endpoint for supplying full content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub token: String,
    pub url: String,
}

/// Answer to a single verdict request.
///
/// On the session this is the `VerdictResponse` frame as received; the HTTP
/// transport converts its reports into the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictResponse {
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub sha256: Option<String>,
    pub verdict: Verdict,
    #[serde(default)]
    pub detection: Option<String>,
    #[serde(default, alias = "fileType")]
    pub file_type: Option<String>,
    #[serde(default, alias = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_token: Option<String>,
    #[serde(default, rename = "url", skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
}

impl VerdictResponse {
    /// Whether a hash-only answer is complete enough to be final.
    ///
    /// Rejects Unknown, Malicious/Pup without a detection name, and answers
    /// lacking file or mime type (stale or partial cache entries).
    pub fn is_conclusive(&self) -> bool {
        let flagged_without_detection =
            matches!(self.verdict, Verdict::Malicious | Verdict::Pup) && self.detection.is_none();

        self.verdict != Verdict::Unknown
            && !flagged_without_detection
            && self.file_type.is_some()
            && self.mime_type.is_some()
    }

    /// An Unknown answer carrying any part of an upload ticket
    pub fn requests_upload(&self) -> bool {
        self.verdict == Verdict::Unknown && (self.upload_token.is_some() || self.upload_url.is_some())
    }

    /// The upload credential promised by an Unknown answer.
    ///
    /// Both token and URL must be present; anything less is a protocol violation.
    pub fn upload_ticket(&self) -> Result<UploadTicket> {
        match (&self.upload_token, &self.upload_url) {
            (Some(token), Some(url)) => Ok(UploadTicket {
                token: token.clone(),
                url: url.clone(),
            }),
            (None, None) => Err(VerdictError::server(
                "MissingUploadTicket",
                format!("verdict {} for {} carries no upload token or url", self.verdict, self.guid),
            )),
            (None, Some(_)) => Err(VerdictError::server(
                "MissingUploadTicket",
                format!("verdict for {} carries an upload url but no token", self.guid),
            )),
            (Some(_), None) => Err(VerdictError::server(
                "MissingUploadTicket",
                format!("verdict for {} carries an upload token but no url", self.guid),
            )),
        }
    }
}

/// Verdict returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictReport {
    pub sha256: Sha256,
    pub verdict: Verdict,
    pub detection: Option<String>,
    pub file_type: Option<String>,
    pub mime_type: Option<String>,
}

impl TryFrom<VerdictResponse> for VerdictReport {
    type Error = VerdictError;

    fn try_from(response: VerdictResponse) -> Result<Self> {
        let sha256 = match response.sha256.as_deref() {
            Some(raw) => Sha256::try_from(raw).map_err(|_| {
                VerdictError::server("InvalidMessage", format!("server sent malformed sha256 {:?}", raw))
            })?,
            None => {
                return Err(VerdictError::server(
                    "InvalidMessage",
                    format!("verdict for {} has no sha256", response.guid),
                ))
            }
        };

        Ok(Self {
            sha256,
            verdict: response.verdict,
            detection: response.detection,
            file_type: response.file_type,
            mime_type: response.mime_type,
        })
    }
}
