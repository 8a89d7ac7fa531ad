//! Report polling over plain HTTP
//!
//! Report endpoints answer 201/202 while analysis is still running; the
//! client re-issues the same GET until a terminal status arrives. There is no
//! backoff and no retry bound here; callers bound the whole poll with their
//! own timeout.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::status::{error_from_response, http_failure};
use super::USER_AGENT;
use crate::auth::Authenticator;
use crate::message::{
    FileAnalysisStarted, FileReport, RequestFlags, UrlAnalysisRequest, UrlAnalysisStarted, UrlReport,
};
use crate::sha256::Sha256;
use crate::types::{Result, VerdictError};
use crate::upload::Content;

/// HTTP client for the report and submission endpoints
pub struct PollingClient {
    base_url: String,
    client: Client,
    authenticator: Arc<dyn Authenticator>,
}

impl PollingClient {
    pub fn new(base_url: &str, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| VerdictError::client("HttpClient", format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            authenticator,
        })
    }

    // ==================== Files ====================

    /// Poll `GET /files/{sha256}/report` until it is ready
    pub async fn file_report(
        &self,
        sha256: &Sha256,
        flags: &RequestFlags,
        request_id: Option<&str>,
        timeout: Duration,
    ) -> Result<FileReport> {
        let url = format!(
            "{}/files/{}/report?useCache={}&useHashLookup={}",
            self.base_url, sha256, flags.use_cache, flags.use_hash_lookup
        );
        self.poll(&url, request_id, timeout).await
    }

    /// Stream full content to `POST /files`; returns the hash to poll for
    pub async fn submit_stream(
        &self,
        content: Content,
        flags: &RequestFlags,
        request_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Sha256> {
        let (body, length) = content.into_body().await?;
        let url = format!("{}/files?useHashLookup={}", self.base_url, flags.use_hash_lookup);
        debug!("Submitting {} bytes to {}", length, url);

        let request = self
            .client
            .post(&url)
            .timeout(timeout)
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);
        let response = self.send(request, request_id, timeout).await?;
        let started: FileAnalysisStarted = parse_success(response).await?;
        Ok(started.sha256)
    }

    // ==================== URLs ====================

    /// Start a URL analysis via `POST /urls`; returns the report id
    pub async fn submit_url_analysis(
        &self,
        url: &str,
        flags: &RequestFlags,
        request_id: Option<&str>,
        timeout: Duration,
    ) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/urls", self.base_url))
            .timeout(timeout)
            .json(&UrlAnalysisRequest {
                url,
                use_hash_lookup: flags.use_hash_lookup,
            });
        let response = self.send(request, request_id, timeout).await?;
        let started: UrlAnalysisStarted = parse_success(response).await?;
        Ok(started.id)
    }

    /// Poll `GET /urls/{id}/report` until it is ready
    pub async fn url_report(&self, id: &str, request_id: Option<&str>, timeout: Duration) -> Result<UrlReport> {
        let url = format!("{}/urls/{}/report", self.base_url, urlencoding::encode(id));
        self.poll(&url, request_id, timeout).await
    }

    // ==================== Plumbing ====================

    async fn poll<T: DeserializeOwned>(&self, url: &str, request_id: Option<&str>, timeout: Duration) -> Result<T> {
        loop {
            let request = self.client.get(url).timeout(timeout);
            let response = self.send(request, request_id, timeout).await?;
            match response.status() {
                StatusCode::OK => return parse_body(response).await,
                StatusCode::CREATED | StatusCode::ACCEPTED => {
                    debug!("Report {} not ready ({}), polling again", url, response.status());
                }
                _ => return Err(error_from_response(response).await),
            }
        }
    }

    /// Attach a fresh bearer token and the trace header, then send
    async fn send(&self, request: RequestBuilder, request_id: Option<&str>, timeout: Duration) -> Result<Response> {
        let token = self.authenticator.get_token().await?;
        let mut request = request.bearer_auth(token);
        if let Some(id) = request_id {
            request = request.header("tracestate", format!("vaasrequestid={}", id));
        }
        request.send().await.map_err(|e| http_failure(e, timeout))
    }
}

async fn parse_success<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    parse_body(response).await
}

async fn parse_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| VerdictError::server("InvalidMessage", format!("Failed to read response body: {}", e)))?;
    serde_json::from_slice(&body)
        .map_err(|e| VerdictError::server("InvalidMessage", format!("Unexpected response body: {}", e)))
}
