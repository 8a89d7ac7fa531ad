//! Content upload for deferred analysis
//!
//! When the service answers Unknown it hands out a one-time upload token and
//! URL. The caller registers its wait for the deferred verdict first, then
//! calls [`UploadCoordinator::upload`].

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use tracing::{debug, info};

use crate::http::status::{error_from_response, http_failure};
use crate::http::USER_AGENT;
use crate::types::{Result, VerdictError};

/// Full content of a subject, in one of the shapes callers hand us
pub enum Content {
    Buffer(Bytes),
    File(PathBuf),
    /// Caller-supplied byte stream of known length
    Stream { body: Body, length: u64 },
}

impl Content {
    /// Wrap a fallible byte stream. The stream is not buffered.
    pub fn stream<S>(stream: S, length: u64) -> Self
    where
        S: futures::TryStream + Send + Sync + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        Self::Stream {
            body: Body::wrap_stream(stream),
            length,
        }
    }

    /// Resolve into a request body and its exact length
    pub(crate) async fn into_body(self) -> Result<(Body, u64)> {
        match self {
            Self::Buffer(data) => {
                let length = data.len() as u64;
                Ok((Body::from(data), length))
            }
            Self::File(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let length = file.metadata().await?.len();
                Ok((Body::from(file), length))
            }
            Self::Stream { body, length } => Ok((body, length)),
        }
    }
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(data) => write!(f, "Buffer({} bytes)", data.len()),
            Self::File(path) => write!(f, "File({})", path.display()),
            Self::Stream { length, .. } => write!(f, "Stream({} bytes)", length),
        }
    }
}

/// Performs authenticated PUTs to upload URLs
pub struct UploadCoordinator {
    client: Client,
    timeout: Duration,
}

impl UploadCoordinator {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| VerdictError::client("HttpClient", format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// PUT `content` to `url`, authorizing with the raw upload `token`
    pub async fn upload(&self, token: &str, url: &str, content: Content) -> Result<()> {
        let (body, length) = content.into_body().await?;
        info!("Uploading {} bytes to {}", length, url);

        let response = self
            .client
            .put(url)
            .timeout(self.timeout)
            .header(AUTHORIZATION, token)
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| http_failure(e, self.timeout))?;

        if response.status().is_success() {
            debug!("Upload to {} accepted with {}", url, response.status());
            return Ok(());
        }
        Err(error_from_response(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_sends_raw_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .and(header("Authorization", "t"))
            .and(header("Content-Type", "application/octet-stream"))
            .and(header("Content-Length", "5"))
            .and(body_bytes(b"hello".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = UploadCoordinator::new(Duration::from_secs(5)).unwrap();
        uploader
            .upload("t", &format!("{}/upload", server.uri()), Content::Buffer(Bytes::from_static(b"hello")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_file_content() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("Content-Length", "3"))
            .and(body_bytes(b"abc".to_vec()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();

        let uploader = UploadCoordinator::new(Duration::from_secs(5)).unwrap();
        uploader
            .upload("t", &server.uri(), Content::File(file.path().to_path_buf()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/401"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/413"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;
        Mock::given(path("/503"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let uploader = UploadCoordinator::new(Duration::from_secs(5)).unwrap();
        let put = |p: &str| format!("{}{}", server.uri(), p);
        let one_byte = || Content::Buffer(Bytes::from_static(b"x"));

        assert!(matches!(
            uploader.upload("t", &put("/401"), one_byte()).await,
            Err(VerdictError::Authentication(_))
        ));
        assert!(matches!(
            uploader.upload("t", &put("/413"), one_byte()).await,
            Err(VerdictError::Client(_))
        ));
        assert!(matches!(
            uploader.upload("t", &put("/503"), one_byte()).await,
            Err(VerdictError::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let uploader = UploadCoordinator::new(Duration::from_millis(100)).unwrap();
        let err = uploader
            .upload("t", &server.uri(), Content::Buffer(Bytes::from_static(b"x")))
            .await
            .unwrap_err();
        assert!(matches!(err, VerdictError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_client_error() {
        let uploader = UploadCoordinator::new(Duration::from_secs(1)).unwrap();
        let err = uploader
            .upload("t", "http://127.0.0.1:9/", Content::File("/no/such/file".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, VerdictError::Client(_)));
    }
}
