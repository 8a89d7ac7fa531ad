//! Public verdict surface
//!
//! [`VerdictResolver`] validates input, hashes local content, decides whether
//! a hash answer is good enough or the full content must be supplied, and
//! bounds every call with the configured timeouts.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::message::{RequestFlags, VerdictReport, VerdictResponse};
use crate::sha256::Sha256;
use crate::transport::{self, PriorLookup, RequestContext, Subject, VerdictTransport};
use crate::types::{Result, VerdictError};
use crate::upload::Content;

/// Per-call overrides of the client defaults
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub use_cache: Option<bool>,
    pub use_hash_lookup: Option<bool>,
    /// Replaces the verdict timeout for this call
    pub timeout: Option<Duration>,
    /// Correlation id to use instead of a generated one
    pub request_id: Option<String>,
    pub attributes: Option<HashMap<String, String>>,
}

impl RequestOptions {
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_hash_lookup(mut self, enabled: bool) -> Self {
        self.use_hash_lookup = Some(enabled);
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = Some(enabled);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Copy for the `index`-th item of a list call
    fn for_item(&self, index: usize) -> Self {
        let mut options = self.clone();
        options.request_id = self.request_id.as_ref().map(|id| format!("{}-{}", id, index));
        options
    }
}

/// Outcome of the hash lookup that precedes a content submission
enum Lookup {
    Final(VerdictResponse),
    Inconclusive(VerdictResponse),
    Rejected,
}

pub struct VerdictResolver {
    transport: Box<dyn VerdictTransport>,
    config: ClientConfig,
}

impl VerdictResolver {
    /// Resolver over the transport selected by `config.transport`
    pub fn new(config: ClientConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let transport = transport::from_config(&config, authenticator)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ClientConfig, transport: Box<dyn VerdictTransport>) -> Self {
        Self { transport, config }
    }

    /// Open the channel now instead of on the first request
    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn close(&self) -> Result<()> {
        info!("Closing verdict resolver");
        self.transport.close().await
    }

    fn context(&self, options: &RequestOptions) -> RequestContext {
        RequestContext {
            request_id: options.request_id.clone(),
            flags: RequestFlags {
                use_cache: options.use_cache.unwrap_or(self.config.use_cache),
                use_hash_lookup: options.use_hash_lookup.unwrap_or(self.config.use_hash_lookup),
                attributes: options.attributes.clone(),
            },
            verdict_timeout: options.timeout.unwrap_or(self.config.verdict_timeout),
            upload_timeout: self.config.upload_timeout,
        }
    }

    // ==================== Single subjects ====================

    /// Verdict for a known hash. Unknown is a valid answer here.
    pub async fn for_sha256(&self, sha256: &str, options: &RequestOptions) -> Result<VerdictReport> {
        let sha256 = Sha256::try_from(sha256)?;
        let ctx = self.context(options);
        let subject = Subject::Sha256(sha256.clone());
        let response = bounded(ctx.verdict_timeout, self.transport.request_verdict(&subject, &ctx)).await?;
        finish(response, Some(&sha256))
    }

    pub async fn for_buffer(&self, data: impl Into<Bytes>, options: &RequestOptions) -> Result<VerdictReport> {
        let data = data.into();
        let sha256 = Sha256::digest(&data);
        self.for_content(sha256, Content::Buffer(data), options).await
    }

    pub async fn for_file(&self, path: impl AsRef<Path>, options: &RequestOptions) -> Result<VerdictReport> {
        let path = path.as_ref();
        let sha256 = Sha256::hash_file(path).await?;
        debug!("{} hashed to {}", path.display(), sha256);
        self.for_content(sha256, Content::File(path.to_path_buf()), options).await
    }

    /// Verdict for a byte stream of known length. Always submits the content.
    pub async fn for_stream<S>(&self, stream: S, length: u64, options: &RequestOptions) -> Result<VerdictReport>
    where
        S: futures::TryStream + Send + Sync + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        let ctx = self.context(options);
        let content = Content::stream(stream, length);
        let response = bounded(ctx.upload_timeout, self.transport.submit_content(content, PriorLookup::Skipped, &ctx)).await?;
        finish(response, None)
    }

    pub async fn for_url(&self, url: &str, options: &RequestOptions) -> Result<VerdictReport> {
        validate_url(url)?;
        let ctx = self.context(options);
        let subject = Subject::Url(url.to_string());
        let response = bounded(ctx.verdict_timeout, self.transport.request_verdict(&subject, &ctx)).await?;
        finish(response, None)
    }

    async fn for_content(&self, sha256: Sha256, content: Content, options: &RequestOptions) -> Result<VerdictReport> {
        let ctx = self.context(options);

        let prior = if ctx.flags.use_hash_lookup {
            match self.lookup(&sha256, &ctx).await? {
                Lookup::Final(response) => return finish(response, Some(&sha256)),
                Lookup::Inconclusive(response) => PriorLookup::Answered(response),
                Lookup::Rejected => PriorLookup::Rejected,
            }
        } else {
            PriorLookup::Skipped
        };

        let response = bounded(ctx.upload_timeout, self.transport.submit_content(content, prior, &ctx)).await?;
        finish(response, Some(&sha256))
    }

    async fn lookup(&self, sha256: &Sha256, ctx: &RequestContext) -> Result<Lookup> {
        let subject = Subject::Sha256(sha256.clone());
        match bounded(ctx.verdict_timeout, self.transport.request_verdict(&subject, ctx)).await {
            Ok(response) if response.is_conclusive() => Ok(Lookup::Final(response)),
            Ok(response) => {
                debug!("Hash answer for {} is {}, submitting content", sha256, response.verdict);
                Ok(Lookup::Inconclusive(response))
            }
            Err(e) if e.is_service_rejection() => {
                debug!("Hash lookup for {} failed ({}), submitting content", sha256, e);
                Ok(Lookup::Rejected)
            }
            Err(e) => Err(e),
        }
    }

    // ==================== Lists ====================

    /// Verdicts for many hashes, concurrently, in input order
    pub async fn for_sha256_list<S: AsRef<str>>(
        &self,
        hashes: &[S],
        options: &RequestOptions,
    ) -> Vec<Result<VerdictReport>> {
        let items = hashes.iter().enumerate().map(|(i, sha256)| {
            let options = options.for_item(i);
            async move { self.for_sha256(sha256.as_ref(), &options).await }
        });
        join_all(items).await
    }

    pub async fn for_file_list<P: AsRef<Path>>(&self, paths: &[P], options: &RequestOptions) -> Vec<Result<VerdictReport>> {
        let items = paths.iter().enumerate().map(|(i, path)| {
            let options = options.for_item(i);
            async move { self.for_file(path, &options).await }
        });
        join_all(items).await
    }

    pub async fn for_url_list<S: AsRef<str>>(&self, urls: &[S], options: &RequestOptions) -> Vec<Result<VerdictReport>> {
        let items = urls.iter().enumerate().map(|(i, url)| {
            let options = options.for_item(i);
            async move { self.for_url(url.as_ref(), &options).await }
        });
        join_all(items).await
    }
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| VerdictError::Timeout(limit))?
}

/// Turn a wire answer into the caller-facing report, filling in the hash we
/// already know when the service omits it
fn finish(mut response: VerdictResponse, known: Option<&Sha256>) -> Result<VerdictReport> {
    if response.sha256.is_none() {
        response.sha256 = known.map(|sha256| sha256.to_string());
    }
    VerdictReport::try_from(response)
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| VerdictError::client("InvalidUrl", format!("{:?} is not a URL: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(VerdictError::client(
            "InvalidUrl",
            format!("unsupported URL scheme {:?} in {:?}", other, url),
        )),
    }
}
