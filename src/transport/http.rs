use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{fresh_guid, PriorLookup, RequestContext, Subject, VerdictTransport};
use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::http::PollingClient;
use crate::message::VerdictResponse;
use crate::types::Result;
use crate::upload::Content;

/// Stateless transport over the HTTP report API
pub struct HttpTransport {
    polling: PollingClient,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        Ok(Self {
            polling: PollingClient::new(&config.url, authenticator)?,
        })
    }

    fn guid(ctx: &RequestContext) -> String {
        ctx.request_id.clone().unwrap_or_else(fresh_guid)
    }
}

#[async_trait]
impl VerdictTransport for HttpTransport {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn request_verdict(&self, subject: &Subject, ctx: &RequestContext) -> Result<VerdictResponse> {
        let request_id = ctx.request_id.as_deref();
        match subject {
            Subject::Sha256(sha256) => {
                let report = self
                    .polling
                    .file_report(sha256, &ctx.flags, request_id, ctx.verdict_timeout)
                    .await?;
                Ok(report.into_response(Self::guid(ctx)))
            }
            Subject::Url(url) => {
                let id = self
                    .polling
                    .submit_url_analysis(url, &ctx.flags, request_id, ctx.verdict_timeout)
                    .await?;
                debug!("URL analysis {} started for {}", id, url);
                let report = self.polling.url_report(&id, request_id, ctx.verdict_timeout).await?;
                Ok(report.into_response(Self::guid(ctx)))
            }
        }
    }

    async fn submit_content(
        &self,
        content: Content,
        _prior: PriorLookup,
        ctx: &RequestContext,
    ) -> Result<VerdictResponse> {
        let request_id = ctx.request_id.as_deref();
        let sha256 = self
            .polling
            .submit_stream(content, &ctx.flags, request_id, ctx.upload_timeout)
            .await?;
        debug!("Content accepted as {}", sha256);

        let report = self
            .polling
            .file_report(&sha256, &ctx.flags, request_id, ctx.upload_timeout)
            .await?;
        Ok(report.into_response(Self::guid(ctx)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
