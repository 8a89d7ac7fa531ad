use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{fresh_guid, PriorLookup, RequestContext, Subject, VerdictTransport};
use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::correlation::CorrelationTable;
use crate::message::{Frame, Verdict, VerdictRequest, VerdictRequestForStream, VerdictRequestForUrl, VerdictResponse};
use crate::session::{SessionChannel, SessionOptions, SessionState};
use crate::types::{Result, VerdictError};
use crate::upload::{Content, UploadCoordinator};

/// Transport multiplexing every request over one WebSocket session.
///
/// The session is opened on first use (or by `connect`) and is not reopened
/// once closed.
pub struct SessionTransport {
    table: Arc<CorrelationTable>,
    channel: SessionChannel,
    uploader: UploadCoordinator,
    authenticator: Arc<dyn Authenticator>,
    connect_lock: Mutex<()>,
}

impl SessionTransport {
    pub fn new(config: &ClientConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let table = CorrelationTable::new();
        let channel = SessionChannel::new(config.url.clone(), SessionOptions::from(config), Arc::clone(&table));
        Ok(Self {
            table,
            channel,
            uploader: UploadCoordinator::new(config.upload_timeout)?,
            authenticator,
            connect_lock: Mutex::new(()),
        })
    }

    async fn ensure_open(&self) -> Result<String> {
        if let Some(id) = self.open_session_id().await? {
            return Ok(id);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(id) = self.open_session_id().await? {
            return Ok(id);
        }

        let token = self.authenticator.get_token().await?;
        self.channel.connect(&token).await?;
        self.channel
            .session_id()
            .await
            .ok_or_else(|| VerdictError::InvalidState("session opened without an id".to_string()))
    }

    /// Session id when open, `None` when a connect is needed
    async fn open_session_id(&self) -> Result<Option<String>> {
        match self.channel.state().await {
            SessionState::Open => Ok(self.channel.session_id().await),
            SessionState::Disconnected => Ok(None),
            SessionState::Authenticating => Ok(None),
            SessionState::Closing | SessionState::Closed => {
                Err(VerdictError::ConnectionClosed("session is closed".to_string()))
            }
        }
    }

    /// Register `guid`, send `frame`, await the answer
    async fn round_trip(&self, guid: String, frame: Frame, ctx: &RequestContext) -> Result<VerdictResponse> {
        let handle = self.table.try_register(guid)?;
        self.channel.send(&frame).await?;
        handle.wait(ctx.verdict_timeout).await
    }
}

#[async_trait]
impl VerdictTransport for SessionTransport {
    async fn connect(&self) -> Result<()> {
        self.ensure_open().await.map(|_| ())
    }

    async fn request_verdict(&self, subject: &Subject, ctx: &RequestContext) -> Result<VerdictResponse> {
        let session_id = self.ensure_open().await?;
        let guid = ctx.request_id.clone().unwrap_or_else(fresh_guid);
        let frame = match subject {
            Subject::Sha256(sha256) => {
                Frame::VerdictRequest(VerdictRequest::new(sha256.as_str(), guid.clone(), session_id, &ctx.flags))
            }
            Subject::Url(url) => {
                Frame::VerdictRequestForUrl(VerdictRequestForUrl::new(url, guid.clone(), session_id, &ctx.flags))
            }
        };
        self.round_trip(guid, frame, ctx).await
    }

    async fn submit_content(
        &self,
        content: Content,
        prior: PriorLookup,
        ctx: &RequestContext,
    ) -> Result<VerdictResponse> {
        let started = Instant::now();

        let pending = match prior {
            PriorLookup::Answered(answer) if answer.verdict == Verdict::Unknown => answer,
            prior => {
                let session_id = self.ensure_open().await?;
                // a sent lookup already used the caller's id
                let guid = match &ctx.request_id {
                    Some(id) if !prior.was_sent() => id.clone(),
                    _ => fresh_guid(),
                };
                let frame = Frame::VerdictRequestForStream(VerdictRequestForStream::new(
                    guid.clone(),
                    session_id,
                    &ctx.flags,
                ));
                let answer = self.round_trip(guid, frame, ctx).await?;
                if answer.verdict != Verdict::Unknown {
                    debug!("Stream request {} answered without upload: {}", answer.guid, answer.verdict);
                    return Ok(answer);
                }
                answer
            }
        };

        let ticket = pending.upload_ticket()?;
        let deferred = self.table.register_final(pending.guid.clone());
        self.uploader.upload(&ticket.token, &ticket.url, content).await?;
        info!("Upload for {} complete, awaiting verdict", pending.guid);

        let remaining = ctx.upload_timeout.saturating_sub(started.elapsed());
        match deferred.wait(remaining).await {
            Err(VerdictError::Timeout(_)) => Err(VerdictError::Timeout(ctx.upload_timeout)),
            other => other,
        }
    }

    async fn close(&self) -> Result<()> {
        self.channel.close().await
    }
}
