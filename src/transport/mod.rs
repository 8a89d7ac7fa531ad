//! Channel-independent verdict transport.
//!
//! The resolver speaks to the service only through [`VerdictTransport`].
//! [`SessionTransport`] multiplexes requests over one authenticated
//! WebSocket; [`HttpTransport`] issues stateless calls and polls reports.

mod http;
mod session;

pub use self::http::HttpTransport;
pub use self::session::SessionTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::Authenticator;
use crate::config::{ClientConfig, TransportKind};
use crate::message::{RequestFlags, VerdictResponse};
use crate::sha256::Sha256;
use crate::types::Result;
use crate::upload::Content;

/// What a verdict request is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Sha256(Sha256),
    Url(String),
}

/// What the hash lookup before a content submission produced
#[derive(Debug, Clone)]
pub enum PriorLookup {
    /// No lookup was sent
    Skipped,
    /// A lookup was sent and the service refused it
    Rejected,
    /// The service answered without a usable verdict
    Answered(VerdictResponse),
}

impl PriorLookup {
    /// Whether a lookup frame went out, consuming the caller's request id
    pub fn was_sent(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Per-call settings, already merged with the client defaults
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Caller-chosen correlation id
    pub request_id: Option<String>,
    pub flags: RequestFlags,
    pub verdict_timeout: Duration,
    pub upload_timeout: Duration,
}

#[async_trait]
pub trait VerdictTransport: Send + Sync {
    /// Establish the channel ahead of the first request
    async fn connect(&self) -> Result<()>;

    /// One verdict request for a hash or URL
    async fn request_verdict(&self, subject: &Subject, ctx: &RequestContext) -> Result<VerdictResponse>;

    /// Supply full content and return the resulting verdict.
    ///
    /// `prior` is the outcome of the preceding hash lookup.
    async fn submit_content(
        &self,
        content: Content,
        prior: PriorLookup,
        ctx: &RequestContext,
    ) -> Result<VerdictResponse>;

    async fn close(&self) -> Result<()>;
}

/// Build the transport selected by `config`
pub fn from_config(config: &ClientConfig, authenticator: Arc<dyn Authenticator>) -> Result<Box<dyn VerdictTransport>> {
    Ok(match config.transport {
        TransportKind::Session => Box::new(SessionTransport::new(config, authenticator)?),
        TransportKind::Http => Box::new(HttpTransport::new(config, authenticator)?),
    })
}

pub(crate) fn fresh_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}
