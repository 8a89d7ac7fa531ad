//! Token providers for the verdict service.
//!
//! The engine only depends on [`Authenticator`]; the binary picks one of the
//! implementations here from its configuration.

mod token;

pub use token::{Grant, TokenAuthenticator};

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::types::Result;

/// Source of bearer tokens.
///
/// Called once per session connect and once per HTTP call, so implementations
/// should cache.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn get_token(&self) -> Result<String>;
}

/// Pre-issued token that never expires from the client's point of view
pub struct StaticToken {
    token: Zeroizing<String>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn get_token(&self) -> Result<String> {
        Ok(self.token.to_string())
    }
}
