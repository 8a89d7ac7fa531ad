//! OAuth2 token endpoint authenticator

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::Authenticator;
use crate::types::{Result, VerdictError};

/// Lifetime assumed when the endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN: u64 = 3600;
/// Refresh this long before the reported expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);
/// Token endpoint request timeout
const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);

/// OAuth2 grant used to obtain tokens
pub enum Grant {
    ClientCredentials {
        client_id: String,
        client_secret: Zeroizing<String>,
    },
    Password {
        client_id: String,
        username: String,
        password: Zeroizing<String>,
    },
}

impl Grant {
    fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::ClientCredentials {
                client_id,
                client_secret,
            } => vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ],
            Self::Password {
                client_id,
                username,
                password,
            } => vec![
                ("grant_type", "password"),
                ("client_id", client_id.as_str()),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ],
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: Zeroizing<String>,
    refresh_at: Instant,
}

/// Fetches tokens from an OAuth2 token endpoint and caches them until
/// shortly before expiry
pub struct TokenAuthenticator {
    endpoint: String,
    grant: Grant,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenAuthenticator {
    pub fn new(endpoint: impl Into<String>, grant: Grant) -> Result<Self> {
        let client = Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(|e| VerdictError::client("HttpClient", format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            grant,
            client,
            cached: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&self.grant.form())
            .send()
            .await
            .map_err(|e| VerdictError::authentication("TokenEndpoint", format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Token endpoint rejected credentials: {} {}", status, body);
            return Err(VerdictError::authentication(
                "TokenEndpoint",
                format!("Token endpoint returned {}: {}", status, body),
            ));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| VerdictError::authentication("TokenEndpoint", format!("Invalid token response: {}", e)))?;

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        debug!("Obtained access token valid for {:?}", lifetime);

        Ok(CachedToken {
            token: Zeroizing::new(parsed.access_token),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn get_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(ref entry) = *cached {
            if Instant::now() < entry.refresh_at {
                return Ok(entry.token.to_string());
            }
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.to_string();
        *cached = Some(fresh);
        Ok(token)
    }
}
