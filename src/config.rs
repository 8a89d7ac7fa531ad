//! Configuration for the verdict client
//!
//! [`ClientConfig`] is what the library consumes. [`Args`] is the `verdict`
//! binary's CLI/environment surface and converts into it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use zeroize::Zeroizing;

use crate::auth::{Authenticator, Grant, StaticToken, TokenAuthenticator};
use crate::types::Result;

pub const DEFAULT_SESSION_URL: &str = "wss://gateway.production.vaas.gdatasecurity.de";
pub const DEFAULT_HTTP_URL: &str = "https://gateway.production.vaas.gdatasecurity.de";
pub const DEFAULT_TOKEN_ENDPOINT: &str =
    "https://account.gdata.de/realms/vaas-production/protocol/openid-connect/token";

const DEFAULT_VERDICT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 10;

/// Which channel the resolver talks over
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Persistent authenticated WebSocket session
    Session,
    /// Stateless HTTP report polling
    Http,
}

/// Library configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service URL (`wss://` for sessions, `https://` for HTTP)
    pub url: String,
    pub transport: TransportKind,
    /// Bound on a single verdict request
    pub verdict_timeout: Duration,
    /// Bound on an upload plus the deferred verdict that follows it
    pub upload_timeout: Duration,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
    /// Ping interval on an open session; `None` disables keep-alive
    pub keep_alive: Option<Duration>,
    pub use_cache: bool,
    pub use_hash_lookup: bool,
}

impl ClientConfig {
    pub fn session(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: TransportKind::Session,
            ..Self::default()
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: TransportKind::Http,
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SESSION_URL.to_string(),
            transport: TransportKind::Session,
            verdict_timeout: Duration::from_secs(DEFAULT_VERDICT_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            close_timeout: Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS),
            keep_alive: Some(Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS)),
            use_cache: true,
            use_hash_lookup: true,
        }
    }
}

/// verdict - ask the verdict service about files, hashes and URLs
#[derive(Parser, Debug, Clone)]
#[command(name = "verdict")]
#[command(about = "Malware verdicts for files, SHA-256 hashes and URLs")]
pub struct Args {
    /// Service URL (defaults to the production gateway for the chosen transport)
    #[arg(long, env = "VAAS_URL")]
    pub url: Option<String>,

    /// Transport to use
    #[arg(long, env = "VAAS_TRANSPORT", value_enum, default_value = "session")]
    pub transport: TransportKind,

    /// Pre-issued bearer token (skips the token endpoint)
    #[arg(long, env = "VAAS_TOKEN")]
    pub token: Option<String>,

    /// OAuth2 token endpoint
    #[arg(long, env = "TOKEN_URL", default_value = DEFAULT_TOKEN_ENDPOINT)]
    pub token_endpoint: String,

    /// OAuth2 client id
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth2 client secret (client credentials grant)
    #[arg(long, env = "CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Account name (password grant)
    #[arg(long, env = "VAAS_USER_NAME")]
    pub username: Option<String>,

    /// Account password (password grant)
    #[arg(long, env = "VAAS_PASSWORD")]
    pub password: Option<String>,

    /// Verdict timeout in seconds
    #[arg(long, env = "VERDICT_TIMEOUT_SECS", default_value_t = DEFAULT_VERDICT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Upload timeout in seconds
    #[arg(long, env = "UPLOAD_TIMEOUT_SECS", default_value_t = DEFAULT_UPLOAD_TIMEOUT_SECS)]
    pub upload_timeout_secs: u64,

    /// Ask the service not to answer from its verdict cache
    #[arg(long, env = "NO_CACHE", default_value = "false")]
    pub no_cache: bool,

    /// Disable hash lookups (always submit full content)
    #[arg(long, env = "NO_HASH_LOOKUP", default_value = "false")]
    pub no_hash_lookup: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to ask about
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Verdicts for known SHA-256 hashes
    Sha256 {
        #[arg(required = true)]
        hashes: Vec<String>,
    },
    /// Verdicts for local files
    File {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Verdicts for URLs
    Url {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

impl Args {
    /// Get effective service URL (falls back to the production gateway)
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or(match self.transport {
            TransportKind::Session => DEFAULT_SESSION_URL,
            TransportKind::Http => DEFAULT_HTTP_URL,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.token.is_none() {
            if self.client_id.is_none() {
                return Err("Either VAAS_TOKEN or CLIENT_ID is required".to_string());
            }
            let has_secret = self.client_secret.is_some();
            let has_account = self.username.is_some() && self.password.is_some();
            if !has_secret && !has_account {
                return Err("CLIENT_SECRET or VAAS_USER_NAME and VAAS_PASSWORD are required".to_string());
            }
        }

        let url = self.url();
        let scheme_ok = match self.transport {
            TransportKind::Session => url.starts_with("ws://") || url.starts_with("wss://"),
            TransportKind::Http => url.starts_with("http://") || url.starts_with("https://"),
        };
        if !scheme_ok {
            return Err(format!("URL {} does not match transport {:?}", url, self.transport));
        }

        if self.timeout_secs == 0 || self.upload_timeout_secs == 0 {
            return Err("Timeouts must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url().to_string(),
            transport: self.transport,
            verdict_timeout: Duration::from_secs(self.timeout_secs),
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
            use_cache: !self.no_cache,
            use_hash_lookup: !self.no_hash_lookup,
            ..ClientConfig::default()
        }
    }

    /// Build the token source described by the arguments.
    ///
    /// A static token wins over a client secret, which wins over a password grant.
    pub fn authenticator(&self) -> Result<Arc<dyn Authenticator>> {
        if let Some(ref token) = self.token {
            return Ok(Arc::new(StaticToken::new(token.clone())));
        }

        let client_id = self.client_id.clone().unwrap_or_default();
        let grant = match (&self.client_secret, &self.username, &self.password) {
            (Some(secret), _, _) => Grant::ClientCredentials {
                client_id,
                client_secret: Zeroizing::new(secret.clone()),
            },
            (None, Some(username), Some(password)) => Grant::Password {
                client_id,
                username: username.clone(),
                password: Zeroizing::new(password.clone()),
            },
            _ => {
                return Err(crate::types::VerdictError::authentication(
                    "MissingCredentials",
                    "no token, client secret or account password configured",
                ))
            }
        };

        Ok(Arc::new(TokenAuthenticator::new(self.token_endpoint.clone(), grant)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["verdict"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.verdict_timeout, Duration::from_secs(60));
        assert_eq!(config.upload_timeout, Duration::from_secs(600));
        assert_eq!(config.keep_alive, Some(Duration::from_secs(10)));
        assert!(config.use_cache);
        assert!(config.use_hash_lookup);
        assert_eq!(config.transport, TransportKind::Session);
    }

    #[test]
    fn test_url_follows_transport() {
        let args = parse(&["--token", "t", "--transport", "http", "sha256", "abc"]);
        assert_eq!(args.url(), DEFAULT_HTTP_URL);
        assert!(args.validate().is_ok());

        let args = parse(&["--token", "t", "sha256", "abc"]);
        assert_eq!(args.url(), DEFAULT_SESSION_URL);
    }

    #[test]
    fn test_validate_requires_credentials() {
        let args = parse(&["sha256", "abc"]);
        assert!(args.validate().is_err());

        let args = parse(&["--client-id", "c", "sha256", "abc"]);
        assert!(args.validate().is_err());

        let args = parse(&["--client-id", "c", "--client-secret", "s", "sha256", "abc"]);
        assert!(args.validate().is_ok());

        let args = parse(&["--client-id", "c", "--username", "u", "--password", "p", "file", "a.bin"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_scheme_mismatch() {
        let args = parse(&["--token", "t", "--url", "https://x", "url", "https://y"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_client_config_flags() {
        let args = parse(&["--token", "t", "--no-cache", "--timeout-secs", "5", "sha256", "abc"]);
        let config = args.client_config();
        assert!(!config.use_cache);
        assert!(config.use_hash_lookup);
        assert_eq!(config.verdict_timeout, Duration::from_secs(5));
    }
}
