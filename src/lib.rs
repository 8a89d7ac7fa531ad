//! verdict-client - verdict resolution engine for a remote malware verdict service
//!
//! Asks the service for verdicts on SHA-256 hashes, files, buffers, byte
//! streams and URLs, over either a persistent WebSocket session or plain
//! HTTP.
//!
//! ## Components
//!
//! - **CorrelationTable**: matches concurrent in-flight requests with their answers
//! - **SessionChannel**: authenticated WebSocket session and its receive loop
//! - **UploadCoordinator**: supplies full content when the service asks for it
//! - **PollingClient**: HTTP report polling and submissions
//! - **VerdictResolver**: the public surface tying the above together
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use verdict_client::{ClientConfig, RequestOptions, StaticToken, VerdictResolver};
//!
//! # async fn example() -> verdict_client::Result<()> {
//! let resolver = VerdictResolver::new(ClientConfig::default(), Arc::new(StaticToken::new("token")))?;
//! let report = resolver
//!     .for_sha256(
//!         "275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f",
//!         &RequestOptions::default(),
//!     )
//!     .await?;
//! println!("{}", report.verdict);
//! resolver.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod correlation;
pub mod http;
pub mod message;
pub mod resolver;
pub mod session;
pub mod sha256;
pub mod transport;
pub mod types;
pub mod upload;

pub use auth::{Authenticator, Grant, StaticToken, TokenAuthenticator};
pub use config::{Args, ClientConfig, TransportKind};
pub use message::{Verdict, VerdictReport};
pub use resolver::{RequestOptions, VerdictResolver};
pub use sha256::Sha256;
pub use types::{ProblemDetails, ProblemKind, Result, VerdictError};
