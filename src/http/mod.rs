//! Stateless HTTP access to the verdict service.

pub mod polling;
pub mod status;

pub use polling::PollingClient;

/// Sent on every HTTP request and on the session handshake
pub const USER_AGENT: &str = concat!("verdict-client/rust/", env!("CARGO_PKG_VERSION"));
