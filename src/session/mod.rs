//! Persistent WebSocket session with the verdict service.
//!
//! One [`SessionChannel`] owns one connection. After authentication a single
//! receive loop dispatches answers into the session's
//! [`CorrelationTable`](crate::correlation::CorrelationTable) and keeps the
//! connection alive.

mod channel;
mod receiver;

pub use channel::{SessionChannel, SessionOptions, SessionState};

use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;
