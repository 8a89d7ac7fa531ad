//! Session connection lifecycle
//!
//! `Disconnected → Authenticating → Open → Closing → Closed`. A failed
//! authentication returns to `Disconnected`; `Closed` is final.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::receiver::receive_loop;
use super::{WsSink, WsSource};
use crate::config::ClientConfig;
use crate::correlation::CorrelationTable;
use crate::http::USER_AGENT;
use crate::message::{AuthRequest, AuthResponse, Frame};
use crate::types::{Result, VerdictError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Timing knobs of a session
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Bound on the WebSocket handshake plus authentication
    pub connect_timeout: Duration,
    /// Bound on waiting for the receive loop during `close`
    pub close_timeout: Duration,
    pub keep_alive: Option<Duration>,
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            close_timeout: config.close_timeout,
            keep_alive: config.keep_alive,
        }
    }
}

/// One authenticated WebSocket session
pub struct SessionChannel {
    url: String,
    options: SessionOptions,
    state: Arc<RwLock<SessionState>>,
    session_id: RwLock<Option<String>>,
    sink: Arc<Mutex<Option<WsSink>>>,
    table: Arc<CorrelationTable>,
    receiver: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionChannel {
    pub fn new(url: impl Into<String>, options: SessionOptions, table: Arc<CorrelationTable>) -> Self {
        Self {
            url: url.into(),
            options,
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            session_id: RwLock::new(None),
            sink: Arc::new(Mutex::new(None)),
            table,
            receiver: StdMutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Open the WebSocket, authenticate with `token` and start the receive loop
    pub async fn connect(&self, token: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != SessionState::Disconnected {
                return Err(VerdictError::InvalidState(format!("cannot connect a session that is {}", state)));
            }
            *state = SessionState::Authenticating;
        }

        info!("Connecting to verdict service at {}", self.url);
        let handshake = timeout(self.options.connect_timeout, self.handshake(token)).await;
        let (sink, stream, session_id) = match handshake {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                warn!("Session setup failed: {}", e);
                self.reset_if_authenticating().await;
                return Err(e);
            }
            Err(_) => {
                warn!("Session setup timed out after {:?}", self.options.connect_timeout);
                self.reset_if_authenticating().await;
                return Err(VerdictError::Timeout(self.options.connect_timeout));
            }
        };

        let mut state = self.state.write().await;
        if *state != SessionState::Authenticating {
            return Err(VerdictError::ConnectionClosed(format!("session became {} while connecting", state)));
        }

        *self.session_id.write().await = Some(session_id.clone());
        *self.sink.lock().await = Some(sink);

        let handle = tokio::spawn(receive_loop(
            stream,
            Arc::clone(&self.sink),
            Arc::clone(&self.table),
            Arc::clone(&self.state),
            self.options.keep_alive,
        ));
        if let Ok(mut slot) = self.receiver.lock() {
            *slot = Some(handle);
        }

        *state = SessionState::Open;
        info!("Session {} open", session_id);
        Ok(())
    }

    async fn reset_if_authenticating(&self) {
        let mut state = self.state.write().await;
        if *state == SessionState::Authenticating {
            *state = SessionState::Disconnected;
        }
    }

    async fn handshake(&self, token: &str) -> Result<(WsSink, WsSource, String)> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| VerdictError::client("InvalidUrl", format!("Invalid session URL {}: {}", self.url, e)))?;
        request
            .headers_mut()
            .insert("User-Agent", HeaderValue::from_static(USER_AGENT));

        let (ws, _) = connect_async_with_config(request, None, false)
            .await
            .map_err(|e| VerdictError::ConnectionClosed(format!("WebSocket connect failed: {}", e)))?;
        let (mut sink, mut stream) = ws.split();

        let auth = Frame::AuthRequest(AuthRequest {
            token: token.to_string(),
            session_id: None,
        });
        sink.send(Message::Text(auth.to_json()?)).await?;

        let response = await_auth_response(&mut sink, &mut stream).await?;
        if !response.success {
            let _ = sink.send(Message::Close(None)).await;
            return Err(VerdictError::authentication(
                "VaasAuthenticationException",
                response.text.unwrap_or_else(|| "authentication rejected".to_string()),
            ));
        }

        let session_id = response.session_id.ok_or_else(|| {
            VerdictError::server("InvalidMessage", "successful AuthResponse carries no session_id")
        })?;
        Ok((sink, stream, session_id))
    }

    /// Transmit one frame on the open session
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        match *self.state.read().await {
            SessionState::Open => {}
            SessionState::Disconnected | SessionState::Authenticating => {
                return Err(VerdictError::InvalidState("session is not open".to_string()))
            }
            SessionState::Closing | SessionState::Closed => {
                return Err(VerdictError::ConnectionClosed("session is closed".to_string()))
            }
        }

        let text = frame.to_json()?;
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| VerdictError::ConnectionClosed("session is closed".to_string()))?;
        debug!("Sending {}", text);
        sink.send(Message::Text(text))
            .await
            .map_err(|e| VerdictError::ConnectionClosed(format!("send failed: {}", e)))
    }

    /// Close the session and wait (bounded) for the receive loop to finish.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                SessionState::Closing | SessionState::Closed => return Ok(()),
                SessionState::Open => *state = SessionState::Closing,
                SessionState::Disconnected | SessionState::Authenticating => {
                    *state = SessionState::Closed;
                    drop(state);
                    self.table.close_all("session closed");
                    return Ok(());
                }
            }
        }

        info!("Closing session");
        if let Some(sink) = self.sink.lock().await.as_mut() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Close frame not sent: {}", e);
            }
        }

        let handle = self.receiver.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut handle) = handle {
            if timeout(self.options.close_timeout, &mut handle).await.is_err() {
                warn!("Receive loop did not stop within {:?}, aborting", self.options.close_timeout);
                handle.abort();
            }
        }

        *self.state.write().await = SessionState::Closed;
        self.sink.lock().await.take();
        self.table.close_all("session closed");
        Ok(())
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.receiver.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.table.close_all("session dropped");
    }
}

/// Wait for the service's answer to `AuthRequest`, answering pings meanwhile
async fn await_auth_response(sink: &mut WsSink, stream: &mut WsSource) -> Result<AuthResponse> {
    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Text(text) => match Frame::parse(&text)? {
                Frame::AuthResponse(response) => return Ok(response),
                Frame::Error(frame) => return Err(VerdictError::from_problem(frame.problem())),
                other => warn!("Unexpected frame before authentication: {:?}", other),
            },
            Message::Ping(data) => sink.send(Message::Pong(data)).await?,
            Message::Close(frame) => {
                return Err(VerdictError::ConnectionClosed(format!(
                    "service closed the connection during authentication: {:?}",
                    frame
                )))
            }
            _ => {}
        }
    }
    Err(VerdictError::ConnectionClosed("connection ended during authentication".to_string()))
}
