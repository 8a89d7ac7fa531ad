//! Receive loop of an open session

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use super::channel::SessionState;
use super::{WsSink, WsSource};
use crate::correlation::CorrelationTable;
use crate::message::Frame;
use crate::types::VerdictError;

/// Read frames until the connection ends, then mark the session closed and
/// fail everything still pending
pub(crate) async fn receive_loop(
    mut stream: WsSource,
    sink: Arc<Mutex<Option<WsSink>>>,
    table: Arc<CorrelationTable>,
    state: Arc<RwLock<SessionState>>,
    keep_alive: Option<Duration>,
) {
    let mut ticker = keep_alive.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let reason = loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => dispatch(&table, &text),
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = send_raw(&sink, Message::Pong(data)).await {
                        break format!("failed to answer ping: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Verdict service closed the session: {:?}", frame);
                    break "session closed by the service".to_string();
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!("Dropping unexpected binary frame ({} bytes)", data.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Session WebSocket error: {}", e);
                    break format!("session transport failed: {}", e);
                }
                None => break "session stream ended".to_string(),
            },
            _ = next_tick(&mut ticker) => {
                debug!("Sending keep-alive ping");
                if let Err(e) = send_raw(&sink, Message::Ping(Vec::new())).await {
                    break format!("keep-alive ping failed: {}", e);
                }
            }
        }
    };

    *state.write().await = SessionState::Closed;
    sink.lock().await.take();
    table.close_all(&reason);
    debug!("Receive loop ended: {}", reason);
}

/// Route one text frame to its waiter
pub(crate) fn dispatch(table: &CorrelationTable, text: &str) {
    match Frame::parse(text) {
        Ok(Frame::VerdictResponse(response)) => {
            let guid = response.guid.clone();
            debug!("Verdict {} for request {}", response.verdict, guid);
            table.resolve(&guid, Ok(response));
        }
        Ok(Frame::Error(frame)) => {
            let problem = frame.problem();
            match frame.guid {
                Some(guid) => {
                    debug!("Request {} failed: {}", guid, problem);
                    table.resolve(&guid, Err(VerdictError::from_problem(problem)));
                }
                None => warn!("Dropping error frame without guid: {}", problem),
            }
        }
        Ok(other) => debug!("Ignoring frame {:?}", other),
        Err(e) => warn!("Dropping malformed frame: {}", e),
    }
}

async fn send_raw(sink: &Mutex<Option<WsSink>>, message: Message) -> Result<(), String> {
    let mut guard = sink.lock().await;
    match guard.as_mut() {
        Some(sink) => sink.send(message).await.map_err(|e| e.to_string()),
        None => Err("sink already closed".to_string()),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
