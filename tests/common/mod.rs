//! In-process verdict service speaking the session protocol

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

pub const VALID_TOKEN: &str = "valid-token";
pub const SESSION_ID: &str = "session-1";

pub const EICAR: &[u8] = b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
pub const EICAR_SHA256: &str = "275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f";
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// What the fake service does in response to one request frame
pub enum Action {
    Reply(Value),
    ReplyAfter(Duration, Value),
    /// Reply once the future resolves
    ReplyWhen(BoxFuture<'static, Value>),
    /// Send a WebSocket ping with this payload
    Ping(Vec<u8>),
    /// Close the connection
    Close,
}

pub type Handler = Arc<dyn Fn(&Value) -> Vec<Action> + Send + Sync>;

/// Control frames seen by the fake service
#[derive(Default)]
pub struct ControlLog {
    pub pings: Vec<Vec<u8>>,
    pub pongs: Vec<Vec<u8>>,
}

enum Outgoing {
    Frame(Value),
    Ping(Vec<u8>),
    Close,
}

pub struct FakeVerdictServer {
    pub url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    control: Arc<Mutex<ControlLog>>,
}

impl FakeVerdictServer {
    /// Accept sessions on a random local port. `AuthRequest` is handled
    /// here; every other frame goes to `handler`.
    pub async fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let control = Arc::new(Mutex::new(ControlLog::default()));

        let recorded = Arc::clone(&requests);
        let seen = Arc::clone(&control);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let recorded = Arc::clone(&recorded);
                let seen = Arc::clone(&seen);
                tokio::spawn(serve(tcp, handler, recorded, seen));
            }
        });

        Self { url, requests, control }
    }

    /// Payloads of pings received from the client
    pub fn pings(&self) -> Vec<Vec<u8>> {
        self.control.lock().unwrap().pings.clone()
    }

    /// Payloads of pongs received from the client
    pub fn pongs(&self) -> Vec<Vec<u8>> {
        self.control.lock().unwrap().pongs.clone()
    }

    /// Every non-auth frame received so far
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_of_kind(&self, kind: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["kind"] == kind)
            .collect()
    }
}

async fn serve(
    tcp: tokio::net::TcpStream,
    handler: Handler,
    recorded: Arc<Mutex<Vec<Value>>>,
    control: Arc<Mutex<ControlLog>>,
) {
    let ws = match tokio_tungstenite::accept_async(tcp).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

    tokio::spawn(async move {
        while let Some(next) = rx.recv().await {
            let message = match next {
                Outgoing::Frame(frame) => Message::Text(frame.to_string()),
                Outgoing::Ping(data) => Message::Ping(data),
                Outgoing::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Ping(data) => {
                control.lock().unwrap().pings.push(data);
                continue;
            }
            Message::Pong(data) => {
                control.lock().unwrap().pongs.push(data);
                continue;
            }
            _ => continue,
        };
        let frame: Value = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(_) => continue,
        };

        if frame["kind"] == "AuthRequest" {
            let reply = if frame["token"] == VALID_TOKEN {
                json!({"kind": "AuthResponse", "success": true, "session_id": SESSION_ID, "text": ""})
            } else {
                json!({"kind": "AuthResponse", "success": false, "session_id": null, "text": "Unauthorized"})
            };
            let _ = tx.send(Outgoing::Frame(reply));
            continue;
        }

        recorded.lock().unwrap().push(frame.clone());
        for action in handler(&frame) {
            match action {
                Action::Reply(reply) => {
                    let _ = tx.send(Outgoing::Frame(reply));
                }
                Action::ReplyAfter(delay, reply) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Outgoing::Frame(reply));
                    });
                }
                Action::ReplyWhen(ready) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let reply = ready.await;
                        let _ = tx.send(Outgoing::Frame(reply));
                    });
                }
                Action::Ping(data) => {
                    let _ = tx.send(Outgoing::Ping(data));
                }
                Action::Close => {
                    let _ = tx.send(Outgoing::Close);
                }
            }
        }
    }
}

/// Service that authenticates and then stops reading, so a close frame is
/// never answered
pub async fn start_unresponsive_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(tcp).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                let _ = ws.next().await;
                let reply = json!({"kind": "AuthResponse", "success": true, "session_id": SESSION_ID, "text": ""});
                let _ = ws.send(Message::Text(reply.to_string())).await;
                // keep the socket open without reading from it
                let _held = ws;
                std::future::pending::<()>().await;
            });
        }
    });
    url
}

/// Listener that accepts TCP connections but never completes the WebSocket
/// handshake
pub async fn start_silent_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });
    url
}

/// Complete answer for `request` (guid and sha256 echoed back)
pub fn verdict_for(request: &Value, verdict: &str, detection: Option<&str>) -> Value {
    json!({
        "kind": "VerdictResponse",
        "guid": request["guid"],
        "sha256": request.get("sha256").cloned().unwrap_or(json!(EICAR_SHA256)),
        "verdict": verdict,
        "detection": detection,
        "file_type": "ASCII text",
        "mime_type": "text/plain",
    })
}

/// Unknown answer asking for the content to be uploaded
pub fn upload_requested(request: &Value, upload_url: &str) -> Value {
    json!({
        "kind": "VerdictResponse",
        "guid": request["guid"],
        "sha256": request.get("sha256").cloned().unwrap_or(json!(EICAR_SHA256)),
        "verdict": "Unknown",
        "upload_token": "t",
        "url": upload_url,
    })
}

/// Deferred verdict for `guid`, as pushed after an upload
pub fn deferred_verdict(guid: &Value, verdict: &str) -> Value {
    json!({
        "kind": "VerdictResponse",
        "guid": guid,
        "sha256": EICAR_SHA256,
        "verdict": verdict,
        "file_type": "ASCII text",
        "mime_type": "text/plain",
    })
}
