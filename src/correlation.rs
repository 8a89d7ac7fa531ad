//! Correlation of in-flight requests with their responses
//!
//! Each outstanding request owns one slot keyed by its guid. The receive loop
//! resolves slots as answers arrive, in any order; callers register before
//! sending and wait afterwards. A slot is resolved at most once and is removed
//! on resolution, timeout, or when its [`WaitHandle`] is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::message::VerdictResponse;
use crate::types::{Result, VerdictError};

type Outcome = Result<VerdictResponse>;

struct Slot {
    seq: u64,
    tx: oneshot::Sender<Outcome>,
    /// Skip answers that still ask for an upload
    final_only: bool,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    next_seq: u64,
    /// Set once by `close_all`; later registrations fail with this reason
    closed: Option<String>,
}

/// Pending requests of one session
#[derive(Default)]
pub struct CorrelationTable {
    inner: Mutex<Inner>,
}

impl CorrelationTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve a slot for `id`. Must happen before the request is sent.
    ///
    /// A pending slot with the same id is displaced and its waiter fails with
    /// `ConnectionClosed`.
    pub fn register(self: &Arc<Self>, id: impl Into<String>) -> WaitHandle {
        let id = id.into();
        let mut inner = self.lock();
        self.insert(&mut inner, id, false)
    }

    /// Reserve a slot for the verdict that follows an upload.
    ///
    /// Repeats of the Unknown answer that issued the upload ticket leave the
    /// slot pending.
    pub fn register_final(self: &Arc<Self>, id: impl Into<String>) -> WaitHandle {
        let id = id.into();
        let mut inner = self.lock();
        self.insert(&mut inner, id, true)
    }

    /// Like [`register`](Self::register), but refuses an id that is still pending
    pub fn try_register(self: &Arc<Self>, id: impl Into<String>) -> Result<WaitHandle> {
        let id = id.into();
        let mut inner = self.lock();
        if inner.slots.contains_key(&id) {
            return Err(VerdictError::client(
                "DuplicateRequestId",
                format!("request id {} is already in flight", id),
            ));
        }
        Ok(self.insert(&mut inner, id, false))
    }

    fn insert(self: &Arc<Self>, inner: &mut Inner, id: String, final_only: bool) -> WaitHandle {
        let (tx, rx) = oneshot::channel();

        if let Some(ref reason) = inner.closed {
            let _ = tx.send(Err(VerdictError::ConnectionClosed(reason.clone())));
            return WaitHandle {
                id,
                seq: 0,
                rx,
                table: Arc::clone(self),
            };
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        if let Some(displaced) = inner.slots.insert(id.clone(), Slot { seq, tx, final_only }) {
            debug!("Request {} re-registered, failing previous waiter", id);
            let _ = displaced.tx.send(Err(VerdictError::ConnectionClosed(format!(
                "request {} was superseded by a newer registration",
                id
            ))));
        }

        WaitHandle {
            id,
            seq,
            rx,
            table: Arc::clone(self),
        }
    }

    /// Deliver the outcome for `id`.
    ///
    /// Returns false when nobody is waiting (unknown, already resolved,
    /// timed out or cancelled) or when a final-only slot receives another
    /// upload request; the outcome is discarded.
    pub fn resolve(&self, id: &str, outcome: Outcome) -> bool {
        let slot = {
            let mut inner = self.lock();
            let repeated_ticket = inner.slots.get(id).is_some_and(|slot| slot.final_only)
                && matches!(&outcome, Ok(response) if response.requests_upload());
            if repeated_ticket {
                debug!("Ignoring repeated upload request for {}", id);
                return false;
            }
            inner.slots.remove(id)
        };
        match slot {
            Some(slot) => {
                if slot.tx.send(outcome).is_err() {
                    debug!("Waiter for {} went away before its answer arrived", id);
                    return false;
                }
                true
            }
            None => {
                debug!("Discarding answer for unknown request {}", id);
                false
            }
        }
    }

    /// Await the outcome for `handle`, bounded by `timeout`
    pub async fn wait(&self, handle: WaitHandle, timeout: Duration) -> Outcome {
        handle.wait(timeout).await
    }

    /// Fail every outstanding slot with `ConnectionClosed` and reject
    /// later registrations
    pub fn close_all(&self, reason: &str) {
        let drained: Vec<(String, Slot)> = {
            let mut inner = self.lock();
            if inner.closed.is_none() {
                inner.closed = Some(reason.to_string());
            }
            inner.slots.drain().collect()
        };

        if !drained.is_empty() {
            debug!("Failing {} pending request(s): {}", drained.len(), reason);
        }
        for (_, slot) in drained {
            let _ = slot.tx.send(Err(VerdictError::ConnectionClosed(reason.to_string())));
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().slots.contains_key(id)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    fn remove_if_current(&self, id: &str, seq: u64) {
        let mut inner = self.lock();
        if inner.slots.get(id).is_some_and(|slot| slot.seq == seq) {
            inner.slots.remove(id);
        }
    }
}

/// A caller's claim on one slot.
///
/// Dropping the handle cancels the wait and frees the slot.
pub struct WaitHandle {
    id: String,
    seq: u64,
    rx: oneshot::Receiver<Outcome>,
    table: Arc<CorrelationTable>,
}

impl WaitHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn wait(mut self, timeout: Duration) -> Outcome {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(VerdictError::ConnectionClosed(format!(
                "request {} was abandoned by the session",
                self.id
            ))),
            Err(_) => {
                debug!("Request {} timed out after {:?}", self.id, timeout);
                Err(VerdictError::Timeout(timeout))
            }
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.table.remove_if_current(&self.id, self.seq);
    }
}
