//! Table of calls waiting for a reply

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Default)]
pub(crate) struct PendingCalls {
    inner: Mutex<Table>,
}

#[derive(Default)]
struct Table {
    calls: HashMap<String, oneshot::Sender<Vec<u8>>>,
    closed: bool,
}

/// Registration handle; dropping it unregisters the call
pub(crate) struct PendingCall {
    correlation_id: String,
    table: Arc<PendingCalls>,
}

impl PendingCall {
    pub(crate) fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        // No-op when the reply already removed the entry
        self.table.remove(&self.correlation_id);
    }
}

impl PendingCalls {
    /// Register a call under a fresh correlation id
    ///
    /// Returns `None` once the table is closed.
    pub(crate) fn register(
        self: &Arc<Self>,
    ) -> Option<(PendingCall, oneshot::Receiver<Vec<u8>>)> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.inner.lock();
        if table.closed {
            return None;
        }

        let mut correlation_id = Uuid::new_v4().to_string();
        while table.calls.contains_key(&correlation_id) {
            correlation_id = Uuid::new_v4().to_string();
        }
        table.calls.insert(correlation_id.clone(), tx);

        Some((
            PendingCall {
                correlation_id,
                table: self.clone(),
            },
            rx,
        ))
    }

    /// Remove the call and hand it the reply body
    ///
    /// Returns false when no call is registered under `correlation_id`.
    pub(crate) fn resolve(&self, correlation_id: &str, body: Vec<u8>) -> bool {
        let Some(tx) = self.inner.lock().calls.remove(correlation_id) else {
            return false;
        };
        // The caller may have stopped waiting between lookup and send
        tx.send(body).is_ok()
    }

    pub(crate) fn remove(&self, correlation_id: &str) -> bool {
        self.inner.lock().calls.remove(correlation_id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Refuse new calls and fail every waiting one; returns how many were waiting
    pub(crate) fn close(&self) -> usize {
        let mut table = self.inner.lock();
        table.closed = true;
        let abandoned = table.calls.len();
        table.calls.clear();
        abandoned
    }
}
