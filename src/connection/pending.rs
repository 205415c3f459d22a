//! In-flight request table.
//!
//! Every request registers a completion slot under a fresh correlation id
//! before its bytes are written. The slot is removed from the table exactly
//! once: by the reader thread when the response arrives, by the caller when
//! it gives up waiting, or by [`PendingRequests::fail_all`] when the owning
//! connection goes away. Whoever removes the entry is the only one allowed
//! to resolve it, so a slot can never be completed twice.
use std::{
    collections::HashMap,
    sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
    time::{Duration, Instant},
};

use log::trace;
use parking_lot::Mutex;
use rmpv::Value;

use crate::Error;

use super::{RequestId, RequestIdCounter};

/// A successful response body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Response {
    pub schema_version: Option<u64>,
    pub body: Value,
}

pub(crate) type Reply = Result<Response, Error>;

#[derive(Debug)]
struct Entry {
    slot: SyncSender<Reply>,
    enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<RequestId, Entry>,
    closed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    table: Mutex<Table>,
}

/// Waiting side of a registered request.
#[derive(Debug)]
pub(crate) struct Ticket {
    pub id: RequestId,
    receiver: Receiver<Reply>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a slot under the next id not currently in flight. Fails with
    /// [`Error::ConnectionLost`] once the table has been closed.
    pub fn register(&self, ids: &RequestIdCounter) -> Result<Ticket, Error> {
        let (slot, receiver) = mpsc::sync_channel(1);
        let mut table = self.table.lock();
        if table.closed {
            return Err(Error::ConnectionLost);
        }

        let mut id = ids.next_id();
        while table.entries.contains_key(&id) {
            id = ids.next_id();
        }

        table.entries.insert(
            id,
            Entry {
                slot,
                enqueued_at: Instant::now(),
            },
        );
        Ok(Ticket { id, receiver })
    }

    /// Completes the slot registered under `id`. Returns `false` when no such
    /// request is in flight.
    pub fn resolve(&self, id: RequestId, reply: Reply) -> bool {
        let Some(entry) = self.table.lock().entries.remove(&id) else {
            return false;
        };

        trace!("request {id} resolved after {:?}", entry.enqueued_at.elapsed());
        // The waiter may already be gone; nothing to deliver to then.
        let _ = entry.slot.send(reply);
        true
    }

    /// Removes the slot without completing it.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.table.lock().entries.remove(&id).is_some()
    }

    /// Closes the table and fails every slot still in flight. Returns the
    /// number of failed requests.
    pub fn fail_all(&self) -> usize {
        let entries = {
            let mut table = self.table.lock();
            table.closed = true;
            std::mem::take(&mut table.entries)
        };

        let failed = entries.len();
        for (_, entry) in entries {
            let _ = entry.slot.send(Err(Error::ConnectionLost));
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.table.lock().closed
    }
}

impl Ticket {
    /// Blocks until the slot is resolved, or until `timeout` expires.
    pub fn wait(self, pending: &PendingRequests, timeout: Option<Duration>) -> Reply {
        let Some(timeout) = timeout else {
            return self.receiver.recv().unwrap_or(Err(Error::ConnectionLost));
        };

        match self.receiver.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                if pending.cancel(self.id) {
                    return Err(Error::Timeout(self.id));
                }
                // Lost the race against the resolver; its reply is on the way.
                self.receiver.recv().unwrap_or(Err(Error::ConnectionLost))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionLost),
        }
    }
}
