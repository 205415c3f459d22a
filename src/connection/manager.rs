//! Logical connection manager.
//!
//! The manager is the long-lived, caller-facing connection. It owns at most
//! one [`PhysicalConnection`] at a time and replaces it transparently when
//! the previous one died: every send first makes sure a live connection
//! exists, so callers never have to connect explicitly.
//!
//! # Locking
//!
//! Connect attempts are coordinated through an upgradable read/write lock:
//!
//! - liveness checks take the shared lock and never block each other;
//! - `connect` takes the upgradable lock (only one holder at a time, still
//!   compatible with readers), returns early if the connection is live, and
//!   otherwise upgrades to exclusive for the actual connect;
//! - every wait is bounded by the configured connect timeout.
//!
//! The "current connection" itself lives in an atomically swappable slot.
//! Whoever takes a connection out of the slot is the one that closes it, so
//! a `dispose` racing a reconnect can neither leak nor double-close a socket.
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use arc_swap::ArcSwapOption;
use log::{debug, info, trace, warn};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use rmpv::Value;
use serde::de::DeserializeOwned;

use crate::{
    ClientOptions, CodecError, Error,
    protocol::{DataResponse, PingRequest, Request},
};

use super::{
    PhysicalConnection, RequestIdCounter,
    pending::Response,
    ping::{PING_TIMER_INTERVAL, PingScheduler, PingTimer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disposed,
}

#[derive(Debug)]
struct Inner {
    options: Arc<ClientOptions>,
    request_ids: Arc<RequestIdCounter>,
    current: ArcSwapOption<PhysicalConnection>,
    lock: RwLock<()>,
    connecting: AtomicBool,
    disposed: AtomicBool,
    ping: PingScheduler,
    timer: Mutex<Option<PingTimer>>,
    /// Finished connect attempts, successful or not.
    attempts: AtomicU64,
    last_failure: Mutex<Option<Error>>,
    connects: AtomicU64,
}

/// Caller-facing connection that reconnects on demand.
#[derive(Debug)]
pub struct LogicalConnectionManager {
    inner: Arc<Inner>,
}

impl LogicalConnectionManager {
    pub fn new(options: impl Into<Arc<ClientOptions>>) -> Self {
        let options = options.into();
        let ping = PingScheduler::new(options.connection.ping_check_interval());

        Self {
            inner: Arc::new(Inner {
                options,
                request_ids: Arc::new(RequestIdCounter::new()),
                current: ArcSwapOption::empty(),
                lock: RwLock::new(()),
                connecting: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                ping,
                timer: Mutex::new(None),
                attempts: AtomicU64::new(0),
                last_failure: Mutex::new(None),
                connects: AtomicU64::new(0),
            }),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Makes sure a live physical connection exists. Concurrent callers share
    /// a single connect attempt and observe its outcome.
    pub fn connect(&self) -> Result<(), Error> {
        self.inner.connect()
    }

    /// Never blocks for longer than the connect timeout; reports `false`
    /// instead of failing when the lock cannot be taken in time.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Sends `request` and decodes the data array of the response.
    pub fn send_request<R, T>(&self, request: &R) -> Result<DataResponse<T>, Error>
    where
        R: Request,
        T: DeserializeOwned,
    {
        let response = self.inner.send(request)?;
        DataResponse::decode(response.body, response.schema_version)
    }

    /// Sends `request` and returns the raw response body.
    pub fn send_request_raw<R: Request>(&self, request: &R) -> Result<Value, Error> {
        self.inner.send(request).map(|response| response.body)
    }

    /// Sends `request` and waits for the server to acknowledge it, ignoring
    /// the response body.
    pub fn send_request_no_response<R: Request>(&self, request: &R) -> Result<(), Error> {
        self.inner.send(request).map(|_| ())
    }

    /// Closes the current connection and stops keep-alive. Only the first
    /// call has any effect; the manager cannot be used afterwards.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Number of physical connections opened so far.
    pub fn physical_connects(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

impl Drop for LogicalConnectionManager {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl Inner {
    fn connect(self: &Arc<Self>) -> Result<(), Error> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        let seen_attempts = self.attempts.load(Ordering::SeqCst);
        // Waiters must outlast whichever attempt currently holds the lock.
        let timeout = self.options.connection.connect_attempt_budget();
        let guard = self
            .lock
            .try_upgradable_read_for(timeout)
            .ok_or(Error::NotConnected)?;

        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        if self.current_is_connected() {
            return Ok(());
        }
        // Someone else tried while we were waiting and failed; share their result.
        if self.attempts.load(Ordering::SeqCst) != seen_attempts {
            if let Some(failure) = self.last_failure.lock().as_ref() {
                return Err(duplicate(failure));
            }
        }

        info!("connecting to {:?}", self.options.connection.nodes);
        self.options.log("LogicalConnectionManager: Connecting...");

        let _write = RwLockUpgradableReadGuard::upgrade(guard);
        self.connecting.store(true, Ordering::SeqCst);
        let result = PhysicalConnection::connect(&self.options.connection, Arc::clone(&self.request_ids));
        self.connecting.store(false, Ordering::SeqCst);

        let connection = match result {
            Ok(connection) => connection,
            Err(e) => {
                warn!("connect failed: {e}");
                *self.last_failure.lock() = Some(duplicate(&e));
                self.attempts.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        if let Some(previous) = self.current.swap(Some(Arc::new(connection))) {
            debug!("replacing connection to {}", previous.endpoint());
            previous.close();
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_failure.lock() = None;
        self.attempts.fetch_add(1, Ordering::SeqCst);

        // `dispose` ran while we were connecting and may have missed the new
        // connection; take it back out.
        if self.is_disposed() {
            if let Some(connection) = self.current.swap(None) {
                connection.close();
            }
            return Err(Error::Disposed);
        }

        self.ping.schedule_next();
        self.options.log("LogicalConnectionManager: Connected...");
        self.start_ping_timer();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        match self.lock.try_read_for(self.options.connection.connect_timeout) {
            Some(_guard) => self.current_is_connected(),
            None => false,
        }
    }

    fn state(&self) -> ConnectionState {
        if self.is_disposed() {
            ConnectionState::Disposed
        } else if self.connecting.load(Ordering::SeqCst) {
            ConnectionState::Connecting
        } else if self.current_is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn send<R: Request>(self: &Arc<Self>, request: &R) -> Result<Response, Error> {
        self.connect()?;

        let connection = self.current.load_full().ok_or_else(|| {
            if self.is_disposed() {
                Error::Disposed
            } else {
                Error::NotConnected
            }
        })?;
        let response = connection.send_request(request)?;

        self.ping.schedule_next();
        Ok(response)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("disposing connection");
        self.options.log("LogicalConnectionManager: Disposing...");
        self.options.flush_log();

        if let Some(connection) = self.current.swap(None) {
            connection.close();
        }
        // The timer thread may be waiting on `self.timer` itself; release it
        // before joining.
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.stop();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn current_is_connected(&self) -> bool {
        let current = self.current.load();
        (*current)
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    fn start_ping_timer(self: &Arc<Self>) {
        if !self.ping.is_enabled() {
            return;
        }

        let mut timer = self.timer.lock();
        if timer.is_some() || self.is_disposed() {
            return;
        }

        let manager = Arc::downgrade(self);
        let started = PingTimer::start(PING_TIMER_INTERVAL, move || {
            let Some(manager) = manager.upgrade() else {
                return false;
            };
            manager.check_ping();
            !manager.is_disposed()
        });

        match started {
            Ok(started) => *timer = Some(started),
            Err(e) => warn!("failed to start ping timer: {e}"),
        }
    }

    /// A failed ping is only logged. A dead connection surfaces on the next
    /// request, which also reconnects.
    fn check_ping(self: &Arc<Self>) {
        if self.is_disposed() || !self.ping.is_due() {
            return;
        }

        trace!("sending keep-alive ping");
        match self.send(&PingRequest) {
            Ok(_) => {}
            Err(e) if e.is_connection_error() => debug!("keep-alive ping failed: {e}"),
            Err(e) => warn!("keep-alive ping rejected: {e}"),
        }
    }
}

/// Copy of a connect failure handed to callers that waited on the attempt.
fn duplicate(error: &Error) -> Error {
    match error {
        Error::Transport(e) => Error::Transport(std::io::Error::new(e.kind(), e.to_string())),
        Error::Greeting(banner) => Error::Greeting(banner.clone()),
        Error::InvalidAddress { input, reason } => Error::InvalidAddress {
            input: input.clone(),
            reason: reason.clone(),
        },
        Error::Disposed => Error::Disposed,
        Error::Codec(e) => Error::Codec(CodecError::Frame(e.to_string())),
        _ => Error::NotConnected,
    }
}
