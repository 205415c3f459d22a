use std::{
    io,
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::debug;
use parking_lot::Mutex;

/// How often the timer thread checks whether a keep-alive ping is due.
pub(crate) const PING_TIMER_INTERVAL: Duration = Duration::from_millis(100);

/// Tracks when the next idle keep-alive ping is due.
#[derive(Debug)]
pub struct PingScheduler {
    interval: Option<Duration>,
    next_ping: Mutex<Option<Instant>>,
}

impl PingScheduler {
    /// `None` disables keep-alive entirely.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval.filter(|i| !i.is_zero()),
            next_ping: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Pushes the next ping one interval past the last successful send.
    pub fn schedule_next(&self) {
        self.schedule_next_at(Instant::now());
    }

    pub fn schedule_next_at(&self, now: Instant) {
        if let Some(interval) = self.interval {
            *self.next_ping.lock() = Some(now + interval);
        }
    }

    pub fn is_due(&self) -> bool {
        self.is_due_at(Instant::now())
    }

    /// Never due when disabled; always due before the first send.
    pub fn is_due_at(&self, now: Instant) -> bool {
        if self.interval.is_none() {
            return false;
        }
        self.next_ping.lock().is_none_or(|next| now >= next)
    }
}

/// Background thread calling `on_tick` at a fixed period until stopped, or
/// until `on_tick` returns `false`.
#[derive(Debug)]
pub(crate) struct PingTimer {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PingTimer {
    pub fn start<F>(period: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("tarn-ping".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !on_tick() {
                                break;
                            }
                        }
                        // Either an explicit stop or the timer was dropped.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("ping timer stopped");
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop.take());

        if let Some(thread) = self.thread.take() {
            // The last owner may be the timer thread itself.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for PingTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
