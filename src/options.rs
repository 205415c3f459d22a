//! Client configuration.
//!
//! A [`ClientOptions`] is built once from a connection string and then shared
//! immutably by the connection machinery. The connection string accepts a
//! single node (`host:port`), a node with credentials
//! (`user:password@host:port`), or a comma-separated list of nodes which are
//! tried in order on every connect.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tarn::ClientOptions;
//!
//! let options = ClientOptions::new("guest@localhost:3301")
//!     .unwrap()
//!     .with_ping_check_interval(0)
//!     .with_connect_timeout(Duration::from_millis(500));
//!
//! assert_eq!(options.connection.nodes[0].port, 3301);
//! assert_eq!(options.connection.ping_check_interval(), None);
//! ```
use std::{
    fmt,
    io::Write,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use crate::Error;

pub(crate) const DEFAULT_PING_CHECK_INTERVAL: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// A single server address, optionally carrying credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Endpoint {
    /// `host:port` form suitable for socket address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Passwords never end up in logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{user}@{}", self.address()),
            None => f.write_str(&self.address()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidAddress {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let s = input.trim();
        let (credentials, address) = match s.rsplit_once('@') {
            Some((credentials, address)) => (Some(credentials), address),
            None => (None, s),
        };

        let (user, password) = match credentials {
            Some(c) => match c.split_once(':') {
                Some((user, password)) => (user, Some(password.to_string())),
                None => (c, None),
            },
            None => ("", None),
        };
        if credentials.is_some() && user.is_empty() {
            return Err(invalid("user name is empty"));
        }

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected 'host:port'"))?;
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port should be an integer between 0 and 65535"))?;

        Ok(Self {
            host: host.to_string(),
            port,
            user: credentials.map(|_| user.to_string()),
            password,
        })
    }
}

/// Optional diagnostic writer. Lines are written and flushed on a best-effort
/// basis; failures are ignored.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<dyn Write + Send>>,
}

impl LogSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn write_line(&self, line: &str) {
        let _ = writeln!(self.inner.lock(), "{line}");
    }

    pub fn flush(&self) {
        let _ = self.inner.lock().flush();
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSink")
    }
}

/// Settings consumed by the connection layer.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub nodes: Vec<Endpoint>,
    /// `<0` keeps the default interval, `0` disables keep-alive, `>0` is an
    /// interval in milliseconds.
    pub ping_check_interval_ms: i64,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
}

impl ConnectionOptions {
    /// Effective keep-alive interval, `None` when keep-alive is disabled.
    pub fn ping_check_interval(&self) -> Option<Duration> {
        match self.ping_check_interval_ms {
            ms if ms < 0 => Some(DEFAULT_PING_CHECK_INTERVAL),
            0 => None,
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }

    /// Longest a single connect attempt can take: a TCP connect and a
    /// greeting read per node, plus one more timeout of slack for starting
    /// the connection.
    pub fn connect_attempt_budget(&self) -> Duration {
        let steps = 2 * self.nodes.len().max(1) as u32 + 1;
        self.connect_timeout.saturating_mul(steps)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connection: ConnectionOptions,
    pub log_sink: Option<LogSink>,
}

impl ClientOptions {
    pub fn new(connection_string: &str) -> Result<Self, Error> {
        let nodes = connection_string
            .split(',')
            .filter(|node| !node.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Endpoint>, _>>()?;

        if nodes.is_empty() {
            return Err(Error::InvalidAddress {
                input: connection_string.to_string(),
                reason: "no nodes given".to_string(),
            });
        }

        Ok(Self {
            connection: ConnectionOptions {
                nodes,
                ping_check_interval_ms: -1,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                request_timeout: None,
            },
            log_sink: None,
        })
    }

    pub fn with_ping_check_interval(mut self, ms: i64) -> Self {
        self.connection.ping_check_interval_ms = ms;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connection.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.connection.request_timeout = Some(timeout);
        self
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub(crate) fn log(&self, line: &str) {
        if let Some(sink) = &self.log_sink {
            sink.write_line(line);
        }
    }

    pub(crate) fn flush_log(&self) {
        if let Some(sink) = &self.log_sink {
            sink.flush();
        }
    }
}

impl FromStr for ClientOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
