//! One live socket and the machinery around it.
//!
//! A [`PhysicalConnection`] is created already connected: the socket is open
//! and the server greeting has been read. From then on a dedicated reader
//! thread demultiplexes incoming frames by their `sync` id into the pending
//! table, while callers write their frames one at a time through a lock. When
//! the reader thread stops (peer closed the socket, read error, or
//! [`PhysicalConnection::close`]), every request still waiting is failed with
//! [`Error::ConnectionLost`] and the connection reports itself as not live.
use std::{
    io::{self, BufReader},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use crate::{
    Error,
    options::{ConnectionOptions, Endpoint},
    protocol::{
        Greeting, Request, ResponseHeader,
        transport::{Frame, ProtocolTransport, request_header},
    },
};

use super::{
    RequestIdCounter,
    pending::{PendingRequests, Response},
};

#[derive(Debug)]
struct Shared {
    pending: PendingRequests,
    alive: AtomicBool,
}

#[derive(Debug)]
pub struct PhysicalConnection {
    endpoint: Endpoint,
    greeting: Greeting,
    socket: TcpStream,
    writer: Mutex<ProtocolTransport<TcpStream>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
    request_ids: Arc<RequestIdCounter>,
    request_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl PhysicalConnection {
    /// Connects to the first reachable node, in configuration order.
    pub fn connect(
        options: &ConnectionOptions,
        request_ids: Arc<RequestIdCounter>,
    ) -> Result<Self, Error> {
        let mut last_error = Error::NotConnected;

        for endpoint in &options.nodes {
            match open(endpoint, options.connect_timeout) {
                Ok((socket, greeting)) => {
                    return Self::start(
                        endpoint.clone(),
                        socket,
                        greeting,
                        request_ids,
                        options.request_timeout,
                    );
                }
                Err(e) => {
                    warn!("failed to connect to {endpoint}: {e}");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn start(
        endpoint: Endpoint,
        socket: TcpStream,
        greeting: Greeting,
        request_ids: Arc<RequestIdCounter>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let shared = Arc::new(Shared {
            pending: PendingRequests::new(),
            alive: AtomicBool::new(true),
        });

        let writer = ProtocolTransport::new(socket.try_clone()?);
        let transport = ProtocolTransport::new(BufReader::new(socket.try_clone()?));
        let reader = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("tarn-reader-{}", endpoint.address()))
                .spawn(move || read_loop(transport, shared))?
        };

        info!("connected to {endpoint} ({})", greeting.version);
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            endpoint,
            greeting,
            socket,
            shared,
            request_ids,
            request_timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn greeting(&self) -> &Greeting {
        &self.greeting
    }

    /// The socket is open and the reader thread is still running.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.shared.alive.load(Ordering::SeqCst)
            && !self.shared.pending.is_closed()
    }

    /// Number of requests currently waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Sends `request` and blocks until its response (or a failure) arrives.
    pub(crate) fn send_request<R: Request>(&self, request: &R) -> Result<Response, Error> {
        let body = request.encode_body()?;
        let code = request.request_type().code();

        // Registered before writing: the response may race the write.
        let ticket = self.shared.pending.register(&self.request_ids)?;
        let frame = Frame::new(request_header(code, ticket.id), body);
        trace!("sending request {} (type {code:#x})", ticket.id);

        if let Err(e) = self.writer.lock().write_frame(&frame) {
            self.shared.pending.cancel(ticket.id);
            if let Error::Transport(io) = &e {
                warn!("write to {} failed: {io}", self.endpoint);
                self.shutdown();
            }
            return Err(e);
        }

        ticket.wait(&self.shared.pending, self.request_timeout)
    }

    /// Closes the socket and waits for the reader thread to drain the pending
    /// table. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("closing connection to {}", self.endpoint);
        self.shutdown();
        if let Some(reader) = self.reader.lock().take() {
            if reader.join().is_err() {
                warn!("reader thread for {} panicked", self.endpoint);
            }
        }
    }

    fn shutdown(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                debug!("shutdown of {} failed: {e}", self.endpoint);
            }
        }
    }
}

impl Drop for PhysicalConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn open(endpoint: &Endpoint, timeout: Duration) -> Result<(TcpStream, Greeting), Error> {
    if let Some(user) = &endpoint.user {
        debug!("credentials for '{user}' are not used, authentication is not supported");
    }

    let mut last_error = None;
    for address in endpoint.address().to_socket_addrs()? {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(mut socket) => {
                socket.set_nodelay(true)?;
                socket.set_read_timeout(Some(timeout))?;
                let greeting = Greeting::read_from(&mut socket)?;
                socket.set_read_timeout(None)?;
                // A peer that stops reading must not wedge the writer lock.
                socket.set_write_timeout(Some(timeout))?;
                return Ok((socket, greeting));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error
        .map(Error::Transport)
        .unwrap_or_else(|| {
            Error::Transport(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("'{}' resolved to no addresses", endpoint.address()),
            ))
        }))
}

fn read_loop(mut transport: ProtocolTransport<BufReader<TcpStream>>, shared: Arc<Shared>) {
    loop {
        let frame = match transport.read_frame() {
            Ok(frame) => frame,
            Err(Error::Transport(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("stream closed");
                break;
            }
            Err(e) => {
                debug!("read loop stopped: {e}");
                break;
            }
        };

        let header = match ResponseHeader::decode(&frame) {
            Ok(header) => header,
            Err(e) => {
                warn!("dropping frame: {e}");
                continue;
            }
        };

        let reply = header.into_result(frame.body).map(|body| Response {
            schema_version: header.schema_version,
            body,
        });
        if !shared.pending.resolve(header.sync, reply) {
            warn!("no request is waiting for sync {}", header.sync);
        }
    }

    shared.alive.store(false, Ordering::SeqCst);
    let failed = shared.pending.fail_all();
    if failed > 0 {
        warn!("connection lost with {failed} requests in flight");
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Instant};

    use rmpv::Value;

    use crate::{
        ClientOptions,
        protocol::{EvalRequest, PingRequest, server::{Mode, StubServer}},
    };

    use super::*;

    fn connect(server: &StubServer) -> PhysicalConnection {
        let options = ClientOptions::new(&server.address()).unwrap();
        PhysicalConnection::connect(&options.connection, Arc::new(RequestIdCounter::new())).unwrap()
    }

    #[test]
    fn connect_reads_greeting() {
        let server = StubServer::start(Mode::Echo);
        let connection = connect(&server);

        assert!(connection.is_connected());
        assert!(connection.greeting().version.starts_with("Tarantool"));
        assert_eq!(connection.endpoint().address(), server.address());
    }

    #[test]
    fn connect_falls_through_to_next_node() {
        let server = StubServer::start(Mode::Echo);
        let options = ClientOptions::new(&format!("{},{}", StubServer::unused_address(), server.address()))
            .unwrap();

        let connection =
            PhysicalConnection::connect(&options.connection, Arc::new(RequestIdCounter::new()))
                .unwrap();
        assert_eq!(connection.endpoint().address(), server.address());
    }

    #[test]
    fn connect_refused() {
        let options = ClientOptions::new(&StubServer::unused_address()).unwrap();
        let res = PhysicalConnection::connect(&options.connection, Arc::new(RequestIdCounter::new()));
        assert!(matches!(res, Err(Error::Transport(_))));
    }

    #[test]
    fn send_and_receive() {
        let server = StubServer::start(Mode::Echo);
        let connection = connect(&server);

        let response = connection
            .send_request(&EvalRequest::new("return ...", (1, 2)))
            .unwrap();
        assert_eq!(
            crate::protocol::transport::map_get(&response.body, 0x30),
            Some(&Value::Array(vec![1.into(), 2.into()]))
        );
        connection.send_request(&PingRequest).unwrap();
        assert_eq!(connection.pending_requests(), 0);
    }

    #[test]
    fn close_fails_requests_in_flight() {
        let server = StubServer::start(Mode::Silent);
        let connection = Arc::new(connect(&server));

        let waiter = {
            let connection = Arc::clone(&connection);
            thread::spawn(move || connection.send_request(&PingRequest))
        };
        server.wait_for_requests(1);

        connection.close();
        assert!(matches!(waiter.join().unwrap(), Err(Error::ConnectionLost)));
        assert!(!connection.is_connected());

        // Closing twice is a no-op.
        connection.close();
    }

    #[test]
    fn write_to_stalled_peer_times_out() {
        let server = StubServer::start(Mode::Stalled);
        let options = ClientOptions::new(&server.address())
            .unwrap()
            .with_connect_timeout(Duration::from_millis(200));
        let connection =
            PhysicalConnection::connect(&options.connection, Arc::new(RequestIdCounter::new()))
                .unwrap();

        // Far more than the socket buffers on both ends can hold.
        let payload = "x".repeat(32 * 1024 * 1024);
        let started = Instant::now();
        let res = connection.send_request(&EvalRequest::new("return ...", (payload,)));

        assert!(matches!(res, Err(Error::Transport(_))), "{res:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!connection.is_connected());
    }

    #[test]
    fn peer_close_marks_connection_dead() {
        let server = StubServer::start(Mode::Echo);
        let connection = connect(&server);

        server.drop_connections();
        let deadline = Instant::now() + Duration::from_secs(5);
        while connection.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert!(!connection.is_connected());
        assert!(connection.send_request(&PingRequest).is_err());
    }
}
