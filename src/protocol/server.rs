//! In-process IPROTO server used by the tests.
use std::{
    io::Write,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use parking_lot::Mutex;
use rmpv::Value;

use crate::Error;

use super::{
    Greeting, RequestType,
    consts::{DATA, ERROR_24, ERROR_FLAG, EXPR, OK, REQUEST_TYPE, TUPLE},
    transport::{Frame, ProtocolTransport, response_header},
};

const SCHEMA_VERSION: u64 = 1;
/// How long `Mute` and `Stalled` connections stay open without any traffic.
const HOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Answer every request right away.
    Echo,
    /// Hold answers until this many requests arrived on a connection, then
    /// send them back last-in first-out.
    Reverse(usize),
    /// Read requests, never answer.
    Silent,
    /// Accept the socket but never send the greeting.
    Mute,
    /// Send the greeting, then stop reading altogether.
    Stalled,
}

#[derive(Debug, Default)]
struct Stats {
    connections: AtomicUsize,
    requests: AtomicUsize,
    pings: AtomicUsize,
}

pub(crate) struct StubServer {
    address: SocketAddr,
    stats: Arc<Stats>,
    streams: Arc<Mutex<Vec<TcpStream>>>,
}

impl StubServer {
    pub fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind stub server");
        let address = listener.local_addr().expect("stub server has no address");
        let stats = Arc::new(Stats::default());
        let streams = Arc::new(Mutex::new(Vec::new()));

        info!("stub server listening at {address}");
        {
            let stats = Arc::clone(&stats);
            let streams = Arc::clone(&streams);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            stats.connections.fetch_add(1, Ordering::SeqCst);
                            if let Ok(clone) = stream.try_clone() {
                                streams.lock().push(clone);
                            }
                            let stats = Arc::clone(&stats);
                            thread::spawn(move || {
                                if let Err(e) = handle_connection(stream, mode, stats) {
                                    debug!("stub connection ended: {e}");
                                }
                            });
                        }
                        Err(e) => warn!("broken connection: {e:?}"),
                    }
                }
            });
        }

        Self {
            address,
            stats,
            streams,
        }
    }

    /// An address nobody listens on.
    pub fn unused_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        listener.local_addr().expect("no address").to_string()
    }

    pub fn address(&self) -> String {
        self.address.to_string()
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.stats.requests.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.stats.pings.load(Ordering::SeqCst)
    }

    /// Blocks until at least `n` requests were read.
    pub fn wait_for_requests(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.requests() < n {
            assert!(Instant::now() < deadline, "stub server got no requests");
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Kills every accepted socket, as a crashed server would.
    pub fn drop_connections(&self) {
        for stream in self.streams.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

fn handle_connection(mut stream: TcpStream, mode: Mode, stats: Arc<Stats>) -> Result<(), Error> {
    let greeting = Greeting {
        version: "Tarantool 2.11.1 (Binary) 00000000-0000-0000-0000-000000000000".to_string(),
        salt: "c3R1Yi1zZXJ2ZXItc2FsdA==".to_string(),
    };
    if mode == Mode::Mute {
        thread::sleep(HOLD);
        return Ok(());
    }

    stream.write_all(&greeting.encode())?;
    if mode == Mode::Stalled {
        thread::sleep(HOLD);
        return Ok(());
    }

    let mut transport = ProtocolTransport::new(stream);

    let mut held = Vec::new();
    loop {
        let request = transport.read_frame()?;
        stats.requests.fetch_add(1, Ordering::SeqCst);

        let response = respond(&request, &stats);
        match mode {
            Mode::Echo => transport.write_frame(&response)?,
            Mode::Silent | Mode::Mute | Mode::Stalled => {}
            Mode::Reverse(batch) => {
                held.push(response);
                if held.len() >= batch {
                    while let Some(response) = held.pop() {
                        transport.write_frame(&response)?;
                    }
                }
            }
        }
    }
}

fn respond(request: &Frame, stats: &Stats) -> Frame {
    let sync = request.sync().unwrap_or_default();
    let code = request
        .header_field(REQUEST_TYPE)
        .and_then(Value::as_u64)
        .unwrap_or_default() as u32;

    let ok = |data: Value| {
        Frame::new(
            response_header(OK, sync, SCHEMA_VERSION),
            Value::Map(vec![(Value::from(DATA), data)]),
        )
    };
    let fail = |errcode: u32, message: &str| {
        Frame::new(
            response_header(ERROR_FLAG | errcode, sync, SCHEMA_VERSION),
            Value::Map(vec![(Value::from(ERROR_24), Value::from(message))]),
        )
    };
    let args = request.body_field(TUPLE).cloned().unwrap_or(Value::Array(vec![]));

    match RequestType::from(code) {
        RequestType::Ping => {
            stats.pings.fetch_add(1, Ordering::SeqCst);
            Frame::new(response_header(OK, sync, SCHEMA_VERSION), Value::Map(vec![]))
        }
        RequestType::Eval
            if request.body_field(EXPR).and_then(Value::as_str) == Some("error") =>
        {
            fail(0x20, "stub failure")
        }
        RequestType::Eval | RequestType::Call | RequestType::Call16 => ok(args),
        RequestType::Other(code) => fail(0x30, &format!("unknown request type {code}")),
    }
}
