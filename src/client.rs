//! High-level client.
//!
//! [`Client`] is a thin typed layer over a [`LogicalConnectionManager`]: it
//! builds `call`/`eval`/`ping` requests and decodes their data arrays with
//! `serde`. It never needs an explicit [`Client::connect`]; the first request
//! opens the connection, and a dropped connection is re-established by the
//! next request.
//!
//! # Example
//! ```no_run
//! use tarn::Client;
//!
//! let client = Client::connect_to("localhost:3301").unwrap();
//!
//! let sum = client.eval::<_, i64>("return ... + 1", (41,)).unwrap();
//! assert_eq!(sum.data, vec![42]);
//!
//! client.dispose();
//! ```
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    ClientOptions, DataResponse, Error, LogicalConnectionManager,
    protocol::{CallRequest, EvalRequest, PingRequest},
};

#[derive(Debug)]
pub struct Client {
    options: Arc<ClientOptions>,
    connection: LogicalConnectionManager,
    disposed: AtomicBool,
}

impl Client {
    pub fn new(options: ClientOptions) -> Self {
        let options = Arc::new(options);
        Self {
            connection: LogicalConnectionManager::new(Arc::clone(&options)),
            options,
            disposed: AtomicBool::new(false),
        }
    }

    /// Builds a client from a connection string and connects it.
    pub fn connect_to(connection_string: &str) -> Result<Self, Error> {
        let client = Self::new(ClientOptions::new(connection_string)?);
        client.connect()?;
        Ok(client)
    }

    pub fn connect(&self) -> Result<(), Error> {
        self.connection.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &LogicalConnectionManager {
        &self.connection
    }

    pub fn ping(&self) -> Result<(), Error> {
        self.connection.send_request_no_response(&PingRequest)
    }

    pub fn call<A, T>(&self, function_name: &str, args: A) -> Result<DataResponse<T>, Error>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        self.connection
            .send_request(&CallRequest::new(function_name, args))
    }

    /// Pre-1.7 call convention; every returned value arrives wrapped in a tuple.
    pub fn call_16<A, T>(&self, function_name: &str, args: A) -> Result<DataResponse<T>, Error>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        self.connection
            .send_request(&CallRequest::new_16(function_name, args))
    }

    pub fn eval<A, T>(&self, expression: &str, args: A) -> Result<DataResponse<T>, Error>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        self.connection
            .send_request(&EvalRequest::new(expression, args))
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.options.log("Client is disposing...");
        self.options.flush_log();
        self.connection.dispose();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.connection.dispose();
    }
}
