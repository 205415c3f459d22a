//! Length-prefixed frame reader/writer.
//!
//! [`ProtocolTransport`] wraps one side of a stream: the client keeps a
//! reading transport on its reader thread and a writing transport behind a
//! lock, while a server can use a single transport for both directions.
use std::io::{self, Cursor, Read, Write};

use log::trace;
use rmpv::Value;

use crate::{CodecError, Error};

use super::consts::{REQUEST_TYPE, SCHEMA_VERSION, SYNC};

const LENGTH_PREFIX_SIZE: usize = 5;

/// Largest frame payload accepted from the peer.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// A decoded header/body pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: Value,
    pub body: Value,
}

impl Frame {
    pub fn new(header: Value, body: Value) -> Self {
        Self { header, body }
    }

    /// Looks up an integer-keyed entry of the header map.
    pub fn header_field(&self, key: u8) -> Option<&Value> {
        map_get(&self.header, key)
    }

    /// Looks up an integer-keyed entry of the body map.
    pub fn body_field(&self, key: u8) -> Option<&Value> {
        map_get(&self.body, key)
    }

    pub fn sync(&self) -> Option<u64> {
        self.header_field(SYNC).and_then(Value::as_u64)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = Vec::new();
        rmpv::encode::write_value(&mut payload, &self.header)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        rmpv::encode::write_value(&mut payload, &self.body)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::Frame(format!("{} bytes frame is too large", payload.len())))?;

        let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
        buf.push(0xce);
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(payload);
        let header = rmpv::decode::read_value(&mut cursor)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        if !header.is_map() {
            return Err(CodecError::Frame(format!("header is not a map: {header}")));
        }

        // Some responses (e.g. to a ping) carry no body at all.
        let body = if (cursor.position() as usize) < payload.len() {
            rmpv::decode::read_value(&mut cursor)
                .map_err(|e| CodecError::Decode(e.to_string()))?
        } else {
            Value::Map(Vec::new())
        };

        Ok(Self { header, body })
    }
}

/// Builds a request header map.
pub fn request_header(request_type: u32, sync: u64) -> Value {
    Value::Map(vec![
        (Value::from(REQUEST_TYPE), Value::from(request_type)),
        (Value::from(SYNC), Value::from(sync)),
    ])
}

/// Builds a response header map, as a server would send it.
pub fn response_header(code: u32, sync: u64, schema_version: u64) -> Value {
    Value::Map(vec![
        (Value::from(REQUEST_TYPE), Value::from(code)),
        (Value::from(SYNC), Value::from(sync)),
        (Value::from(SCHEMA_VERSION), Value::from(schema_version)),
    ])
}

pub(crate) fn map_get(map: &Value, key: u8) -> Option<&Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(u64::from(key)))
        .map(|(_, v)| v)
}

#[derive(Debug)]
pub struct ProtocolTransport<T> {
    stream: T,
}

impl<T> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }
}

impl<T: Write> ProtocolTransport<T> {
    /// Writes the whole frame with a single `write_all`, so a frame is never
    /// split by another writer holding the same stream behind a lock.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        let buf = frame.encode()?;
        trace!("writing {} bytes frame", buf.len());
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }
}

impl<T: Read> ProtocolTransport<T> {
    pub fn read_frame(&mut self) -> Result<Frame, Error> {
        let len = self.read_length()?;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;
        trace!("read {len} bytes frame");
        Ok(Frame::decode(&payload)?)
    }

    /// Reads the MessagePack unsigned integer that prefixes every frame.
    fn read_length(&mut self) -> Result<usize, Error> {
        let mut marker = [0u8; 1];
        self.stream.read_exact(&mut marker)?;

        let len = match marker[0] {
            m @ 0x00..=0x7f => u64::from(m),
            0xcc => u64::from(self.read_array::<1>()?[0]),
            0xcd => u64::from(u16::from_be_bytes(self.read_array::<2>()?)),
            0xce => u64::from(u32::from_be_bytes(self.read_array::<4>()?)),
            0xcf => u64::from_be_bytes(self.read_array::<8>()?),
            m => {
                return Err(CodecError::Frame(format!("unexpected length marker {m:#04x}")).into());
            }
        };

        if len > MAX_FRAME_SIZE as u64 {
            return Err(CodecError::Frame(format!("{len} bytes frame is too large")).into());
        }
        Ok(len as usize)
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }
}
