use rmpv::Value;
use serde::de::DeserializeOwned;

use crate::{CodecError, Error};

use super::{
    consts::{DATA, ERROR, ERROR_24, ERROR_FLAG, ERROR_MESSAGE, ERROR_STACK, REQUEST_TYPE, SCHEMA_VERSION},
    transport::{Frame, map_get},
};

/// The part of a response header the connection needs to dispatch a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub code: u32,
    pub sync: u64,
    pub schema_version: Option<u64>,
}

impl ResponseHeader {
    pub fn decode(frame: &Frame) -> Result<Self, CodecError> {
        let code = frame
            .header_field(REQUEST_TYPE)
            .and_then(Value::as_u64)
            .ok_or_else(|| CodecError::Frame("response header has no code".to_string()))?;
        let sync = frame
            .sync()
            .ok_or_else(|| CodecError::Frame("response header has no sync".to_string()))?;
        let schema_version = frame.header_field(SCHEMA_VERSION).and_then(Value::as_u64);

        Ok(Self {
            code: code as u32,
            sync,
            schema_version,
        })
    }

    pub fn is_error(&self) -> bool {
        self.code & ERROR_FLAG != 0
    }

    /// Turns an error response into [`Error::Protocol`], passing successful
    /// bodies through untouched.
    pub fn into_result(self, body: Value) -> Result<Value, Error> {
        if !self.is_error() {
            return Ok(body);
        }

        Err(Error::Protocol {
            code: self.code & !ERROR_FLAG,
            message: error_message(&body),
        })
    }
}

/// Prefers the extended error stack, falling back to the plain error string.
fn error_message(body: &Value) -> String {
    let extended = map_get(body, ERROR)
        .and_then(|e| map_get(e, ERROR_STACK))
        .and_then(Value::as_array)
        .and_then(|stack| stack.first())
        .and_then(|e| map_get(e, ERROR_MESSAGE))
        .and_then(Value::as_str);

    extended
        .or_else(|| map_get(body, ERROR_24).and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string()
}

/// Successful response carrying a data array.
#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse<T> {
    pub data: Vec<T>,
    pub schema_version: Option<u64>,
}

impl<T: DeserializeOwned> DataResponse<T> {
    pub fn decode(body: Value, schema_version: Option<u64>) -> Result<Self, Error> {
        let items = match body {
            Value::Map(entries) => entries
                .into_iter()
                .find(|(k, _)| k.as_u64() == Some(u64::from(DATA)))
                .map(|(_, v)| v)
                .unwrap_or(Value::Array(Vec::new())),
            other => {
                return Err(CodecError::Frame(format!("response body is not a map: {other}")).into());
            }
        };

        let Value::Array(items) = items else {
            return Err(CodecError::Frame(format!("response data is not an array: {items}")).into());
        };

        let data = items
            .into_iter()
            .map(|item| rmpv::ext::from_value(item).map_err(|e| CodecError::Value(e.to_string())))
            .collect::<Result<Vec<T>, _>>()?;

        Ok(Self {
            data,
            schema_version,
        })
    }
}
