use rmpv::Value;
use serde::Serialize;

use crate::{CodecError, Error};

use super::consts::{EXPR, FUNCTION_NAME, TUPLE};

/// Request type codes understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Call16,
    Eval,
    Call,
    Ping,
    /// Any other code, for requests built by hand.
    Other(u32),
}

impl RequestType {
    pub fn code(self) -> u32 {
        match self {
            RequestType::Call16 => 0x06,
            RequestType::Eval => 0x08,
            RequestType::Call => 0x0a,
            RequestType::Ping => 0x40,
            RequestType::Other(code) => code,
        }
    }
}

impl From<u32> for RequestType {
    fn from(code: u32) -> Self {
        match code {
            0x06 => RequestType::Call16,
            0x08 => RequestType::Eval,
            0x0a => RequestType::Call,
            0x40 => RequestType::Ping,
            code => RequestType::Other(code),
        }
    }
}

/// A request the connection can send. The connection owns the header
/// (type code and correlation id); implementors only produce the body.
pub trait Request {
    fn request_type(&self) -> RequestType;

    fn encode_body(&self) -> Result<Value, Error>;
}

impl<R: Request + ?Sized> Request for &R {
    fn request_type(&self) -> RequestType {
        (**self).request_type()
    }

    fn encode_body(&self) -> Result<Value, Error> {
        (**self).encode_body()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PingRequest;

impl Request for PingRequest {
    fn request_type(&self) -> RequestType {
        RequestType::Ping
    }

    fn encode_body(&self) -> Result<Value, Error> {
        Ok(Value::Map(Vec::new()))
    }
}

/// Stored procedure call. `call_16` selects the pre-1.7 calling convention
/// where every returned value is wrapped into a tuple.
#[derive(Debug, Clone)]
pub struct CallRequest<T> {
    pub function_name: String,
    pub args: T,
    pub call_16: bool,
}

impl<T> CallRequest<T> {
    pub fn new(function_name: impl Into<String>, args: T) -> Self {
        Self {
            function_name: function_name.into(),
            args,
            call_16: false,
        }
    }

    pub fn new_16(function_name: impl Into<String>, args: T) -> Self {
        Self {
            call_16: true,
            ..Self::new(function_name, args)
        }
    }
}

impl<T: Serialize> Request for CallRequest<T> {
    fn request_type(&self) -> RequestType {
        if self.call_16 {
            RequestType::Call16
        } else {
            RequestType::Call
        }
    }

    fn encode_body(&self) -> Result<Value, Error> {
        Ok(Value::Map(vec![
            (
                Value::from(FUNCTION_NAME),
                Value::from(self.function_name.as_str()),
            ),
            (Value::from(TUPLE), encode_tuple(&self.args)?),
        ]))
    }
}

/// Lua expression evaluation; arguments are visible as `...`.
#[derive(Debug, Clone)]
pub struct EvalRequest<T> {
    pub expression: String,
    pub args: T,
}

impl<T> EvalRequest<T> {
    pub fn new(expression: impl Into<String>, args: T) -> Self {
        Self {
            expression: expression.into(),
            args,
        }
    }
}

impl<T: Serialize> Request for EvalRequest<T> {
    fn request_type(&self) -> RequestType {
        RequestType::Eval
    }

    fn encode_body(&self) -> Result<Value, Error> {
        Ok(Value::Map(vec![
            (Value::from(EXPR), Value::from(self.expression.as_str())),
            (Value::from(TUPLE), encode_tuple(&self.args)?),
        ]))
    }
}

/// Request with an arbitrary type code and a prebuilt body.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub request_type: RequestType,
    pub body: Value,
}

impl RawRequest {
    pub fn new(request_type: impl Into<RequestType>, body: Value) -> Self {
        Self {
            request_type: request_type.into(),
            body,
        }
    }
}

impl Request for RawRequest {
    fn request_type(&self) -> RequestType {
        self.request_type
    }

    fn encode_body(&self) -> Result<Value, Error> {
        Ok(self.body.clone())
    }
}

/// Arguments always travel as an array: `()` becomes `[]` and a lone scalar
/// becomes a single element array.
fn encode_tuple<T: Serialize>(args: &T) -> Result<Value, Error> {
    let value = rmpv::ext::to_value(args).map_err(|e| CodecError::Value(e.to_string()))?;
    Ok(match value {
        Value::Array(_) => value,
        Value::Nil => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    })
}

#[cfg(test)]
mod tests {
    use crate::protocol::transport::map_get;

    use super::*;

    #[test]
    fn request_type_codes() {
        for ty in [
            RequestType::Call16,
            RequestType::Eval,
            RequestType::Call,
            RequestType::Ping,
            RequestType::Other(0x01),
        ] {
            assert_eq!(RequestType::from(ty.code()), ty);
        }
    }

    #[test]
    fn call_request_body() {
        let request = CallRequest::new("box.info", (1, "two"));
        assert_eq!(request.request_type(), RequestType::Call);

        let body = request.encode_body().unwrap();
        assert_eq!(
            map_get(&body, FUNCTION_NAME).and_then(Value::as_str),
            Some("box.info")
        );
        assert_eq!(
            map_get(&body, TUPLE),
            Some(&Value::Array(vec![1.into(), "two".into()]))
        );
    }

    #[test]
    fn call_16_request_type() {
        let request = CallRequest::new_16("legacy", ());
        assert_eq!(request.request_type(), RequestType::Call16);
        assert_eq!(request.function_name, "legacy");
    }

    #[test]
    fn eval_request_normalizes_args() {
        let body = EvalRequest::new("return ...", ()).encode_body().unwrap();
        assert_eq!(map_get(&body, EXPR).and_then(Value::as_str), Some("return ..."));
        assert_eq!(map_get(&body, TUPLE), Some(&Value::Array(vec![])));

        let body = EvalRequest::new("return ...", 42).encode_body().unwrap();
        assert_eq!(map_get(&body, TUPLE), Some(&Value::Array(vec![42.into()])));
    }

    #[test]
    fn ping_request_has_empty_body() {
        assert_eq!(PingRequest.request_type(), RequestType::Ping);
        assert_eq!(PingRequest.encode_body().unwrap(), Value::Map(vec![]));
    }
}
