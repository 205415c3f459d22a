//! Numeric keys and codes of the IPROTO protocol.

// Header keys
pub const REQUEST_TYPE: u8 = 0x00;
pub const SYNC: u8 = 0x01;
pub const SCHEMA_VERSION: u8 = 0x05;

// Body keys
pub const TUPLE: u8 = 0x21;
pub const FUNCTION_NAME: u8 = 0x22;
pub const EXPR: u8 = 0x27;
pub const DATA: u8 = 0x30;
pub const ERROR_24: u8 = 0x31;
pub const ERROR: u8 = 0x52;

// Keys inside an extended error (`ERROR`) entry
pub const ERROR_STACK: u8 = 0x00;
pub const ERROR_MESSAGE: u8 = 0x03;

/// Set on the response code when the server reports a failure.
pub const ERROR_FLAG: u32 = 0x8000;
pub const OK: u32 = 0x00;
