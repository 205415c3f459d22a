//! CLI utilities for tarn.
//!
//! The utilities present in this module back the interactive console: a
//! prompt that reads one line at a time and turns it into a [`Command`].
//!
//! - `.exit`: Close the session (end of input does the same).
//! - `.ping`: Send a ping.
//! - `.status`: Print the connection state.
//! - `.call <function> [args...]`: Call a stored function.
//! - Anything else is evaluated as a Lua expression.
//!
//! # Example
//! ```rust
//! use tarn::{Value, cli::Command};
//!
//! let cmd: Command = ".call box.info.id 1 two".try_into().unwrap();
//! assert_eq!(
//!     cmd,
//!     Command::Call {
//!         function: "box.info.id".to_string(),
//!         args: vec![Value::from(1), Value::from("two")],
//!     }
//! );
//! ```
use std::io::{self, BufRead, Write};

use rmpv::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read command: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Possible commands from a user.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Ping,
    Status,
    Call { function: String, args: Vec<Value> },
    Eval(String),
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "" => Err(CommandError::Empty),
            ".exit" => Ok(Command::Exit),
            ".ping" => Ok(Command::Ping),
            ".status" => Ok(Command::Status),
            s if s == ".call" || s.starts_with(".call ") => {
                let mut parts = s.split_whitespace().skip(1);
                let function = parts.next().ok_or_else(|| CommandError::InvalidCommandArguments {
                    command: ".call".to_string(),
                    reason: "requires a function name. Example: .call box.info".to_string(),
                })?;

                Ok(Command::Call {
                    function: function.to_string(),
                    args: parts.map(parse_arg).collect(),
                })
            }
            s if s.starts_with('.') => Err(CommandError::UnrecognizedCommand(s.to_string())),
            s => Ok(Command::Eval(s.to_string())),
        }
    }
}

/// Reads a single console argument as nil, boolean, integer, float or string.
pub fn parse_arg(arg: &str) -> Value {
    match arg {
        "nil" => Value::Nil,
        "true" => Value::from(true),
        "false" => Value::from(false),
        s => {
            if let Ok(n) = s.parse::<i64>() {
                Value::from(n)
            } else if let Ok(n) = s.parse::<u64>() {
                Value::from(n)
            } else if let Ok(f) = s.parse::<f64>() {
                Value::from(f)
            } else {
                Value::from(s.trim_matches(|c| c == '\'' || c == '"'))
            }
        }
    }
}

/// Prompt user for a command. End of input reads as [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, PromptError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    Ok(s.as_str().try_into()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_handles_expressions() {
        let input = b"return box.info.version\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Eval("return box.info.version".to_string()), res);
    }

    #[test]
    fn prompt_exits_on_end_of_input() {
        let mut output = Vec::new();
        assert_eq!(prompt(&b""[..], &mut output).unwrap(), Command::Exit);
    }

    #[test]
    #[should_panic(expected = "unrecognized command '.something_wrong'")]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();
    }

    #[test]
    fn command_from_string() {
        let inputs = vec![
            (".exit", Command::Exit),
            (".ping", Command::Ping),
            (" .status ", Command::Status),
            ("return 1", Command::Eval("return 1".to_string())),
            (
                ".call f",
                Command::Call {
                    function: "f".to_string(),
                    args: vec![],
                },
            ),
        ];

        for (cmd, expected) in inputs {
            let command: Command = cmd.try_into().unwrap();
            assert_eq!(command, expected);
        }
    }

    #[test]
    fn call_requires_function() {
        let res: Result<Command, _> = ".call".try_into();
        assert!(matches!(
            res,
            Err(CommandError::InvalidCommandArguments { .. })
        ));

        let res: Result<Command, _> = "   ".try_into();
        assert_eq!(res, Err(CommandError::Empty));
    }

    #[test]
    fn parse_console_args() {
        assert_eq!(parse_arg("nil"), Value::Nil);
        assert_eq!(parse_arg("true"), Value::from(true));
        assert_eq!(parse_arg("-3"), Value::from(-3));
        assert_eq!(parse_arg("18446744073709551615"), Value::from(u64::MAX));
        assert_eq!(parse_arg("1.5"), Value::from(1.5));
        assert_eq!(parse_arg("'quoted'"), Value::from("quoted"));
        assert_eq!(parse_arg("plain"), Value::from("plain"));
    }
}
