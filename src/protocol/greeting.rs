use std::io::Read;

use crate::Error;

pub const GREETING_SIZE: usize = 128;
const LINE_SIZE: usize = GREETING_SIZE / 2;

/// The fixed-size banner a server writes right after accepting a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// First line without padding, e.g. `Tarantool 2.11.1 (Binary) <uuid>`.
    pub version: String,
    /// Base64 salt used by authentication.
    pub salt: String,
}

impl Greeting {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut buf = [0u8; GREETING_SIZE];
        reader.read_exact(&mut buf)?;
        Self::parse(&buf)
    }

    pub fn parse(buf: &[u8; GREETING_SIZE]) -> Result<Self, Error> {
        let (first, second) = buf.split_at(LINE_SIZE);

        let version = String::from_utf8_lossy(first).trim_end().to_string();
        if !version.starts_with("Tarantool") {
            return Err(Error::Greeting(version));
        }

        let salt = String::from_utf8_lossy(second).trim().to_string();
        Ok(Self { version, salt })
    }

    pub fn encode(&self) -> [u8; GREETING_SIZE] {
        let mut buf = [b' '; GREETING_SIZE];
        for (line, text) in [(0, &self.version), (1, &self.salt)] {
            let start = line * LINE_SIZE;
            let bytes = text.as_bytes();
            let len = bytes.len().min(LINE_SIZE - 1);
            buf[start..start + len].copy_from_slice(&bytes[..len]);
            buf[start + LINE_SIZE - 1] = b'\n';
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_encoded_greeting() {
        let greeting = Greeting {
            version: "Tarantool 2.11.1 (Binary) 4e3b5c2a-0000-0000-0000-000000000000".to_string(),
            salt: "kT8HFS1p1ntdnDXzOcXuT2o0zqXlUnOhw5tCTILgBEI=".to_string(),
        };
        let buf = greeting.encode();

        assert_eq!(buf[LINE_SIZE - 1], b'\n');
        assert_eq!(buf[GREETING_SIZE - 1], b'\n');
        assert_eq!(Greeting::read_from(&mut &buf[..]).unwrap(), greeting);
    }

    #[test]
    fn reject_foreign_banner() {
        let mut buf = [b' '; GREETING_SIZE];
        buf[..8].copy_from_slice(b"HTTP/1.1");
        assert!(matches!(Greeting::parse(&buf), Err(Error::Greeting(_))));
    }

    #[test]
    fn short_greeting_is_a_transport_error() {
        let buf = [b' '; 10];
        assert!(matches!(
            Greeting::read_from(&mut &buf[..]),
            Err(Error::Transport(_))
        ));
    }
}
