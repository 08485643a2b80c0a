//! Binary message codec modeled on OSC packets.
//!
//! A message is an address string followed by an optional type-tag string and one
//! payload per argument. Every string is NUL-terminated and padded with NULs to a 4-byte
//! boundary; numbers are 4-byte big-endian.
//!
//! ```text
//! address NUL-padded
//! [ ',' tags NUL-padded ]     only when there is at least one argument
//! { payload }*                i: int32, f: float32, s: string NUL-padded
//! ```

use std::fmt;
use thiserror::Error;
use tracing::error;

/// A single positional argument
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Argument {
    /// The type-tag character written for this argument
    pub fn tag(&self) -> char {
        match self {
            Argument::Int(_) => 'i',
            Argument::Float(_) => 'f',
            Argument::Str(_) => 's',
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Argument::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Argument::Int(value)
    }
}

impl From<f32> for Argument {
    fn from(value: f32) -> Self {
        Argument::Float(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Str(value.to_string())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::Str(value)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Int(v) => write!(f, "{v}"),
            Argument::Float(v) => write!(f, "{v}"),
            Argument::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Reasons a datagram cannot be decoded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{field} starting at offset {offset} is not NUL-terminated")]
    Unterminated { field: &'static str, offset: usize },
    #[error("argument '{tag}' at offset {offset} needs {needed} bytes but only {available} remain")]
    Truncated {
        tag: char,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("{field} starting at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str, offset: usize },
}

/// An addressed message with typed arguments. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    address: String,
    args: Vec<Argument>,
}

impl Message {
    /// Create a message with no arguments
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument, consuming the message
    pub fn arg(mut self, arg: impl Into<Argument>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    /// Type tags without the leading comma, e.g. `"isf"`
    pub fn type_tags(&self) -> String {
        self.args.iter().map(Argument::tag).collect()
    }

    /// Serialize to wire format. The result length is always a multiple of 4.
    ///
    /// Strings must not contain NUL bytes; a string with an interior NUL is cut at that
    /// byte when decoded.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len_hint());
        push_padded_str(&mut buf, &self.address);

        if self.args.is_empty() {
            return buf;
        }

        buf.push(b',');
        push_padded_str(&mut buf, &self.type_tags());

        for arg in &self.args {
            match arg {
                Argument::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
                Argument::Float(v) => buf.extend_from_slice(&v.to_be_bytes()),
                Argument::Str(s) => push_padded_str(&mut buf, s),
            }
        }

        buf
    }

    /// Parse a datagram.
    ///
    /// A missing type-tag section yields zero arguments. An unknown tag stops argument
    /// parsing: the fault is logged and the arguments decoded so far are kept.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(data);
        let address = reader.read_str("address")?.to_string();

        let mut args = Vec::new();
        if reader.peek() != Some(b',') {
            return Ok(Self { address, args });
        }

        reader.skip(1);
        let tags = reader.read_str("type tags")?;

        for tag in tags.chars() {
            let arg = match tag {
                'i' => Argument::Int(i32::from_be_bytes(reader.read_word(tag)?)),
                'f' => Argument::Float(f32::from_be_bytes(reader.read_word(tag)?)),
                's' => Argument::Str(reader.read_str("string argument")?.to_string()),
                unknown => {
                    error!(
                        "Unknown type tag '{}' in message {:?}, ignoring remaining arguments",
                        unknown, address
                    );
                    break;
                }
            };
            args.push(arg);
        }

        Ok(Self { address, args })
    }

    fn encoded_len_hint(&self) -> usize {
        let strings: usize = self
            .args
            .iter()
            .map(|arg| match arg {
                Argument::Str(s) => s.len() + 4,
                _ => 4,
            })
            .sum();
        self.address.len() + self.args.len() + 8 + strings
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if !self.args.is_empty() {
            write!(f, " ,{}", self.type_tags())?;
            for arg in &self.args {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

fn push_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Cursor over a datagram. `pos` may run past the end after padding is skipped.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or(&[])
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn read_str(&mut self, field: &'static str) -> Result<&'a str, DecodeError> {
        let offset = self.pos;
        let rest = self.remaining();
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::Unterminated { field, offset })?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| DecodeError::InvalidUtf8 { field, offset })?;
        self.pos = align4(offset + nul + 1);
        Ok(s)
    }

    fn read_word(&mut self, tag: char) -> Result<[u8; 4], DecodeError> {
        let rest = self.remaining();
        if rest.len() < 4 {
            return Err(DecodeError::Truncated {
                tag,
                offset: self.pos,
                needed: 4,
                available: rest.len(),
            });
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&rest[..4]);
        self.pos += 4;
        Ok(word)
    }
}
