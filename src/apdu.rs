//! APDU command and response types for the TON Wallet applet.
//!
//! The applet only ever uses short-form APDUs, so `Lc` and `Le` are single
//! bytes and a `Le` of zero is simply absent.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;

/// Two-byte status word trailing every card response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord {
    /// First status byte (SW1).
    pub sw1: u8,
    /// Second status byte (SW2).
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word from SW1 and SW2.
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create a status word from a combined u16 value.
    pub const fn from_u16(sw: u16) -> Self {
        Self {
            sw1: (sw >> 8) as u8,
            sw2: sw as u8,
        }
    }

    /// Get the combined u16 value.
    pub const fn to_u16(self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Whether the word reports success. The applet never uses `61xx`
    /// continuations, so `0x9000` is the only success.
    pub const fn is_success(self) -> bool {
        self.to_u16() == 0x9000
    }

    /// Human-readable meaning of the well-known status words.
    pub const fn description(self) -> &'static str {
        match self.to_u16() {
            0x9000 => "success",
            0x6700 => "wrong length",
            0x6982 => "security condition not satisfied",
            0x6985 => "conditions of use not satisfied",
            0x6986 => "command not allowed",
            0x6A80 => "incorrect command data",
            0x6A82 => "applet not found",
            0x6A86 => "incorrect P1/P2",
            0x6B00 => "wrong P1/P2",
            0x6D00 => "instruction not supported",
            0x6E00 => "class not supported",
            0x6F00 => "no precise diagnosis",
            _ => "unknown status",
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X} ({})", self.to_u16(), self.description())
    }
}

impl From<u16> for StatusWord {
    fn from(sw: u16) -> Self {
        Self::from_u16(sw)
    }
}

/// Named status words the applet is known to return.
pub mod sw {
    use super::StatusWord;

    /// Normal completion.
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
    /// Security condition not satisfied, typically a bad HMAC tag.
    pub const SECURITY_CONDITION_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x82);
    /// Command not allowed in the current applet state.
    pub const COMMAND_NOT_ALLOWED: StatusWord = StatusWord::new(0x69, 0x86);
    /// Incorrect data field.
    pub const INCORRECT_DATA: StatusWord = StatusWord::new(0x6A, 0x80);
}

/// A short-form APDU command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Class byte.
    pub cla: u8,
    /// Instruction byte.
    pub ins: u8,
    /// First parameter.
    pub p1: u8,
    /// Second parameter.
    pub p2: u8,
    /// Command data, if any.
    pub data: Option<Bytes>,
    /// Expected response length, if any.
    pub le: Option<u8>,
}

impl Command {
    /// Create a command with just the four header bytes.
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a command with an expected response length.
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a command with a data payload.
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the data field.
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected response length.
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Serialize to raw APDU bytes.
    pub fn to_bytes(&self) -> Bytes {
        let data_len = self.data.as_ref().map_or(0, |d| d.len());
        let mut buf = BytesMut::with_capacity(4 + 1 + data_len + 1);

        buf.put_u8(self.cla);
        buf.put_u8(self.ins);
        buf.put_u8(self.p1);
        buf.put_u8(self.p2);

        if let Some(data) = &self.data {
            buf.put_u8(data.len() as u8);
            buf.put_slice(data);
        }
        if let Some(le) = self.le {
            buf.put_u8(le);
        }

        buf.freeze()
    }

    /// Parse a command from raw bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < 4 {
            return Err(Error::InvalidCommandLength(raw.len()));
        }

        let mut command = Self::new(raw[0], raw[1], raw[2], raw[3]);
        if raw.len() == 4 {
            return Ok(command);
        }
        if raw.len() == 5 {
            // A lone trailing byte is Le.
            command.le = Some(raw[4]);
            return Ok(command);
        }

        let lc = raw[4] as usize;
        match raw.len() {
            n if n == 5 + lc => {
                command.data = Some(Bytes::copy_from_slice(&raw[5..5 + lc]));
            }
            n if n == 5 + lc + 1 => {
                command.data = Some(Bytes::copy_from_slice(&raw[5..5 + lc]));
                command.le = Some(raw[5 + lc]);
            }
            n => return Err(Error::InvalidCommandLength(n)),
        }
        Ok(command)
    }
}

/// A decoded card response: payload bytes plus the trailing status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload without the status word.
    pub payload: Bytes,
    /// Trailing status word.
    pub status: StatusWord,
}

impl Response {
    /// Decode a raw response buffer. Anything shorter than a bare status
    /// word is rejected.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < 2 {
            return Err(Error::TruncatedResponse { got: raw.len() });
        }
        let (payload, status) = raw.split_at(raw.len() - 2);
        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status: StatusWord::new(status[0], status[1]),
        })
    }

    /// Whether the status word reports success.
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
