//! Abstract controller link interface.
use std::{fmt, str::FromStr, time::Duration};

use anyhow::Result;

use crate::constants::CMD_TYPE_RESPONSE;

pub use self::serial::{Baudrate, SerialTransport};

pub mod frame;
mod serial;

/// Callback for unsolicited messages of one command set/id
pub type Handler = Box<dyn FnMut(&Message)>;

/// Abstraction of the link layer.
///
/// Implementations own framing, checksums and request/response
/// correlation. Unsolicited messages never come back from `send`, they go
/// to the handler registered for their command set/id.
pub trait Transport {
    /// Send one request and wait for its response.
    ///
    /// Returns `Ok(None)` when nothing correlated arrived within `timeout`.
    fn send(&mut self, msg: Message, timeout: Duration) -> Result<Option<Message>>;

    fn register_handler(&mut self, cmd_set: u8, cmd_id: u8, handler: Handler);

    /// Dispatch unsolicited messages for `duration` without sending anything.
    fn poll(&mut self, duration: Duration) -> Result<()>;
}

/// Node address on the link, kind in the low 5 bits, index in the high 3
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(u8);

impl Address {
    pub const fn new(kind: u8, index: u8) -> Self {
        Address((kind & 0x1f) | (index << 5))
    }

    pub const fn from_byte(raw: u8) -> Self {
        Address(raw)
    }

    pub const fn kind(self) -> u8 {
        self.0 & 0x1f
    }

    pub const fn index(self) -> u8 {
        self.0 >> 5
    }

    pub const fn to_byte(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}", self.kind(), self.index())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Accepts a raw byte (`0x2a`) or kind and index as four hex digits (`0300`)
impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(raw) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return Ok(Address(u8::from_str_radix(raw, 16)?));
        }
        anyhow::ensure!(
            s.len() == 4 && s.is_ascii(),
            "address must be 0xNN or KKII, got {:?}",
            s
        );
        let kind = u8::from_str_radix(&s[..2], 16)?;
        let index = u8::from_str_radix(&s[2..], 16)?;
        anyhow::ensure!(kind < 0x20 && index < 0x08, "address {:?} out of range", s);
        Ok(Address::new(kind, index))
    }
}

/// One command or response on the link.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub src: Address,
    pub dst: Address,
    pub cmd_type: u8,
    pub cmd_set: u8,
    pub cmd_id: u8,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(
        src: Address,
        dst: Address,
        cmd_type: u8,
        cmd_set: u8,
        cmd_id: u8,
        payload: Vec<u8>,
    ) -> Self {
        Message {
            src,
            dst,
            cmd_type,
            cmd_set,
            cmd_id,
            payload,
        }
    }

    pub fn is_response(&self) -> bool {
        self.cmd_type & CMD_TYPE_RESPONSE != 0
    }

    /// Build the response to this message, addressed back to the sender
    pub fn reply(&self, payload: Vec<u8>) -> Self {
        Message {
            src: self.dst,
            dst: self.src,
            cmd_type: self.cmd_type | CMD_TYPE_RESPONSE,
            cmd_set: self.cmd_set,
            cmd_id: self.cmd_id,
            payload,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} {:02x}:{:02x}:{:02x}[{}]",
            self.src,
            self.dst,
            self.cmd_type,
            self.cmd_set,
            self.cmd_id,
            hex::encode(&self.payload)
        )
    }
}
