//! DUML frame layout.
//!
//! ```text
//! 0     1..3          3      4    5    6..8  8     9    10   11..n-2  n-2..n
//! 0x55  len|ver<<10   crc8   src  dst  seq   type  set  id   payload  crc16
//! ```
//!
//! All multi-byte fields are little-endian, `len` counts the whole frame.
use anyhow::Result;
use scroll::{LE, Pread, Pwrite};

use super::{Address, Message};

pub const SOF: u8 = 0x55;
pub const VERSION: u16 = 1;

const HEADER_CHECK_LEN: usize = 4;
const HEADER_LEN: usize = 11;
const CRC16_LEN: usize = 2;
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CRC16_LEN;
pub const MAX_FRAME_LEN: usize = 0x3ff;

const CRC8_SEED: u8 = 0x77;
const CRC16_SEED: u16 = 0x3692;

/// A decoded frame together with its sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u16,
    pub message: Message,
}

/// Outcome of scanning a receive buffer
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    /// A valid frame, consuming this many bytes
    Frame(Frame, usize),
    /// Drop this many bytes, they can't start a valid frame
    Garbage(usize),
    Incomplete,
}

pub fn encode(msg: &Message, seq: u16) -> Result<Vec<u8>> {
    let len = MIN_FRAME_LEN + msg.payload.len();
    anyhow::ensure!(len <= MAX_FRAME_LEN, "payload too large: {} bytes", msg.payload.len());

    let mut buf = vec![0u8; len];
    buf[0] = SOF;
    buf.pwrite_with(len as u16 | (VERSION << 10), 1, LE)?;
    buf[3] = crc8(&buf[..3]);
    buf[4] = msg.src.to_byte();
    buf[5] = msg.dst.to_byte();
    buf.pwrite_with(seq, 6, LE)?;
    buf[8] = msg.cmd_type;
    buf[9] = msg.cmd_set;
    buf[10] = msg.cmd_id;
    buf[HEADER_LEN..len - CRC16_LEN].copy_from_slice(&msg.payload);
    let crc = crc16(&buf[..len - CRC16_LEN]);
    buf.pwrite_with(crc, len - CRC16_LEN, LE)?;
    Ok(buf)
}

pub fn parse(buf: &[u8]) -> Parsed {
    match buf.iter().position(|&b| b == SOF) {
        None if buf.is_empty() => return Parsed::Incomplete,
        None => return Parsed::Garbage(buf.len()),
        Some(0) => (),
        Some(n) => return Parsed::Garbage(n),
    }
    if buf.len() < HEADER_CHECK_LEN {
        return Parsed::Incomplete;
    }
    if crc8(&buf[..3]) != buf[3] {
        return Parsed::Garbage(1);
    }
    let len = (u16::from_le_bytes([buf[1], buf[2]]) & 0x3ff) as usize;
    if len < MIN_FRAME_LEN {
        return Parsed::Garbage(1);
    }
    if buf.len() < len {
        return Parsed::Incomplete;
    }
    let raw = &buf[..len];
    let expected = crc16(&raw[..len - CRC16_LEN]);
    match raw.pread_with::<u16>(len - CRC16_LEN, LE) {
        Ok(crc) if crc == expected => (),
        _ => return Parsed::Garbage(1),
    }
    let message = Message {
        src: Address::from_byte(raw[4]),
        dst: Address::from_byte(raw[5]),
        cmd_type: raw[8],
        cmd_set: raw[9],
        cmd_id: raw[10],
        payload: raw[HEADER_LEN..len - CRC16_LEN].to_vec(),
    };
    let seq = u16::from_le_bytes([raw[6], raw[7]]);
    Parsed::Frame(Frame { seq, message }, len)
}

pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(CRC8_SEED, |mut crc, &b| {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8c } else { crc >> 1 };
        }
        crc
    })
}

pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_SEED, |mut crc, &b| {
        crc ^= u16::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
        crc
    })
}
