//! Serial Transportation.
use std::{
    collections::HashMap,
    fmt::Display,
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use anyhow::{Error, Result};
use clap::{ValueEnum, builder::PossibleValue};
use serialport::SerialPort;

use super::{
    Handler, Message, Transport,
    frame::{self, Frame, Parsed},
};

const SERIAL_TIMEOUT_MS: u64 = 50;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Baudrate {
    #[default]
    Baud115200,
    Baud230400,
    Baud921600,
}

impl From<Baudrate> for u32 {
    fn from(value: Baudrate) -> Self {
        match value {
            Baudrate::Baud115200 => 115200,
            Baudrate::Baud230400 => 230400,
            Baudrate::Baud921600 => 921600,
        }
    }
}

impl Display for Baudrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

impl ValueEnum for Baudrate {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Baudrate::Baud115200,
            Baudrate::Baud230400,
            Baudrate::Baud921600,
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            Baudrate::Baud115200 => Some(PossibleValue::new("Baud115200").aliases(["115200"])),
            Baudrate::Baud230400 => Some(PossibleValue::new("Baud230400").aliases(["230400"])),
            Baudrate::Baud921600 => Some(PossibleValue::new("Baud921600").aliases(["921600"])),
        }
    }
}

pub struct SerialTransport {
    serial_port: Box<dyn SerialPort>,
    seq: u16,
    rx_buf: Vec<u8>,
    handlers: HashMap<(u8, u8), Handler>,
}

impl SerialTransport {
    pub fn scan_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    pub fn open(port: &str, baudrate: Baudrate) -> Result<Self> {
        log::info!("Opening serial port: \"{}\" @ {} baud", port, baudrate);
        let port = serialport::new(port, baudrate.into())
            .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()?;
        Ok(SerialTransport {
            serial_port: port,
            seq: 0,
            rx_buf: Vec::new(),
            handlers: HashMap::new(),
        })
    }

    pub fn open_nth(nth: usize, baudrate: Baudrate) -> Result<Self> {
        let ports = serialport::available_ports()?;

        match ports.get(nth) {
            Some(port) => Self::open(&port.port_name, baudrate),
            None => Err(Error::msg("No serial ports found!")),
        }
    }

    pub fn open_any(baudrate: Baudrate) -> Result<Self> {
        Self::open_nth(0, baudrate)
    }

    fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Read until one valid frame is buffered or `deadline` passes.
    fn recv_frame(&mut self, deadline: Instant) -> Result<Option<Frame>> {
        loop {
            match frame::parse(&self.rx_buf) {
                Parsed::Frame(frame, used) => {
                    log::debug!("<= {}", hex::encode(&self.rx_buf[..used]));
                    self.rx_buf.drain(..used);
                    return Ok(Some(frame));
                }
                Parsed::Garbage(n) => {
                    log::warn!("dropping {} bytes: {}", n, hex::encode(&self.rx_buf[..n]));
                    self.rx_buf.drain(..n);
                    continue;
                }
                Parsed::Incomplete => (),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.serial_port.set_timeout(deadline - now)?;
            let mut chunk = [0u8; 256];
            match self.serial_port.read(&mut chunk) {
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => (),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Whether `frame` is the response to `req` sent with sequence number `seq`
fn correlates(req: &Message, seq: u16, frame: &Frame) -> bool {
    let resp = &frame.message;
    resp.is_response()
        && frame.seq == seq
        && resp.cmd_set == req.cmd_set
        && resp.cmd_id == req.cmd_id
}

/// Hand an uncorrelated frame to its handler. Returns false when nobody takes it.
fn dispatch(handlers: &mut HashMap<(u8, u8), Handler>, frame: Frame) -> bool {
    let msg = &frame.message;
    match handlers.get_mut(&(msg.cmd_set, msg.cmd_id)) {
        Some(handler) => {
            handler(msg);
            true
        }
        None if msg.is_response() => {
            log::debug!("discarding uncorrelated response seq={} {:?}", frame.seq, msg);
            false
        }
        None => {
            log::trace!("unhandled message {:?}", msg);
            false
        }
    }
}

/// Returns the response to `req`, anything else goes to the handlers.
fn accept(
    req: &Message,
    seq: u16,
    frame: Frame,
    handlers: &mut HashMap<(u8, u8), Handler>,
) -> Option<Message> {
    if correlates(req, seq, &frame) {
        return Some(frame.message);
    }
    dispatch(handlers, frame);
    None
}

impl Transport for SerialTransport {
    fn send(&mut self, msg: Message, timeout: Duration) -> Result<Option<Message>> {
        let seq = self.next_seq();
        let raw = frame::encode(&msg, seq)?;
        log::debug!("=> {}", hex::encode(&raw));
        self.serial_port.write_all(&raw)?;
        self.serial_port.flush()?;

        let deadline = Instant::now() + timeout;
        while let Some(frame) = self.recv_frame(deadline)? {
            if let Some(resp) = accept(&msg, seq, frame, &mut self.handlers) {
                return Ok(Some(resp));
            }
        }
        log::debug!("timeout waiting for seq={}", seq);
        Ok(None)
    }

    fn register_handler(&mut self, cmd_set: u8, cmd_id: u8, handler: Handler) {
        self.handlers.insert((cmd_set, cmd_id), handler);
    }

    fn poll(&mut self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        while let Some(frame) = self.recv_frame(deadline)? {
            dispatch(&mut self.handlers, frame);
        }
        Ok(())
    }
}
