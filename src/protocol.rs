//! The parameter protocol spoken by the flight controller.
//!
//! Every response payload starts with a little-endian `u16` status. Zero
//! means success, anything else is a controller defined rejection and no
//! further byte of the payload is looked at.

use scroll::{LE, Pread, Pwrite};

use crate::constants::{ADDRESSING_SINGLE, UNLOCK_KEY, cmd_sets, commands};
use crate::error::{Error, Result};
use crate::param::{ParameterDescriptor, ParameterType, Value};

const STATUS_LEN: usize = 2;
/// Table query: status, reserved word, item count
const TABLE_COUNT_OFFSET: usize = STATUS_LEN + 4;
/// Descriptor: status, table, item, type, length, default, min, max, name
const BOUNDS_OFFSET: usize = STATUS_LEN + 4 * 2;
const NAME_OFFSET: usize = BOUNDS_OFFSET + 3 * 4;
/// Value get: status, table, item, value
const ECHOED_VALUE_OFFSET: usize = STATUS_LEN + 2 * 2;

/// Flight controller command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Query hardware and firmware versions. Answered by any node.
    VersionQuery,
    /// Assistant unlock, required before parameters can be accessed
    Unlock,
    /// Number of items in a table
    TableQuery { table_id: u16 },
    /// Type, bounds and name of one item
    DescriptorQuery { table_id: u16, item_id: u16 },
    /// Current value of one item
    ValueGet { table_id: u16, item_id: u16 },
    /// Write a value, already encoded for the item's type
    ValueSet {
        table_id: u16,
        item_id: u16,
        value: Vec<u8>,
    },
}

impl Command {
    pub fn table_query(table_id: u16) -> Self {
        Command::TableQuery { table_id }
    }

    pub fn descriptor_query(table_id: u16, item_id: u16) -> Self {
        Command::DescriptorQuery { table_id, item_id }
    }

    pub fn value_get(desc: &ParameterDescriptor) -> Self {
        Command::ValueGet {
            table_id: desc.table_id(),
            item_id: desc.item_id(),
        }
    }

    pub fn value_set(desc: &ParameterDescriptor, value: Value) -> Result<Self> {
        Ok(Command::ValueSet {
            table_id: desc.table_id(),
            item_id: desc.item_id(),
            value: desc.param_type().encode(value)?,
        })
    }

    pub fn cmd_set(&self) -> u8 {
        match self {
            Command::VersionQuery => cmd_sets::GENERAL,
            _ => cmd_sets::FLIGHT_CONTROLLER,
        }
    }

    pub fn cmd_id(&self) -> u8 {
        match self {
            Command::VersionQuery => commands::VERSION_GET,
            Command::Unlock => commands::ASSISTANT_UNLOCK,
            Command::TableQuery { .. } => commands::TABLE_QUERY,
            Command::DescriptorQuery { .. } => commands::DESCRIPTOR_QUERY,
            Command::ValueGet { .. } => commands::VALUE_GET,
            Command::ValueSet { .. } => commands::VALUE_SET,
        }
    }

    pub fn into_payload(self) -> Result<Vec<u8>> {
        match self {
            Command::VersionQuery => Ok(vec![]),
            Command::Unlock => Ok(UNLOCK_KEY.to_le_bytes().to_vec()),
            Command::TableQuery { table_id } => encode_table_query(table_id),
            Command::DescriptorQuery { table_id, item_id } => {
                encode_descriptor_query(table_id, item_id)
            }
            Command::ValueGet { table_id, item_id } => encode_item_address(table_id, item_id, 0),
            Command::ValueSet {
                table_id,
                item_id,
                value,
            } => {
                let mut buf = encode_item_address(table_id, item_id, value.len())?;
                let offset = buf.len() - value.len();
                buf[offset..].copy_from_slice(&value);
                Ok(buf)
            }
        }
    }
}

/// Fail with the status code unless the response reports success.
pub fn check_status(payload: &[u8]) -> Result<()> {
    match payload.pread_with::<u16>(0, LE)? {
        0 => Ok(()),
        status => Err(Error::Rejected(status)),
    }
}

pub fn encode_table_query(table_id: u16) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; 2];
    buf.pwrite_with(table_id, 0, LE)?;
    Ok(buf)
}

/// Returns the number of items in the table.
pub fn decode_table_query(payload: &[u8]) -> Result<u16> {
    check_status(payload)?;
    Ok(payload.pread_with::<u16>(TABLE_COUNT_OFFSET, LE)?)
}

pub fn encode_descriptor_query(table_id: u16, item_id: u16) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; 4];
    buf.pwrite_with(table_id, 0, LE)?;
    buf.pwrite_with(item_id, 2, LE)?;
    Ok(buf)
}

/// Decode a descriptor response.
///
/// The bound fields are interpreted from the type tag carried in the
/// payload itself.
pub fn decode_descriptor_query(payload: &[u8]) -> Result<ParameterDescriptor> {
    check_status(payload)?;
    let mut offset = STATUS_LEN;
    let table_id: u16 = payload.gread_with(&mut offset, LE)?;
    let item_id: u16 = payload.gread_with(&mut offset, LE)?;
    let tag: u16 = payload.gread_with(&mut offset, LE)?;
    let declared_length: u16 = payload.gread_with(&mut offset, LE)?;

    let param_type = ParameterType::from_tag(tag)?;
    let width = param_type.width()?;
    if usize::from(declared_length) != width {
        return Err(Error::LengthMismatch {
            param_type,
            declared: declared_length,
            expected: width,
        });
    }

    let default = param_type.decode_bound(payload, BOUNDS_OFFSET)?;
    let min = param_type.decode_bound(payload, BOUNDS_OFFSET + 4)?;
    let max = param_type.decode_bound(payload, BOUNDS_OFFSET + 8)?;

    // the last byte is a terminator
    let name = match payload.get(NAME_OFFSET..payload.len().saturating_sub(1)) {
        Some(raw) => String::from_utf8_lossy(raw).into_owned(),
        None => String::new(),
    };

    Ok(ParameterDescriptor::new(
        table_id,
        item_id,
        param_type,
        declared_length,
        name,
        default,
        min,
        max,
    ))
}

/// `table_id`, single item addressing mode, `item_id`, then `extra` zero bytes
fn encode_item_address(table_id: u16, item_id: u16, extra: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; 6 + extra];
    buf.pwrite_with(table_id, 0, LE)?;
    buf.pwrite_with(ADDRESSING_SINGLE, 2, LE)?;
    buf.pwrite_with(item_id, 4, LE)?;
    Ok(buf)
}

pub fn encode_value_get(desc: &ParameterDescriptor) -> Result<Vec<u8>> {
    Command::value_get(desc).into_payload()
}

/// Decode a value response with the codec of the descriptor's type.
///
/// The value either follows the status directly or comes after an echo
/// of table and item, which must name the requested item.
pub fn decode_value_get(payload: &[u8], desc: &ParameterDescriptor) -> Result<Value> {
    check_status(payload)?;
    let param_type = desc.param_type();
    let width = param_type.width()?;
    let offset = if payload.len() == STATUS_LEN + width {
        STATUS_LEN
    } else if payload.len() >= ECHOED_VALUE_OFFSET + width {
        let table_id: u16 = payload.pread_with(STATUS_LEN, LE)?;
        let item_id: u16 = payload.pread_with(STATUS_LEN + 2, LE)?;
        if (table_id, item_id) != (desc.table_id(), desc.item_id()) {
            return Err(Error::Malformed(scroll::Error::BadInput {
                size: payload.len(),
                msg: "value response echoes another item",
            }));
        }
        ECHOED_VALUE_OFFSET
    } else {
        return Err(Error::Malformed(scroll::Error::BadInput {
            size: payload.len(),
            msg: "value response length does not fit the parameter type",
        }));
    };
    param_type.decode(&payload[offset..])
}

pub fn encode_value_set(desc: &ParameterDescriptor, value: Value) -> Result<Vec<u8>> {
    Command::value_set(desc, value)?.into_payload()
}

pub fn decode_value_set(payload: &[u8]) -> Result<()> {
    check_status(payload)
}

/// Versions reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerVersion {
    pub hardware: String,
    pub loader: u32,
    pub app: u32,
}

impl ControllerVersion {
    /// Status byte, 16 byte hardware name, loader and app versions
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let status: u8 = payload.pread(0)?;
        if status != 0 {
            return Err(Error::Rejected(status.into()));
        }
        let loader = payload.pread_with::<u32>(17, LE)?;
        let app = payload.pread_with::<u32>(21, LE)?;
        let hardware = String::from_utf8_lossy(&payload[1..17])
            .trim_end_matches('\0')
            .to_string();
        Ok(ControllerVersion {
            hardware,
            loader,
            app,
        })
    }

    pub fn format_version(raw: u32) -> String {
        let [a, b, c, d] = raw.to_be_bytes();
        format!("{:02}.{:02}.{:02}.{:02}", a, b, c, d)
    }
}

impl std::fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (loader {}, app {})",
            self.hardware,
            Self::format_version(self.loader),
            Self::format_version(self.app)
        )
    }
}
