//! Parameter data model: wire types, values and descriptors.
use std::fmt;

use scroll::{LE, Pread};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wire encoding of a parameter, as tagged by the controller.
///
/// The 64-bit slots exist in the tag space but the controller never
/// defined a packing for them, so every codec operation on them fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "uint64")]
    U64,
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "int64")]
    I64,
    #[serde(rename = "float")]
    F32,
}

impl ParameterType {
    pub fn from_tag(tag: u16) -> Result<Self> {
        use ParameterType::*;
        match tag {
            0 => Ok(U8),
            1 => Ok(U16),
            2 => Ok(U32),
            3 => Ok(U64),
            4 => Ok(I8),
            5 => Ok(I16),
            6 => Ok(I32),
            7 => Ok(I64),
            8 => Ok(F32),
            _ => Err(Error::UnsupportedType(tag)),
        }
    }

    pub const fn tag(self) -> u16 {
        use ParameterType::*;
        match self {
            U8 => 0,
            U16 => 1,
            U32 => 2,
            U64 => 3,
            I8 => 4,
            I16 => 5,
            I32 => 6,
            I64 => 7,
            F32 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        use ParameterType::*;
        match self {
            U8 => "uint8",
            U16 => "uint16",
            U32 => "uint32",
            U64 => "uint64",
            I8 => "int8",
            I16 => "int16",
            I32 => "int32",
            I64 => "int64",
            F32 => "float",
        }
    }

    /// Width of a value field on the wire
    pub fn width(self) -> Result<usize> {
        use ParameterType::*;
        match self {
            U8 | I8 => Ok(1),
            U16 | I16 => Ok(2),
            U32 | I32 | F32 => Ok(4),
            U64 | I64 => Err(Error::UnsupportedType(self.tag())),
        }
    }

    pub const fn is_signed(self) -> bool {
        use ParameterType::*;
        matches!(self, I8 | I16 | I32 | I64 | F32)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ParameterType::F32)
    }

    /// Decode a value field of this type from the start of `bytes`.
    pub fn decode(self, bytes: &[u8]) -> Result<Value> {
        use ParameterType::*;
        let value = match self {
            U8 => Value::Unsigned(bytes.pread_with::<u8>(0, LE)?.into()),
            U16 => Value::Unsigned(bytes.pread_with::<u16>(0, LE)?.into()),
            U32 => Value::Unsigned(bytes.pread_with::<u32>(0, LE)?),
            I8 => Value::Signed(bytes.pread_with::<i8>(0, LE)?.into()),
            I16 => Value::Signed(bytes.pread_with::<i16>(0, LE)?.into()),
            I32 => Value::Signed(bytes.pread_with::<i32>(0, LE)?),
            F32 => Value::Float(bytes.pread_with::<f32>(0, LE)?),
            U64 | I64 => return Err(Error::UnsupportedType(self.tag())),
        };
        Ok(value)
    }

    /// Encode `value` into exactly `self.width()` bytes.
    ///
    /// The value must belong to this type's family and fit its width.
    pub fn encode(self, value: Value) -> Result<Vec<u8>> {
        use ParameterType::*;
        let mismatch = || Error::TypeMismatch {
            expected: self,
            value,
        };
        let raw = match (self, value) {
            (U64 | I64, _) => return Err(Error::UnsupportedType(self.tag())),
            (U8, Value::Unsigned(v)) => {
                u8::try_from(v).map_err(|_| mismatch())?.to_le_bytes().to_vec()
            }
            (U16, Value::Unsigned(v)) => {
                u16::try_from(v).map_err(|_| mismatch())?.to_le_bytes().to_vec()
            }
            (U32, Value::Unsigned(v)) => v.to_le_bytes().to_vec(),
            (I8, Value::Signed(v)) => {
                i8::try_from(v).map_err(|_| mismatch())?.to_le_bytes().to_vec()
            }
            (I16, Value::Signed(v)) => {
                i16::try_from(v).map_err(|_| mismatch())?.to_le_bytes().to_vec()
            }
            (I32, Value::Signed(v)) => v.to_le_bytes().to_vec(),
            (F32, Value::Float(v)) => v.to_le_bytes().to_vec(),
            _ => return Err(mismatch()),
        };
        Ok(raw)
    }

    /// Decode one of the three 4-byte bound fields of a descriptor.
    ///
    /// Bounds are always sent as 32-bit words of the type's family,
    /// regardless of the value width.
    pub fn decode_bound(self, bytes: &[u8], offset: usize) -> Result<Value> {
        use ParameterType::*;
        match self {
            U8 | U16 | U32 => Ok(Value::Unsigned(bytes.pread_with::<u32>(offset, LE)?)),
            I8 | I16 | I32 => Ok(Value::Signed(bytes.pread_with::<i32>(offset, LE)?)),
            F32 => Ok(Value::Float(bytes.pread_with::<f32>(offset, LE)?)),
            U64 | I64 => Err(Error::UnsupportedType(self.tag())),
        }
    }

    /// Parse a user supplied value for a parameter of this type.
    pub fn parse_value(self, input: &str) -> Result<Value> {
        self.width()?;
        let s = input.trim();
        let invalid = || Error::InvalidValue {
            param_type: self,
            input: input.to_string(),
        };
        let value = if self.is_float() {
            Value::Float(s.parse().map_err(|_| invalid())?)
        } else if self.is_signed() {
            Value::Signed(s.parse().map_err(|_| invalid())?)
        } else {
            Value::Unsigned(parse_unsigned(s).ok_or_else(invalid)?)
        };
        // reject values that don't fit the wire width
        self.encode(value)?;
        Ok(value)
    }
}

fn parse_unsigned(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A decoded parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Unsigned(u32),
    Signed(i32),
    Float(f32),
}

impl Value {
    /// Lossless for every variant
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Unsigned(v) => v.into(),
            Value::Signed(v) => v.into(),
            Value::Float(v) => v.into(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unsigned(v) => fmt::Display::fmt(v, f),
            Value::Signed(v) => fmt::Display::fmt(v, f),
            Value::Float(v) => fmt::Display::fmt(v, f),
        }
    }
}

/// Metadata and last known value of one controller parameter.
///
/// Only produced by decoding a descriptor response, so the type and
/// bounds are whatever the controller reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    table: u16,
    item: u16,
    #[serde(rename = "type")]
    param_type: ParameterType,
    #[serde(skip)]
    declared_length: u16,
    name: String,
    default: Value,
    min: Value,
    max: Value,
    value: Option<Value>,
}

impl ParameterDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        table: u16,
        item: u16,
        param_type: ParameterType,
        declared_length: u16,
        name: String,
        default: Value,
        min: Value,
        max: Value,
    ) -> Self {
        ParameterDescriptor {
            table,
            item,
            param_type,
            declared_length,
            name,
            default,
            min,
            max,
            value: None,
        }
    }

    pub fn table_id(&self) -> u16 {
        self.table
    }

    pub fn item_id(&self) -> u16 {
        self.item
    }

    pub fn param_type(&self) -> ParameterType {
        self.param_type
    }

    pub fn declared_length(&self) -> u16 {
        self.declared_length
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Value {
        self.default
    }

    pub fn min_value(&self) -> Value {
        self.min
    }

    pub fn max_value(&self) -> Value {
        self.max
    }

    /// Absent until the value has been read or written
    pub fn current_value(&self) -> Option<Value> {
        self.value
    }

    pub(crate) fn set_current_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Check `value` against the controller reported bounds.
    pub fn check_range(&self, value: Value) -> Result<()> {
        // NaN is never inside the bounds
        if !(self.min.as_f64()..=self.max.as_f64()).contains(&value.as_f64()) {
            return Err(Error::OutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:4}  {:<70} {:<8}",
            self.table, self.item, self.name, self.param_type
        )?;
        let fields = [Some(self.min), Some(self.max), Some(self.default), self.value];
        for field in fields {
            match field {
                Some(Value::Float(v)) => write!(f, " {:12.4}", v)?,
                Some(v) => write!(f, " {:>12}", v)?,
                None => write!(f, " {:>12}", "-")?,
            }
        }
        Ok(())
    }
}
