//! Error types of the parameter protocol

use crate::param::{ParameterType, Value};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no response within the request deadline")]
    Timeout,

    #[error("controller rejected the request with status {0}")]
    Rejected(u16),

    #[error("parameter type tag {0} has no wire encoding")]
    UnsupportedType(u16),

    #[error("{value} is outside [{min}, {max}]")]
    OutOfRange { value: Value, min: Value, max: Value },

    #[error("{value:?} cannot be encoded as {expected}")]
    TypeMismatch { expected: ParameterType, value: Value },

    #[error("declared length {declared} does not match {param_type} ({expected} bytes)")]
    LengthMismatch {
        param_type: ParameterType,
        declared: u16,
        expected: usize,
    },

    #[error("cannot parse {input:?} as {param_type}")]
    InvalidValue {
        param_type: ParameterType,
        input: String,
    },

    #[error("malformed payload: {0}")]
    Malformed(#[from] scroll::Error),

    #[error("flight controller unresponsive")]
    ControllerUnresponsive,

    #[error("assistant unlock failed")]
    UnlockFailed,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}
