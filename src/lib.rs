//! DJI flight controller parameter protocol implementation.

pub mod constants;
pub mod error;
pub mod param;
pub mod protocol;
pub mod session;
pub mod transport;

pub use self::error::{Error, Result};
pub use self::param::{ParameterDescriptor, ParameterType, Value};
pub use self::protocol::{Command, ControllerVersion};
pub use self::session::{Session, SessionConfig};
pub use self::transport::Transport;
