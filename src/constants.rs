use std::time::Duration;

/// Default request timeout, the controller answers well within this on a healthy link
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Our own address on the link (kind 0x0a, index 1)
pub const DEFAULT_SRC: u8 = 0x2a;
/// Flight controller address (kind 0x03, index 0)
pub const DEFAULT_DST: u8 = 0x03;

/// Marker of controller-internal debug chatter in status text
pub const DIAGNOSTIC_MARKER: &str = "[D-SEND DATA][DEBUG][Pub]";

/// Tables present on every controller revision seen so far
pub const DEFAULT_TABLES: [u16; 2] = [0, 1];

/// Command type byte: request, acknowledgement wanted
pub const CMD_TYPE_REQUEST: u8 = 0x40;
/// Set on the command type byte of every response
pub const CMD_TYPE_RESPONSE: u8 = 0x80;

pub mod cmd_sets {
    pub const GENERAL: u8 = 0x00;
    pub const FLIGHT_CONTROLLER: u8 = 0x03;
}

pub mod commands {
    /// General set
    pub const VERSION_GET: u8 = 0x01;
    pub const STATUS_TEXT: u8 = 0x0e;

    /// Flight controller set
    pub const ASSISTANT_UNLOCK: u8 = 0xdf;
    pub const TABLE_QUERY: u8 = 0xe0;
    pub const DESCRIPTOR_QUERY: u8 = 0xe1;
    pub const VALUE_GET: u8 = 0xe2;
    pub const VALUE_SET: u8 = 0xe3;
}

/// Addressing mode word of value get/set requests: one item by index
pub const ADDRESSING_SINGLE: u16 = 0x0001;

/// Payload of the assistant unlock request
pub const UNLOCK_KEY: u32 = 0x0000_0001;
