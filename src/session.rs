//! Flight controller session logic.

use std::time::Duration;

use crate::{
    Command, Transport,
    constants::{
        CMD_TYPE_REQUEST, DEFAULT_DST, DEFAULT_SRC, DEFAULT_TIMEOUT, DIAGNOSTIC_MARKER, cmd_sets,
        commands,
    },
    error::{Error, Result},
    param::{ParameterDescriptor, Value},
    protocol::{self, ControllerVersion},
    transport::{Address, Message},
};

/// Decides whether a status text line from the controller is shown
pub type StatusFilter = Box<dyn Fn(&str) -> bool>;

/// Hides the controller's internal publish chatter
pub fn default_status_filter() -> StatusFilter {
    Box::new(|line: &str| !line.contains(DIAGNOSTIC_MARKER))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub src: Address,
    pub dst: Address,
    /// Deadline for every request
    pub timeout: Duration,
    /// Subscribe to the controller's status text
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            src: Address::from_byte(DEFAULT_SRC),
            dst: Address::from_byte(DEFAULT_DST),
            timeout: DEFAULT_TIMEOUT,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    VersionChecked,
    Unlocked,
    Ready,
}

/// An unlocked session with the flight controller.
///
/// Every operation is one blocking request/response exchange, `&mut self`
/// keeps them from interleaving on the link.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    version: ControllerVersion,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    pub fn connect(transport: T, config: SessionConfig) -> Result<Self> {
        Self::connect_with_filter(transport, config, default_status_filter())
    }

    /// Check the controller is there, then unlock parameter access.
    pub fn connect_with_filter(
        mut transport: T,
        config: SessionConfig,
        filter: StatusFilter,
    ) -> Result<Self> {
        let mut state = SessionState::Disconnected;
        log::debug!("session {:?}: {} -> {}", state, config.src, config.dst);

        if config.debug {
            transport.register_handler(
                cmd_sets::GENERAL,
                commands::STATUS_TEXT,
                Box::new(move |msg: &Message| show_status_text(msg, &filter)),
            );
        }

        let version = match request(&mut transport, &config, Command::VersionQuery) {
            Ok(resp) => ControllerVersion::from_payload(&resp.payload)?,
            Err(Error::Timeout) => return Err(Error::ControllerUnresponsive),
            Err(e) => return Err(e),
        };
        log::info!("FC Version: {}", version);
        state = SessionState::VersionChecked;
        log::debug!("session {:?}", state);

        match request(&mut transport, &config, Command::Unlock) {
            Ok(_) => (),
            Err(Error::Timeout) => return Err(Error::UnlockFailed),
            Err(e) => return Err(e),
        }
        state = SessionState::Unlocked;
        log::debug!("session {:?}", state);

        state = SessionState::Ready;
        log::info!("Assistant unlocked, session ready");
        Ok(Session {
            transport,
            config,
            version,
            state,
        })
    }

    pub fn version(&self) -> &ControllerVersion {
        &self.version
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn query_table_item_count(&mut self, table_id: u16) -> Result<u16> {
        let resp = self.transfer(Command::table_query(table_id))?;
        protocol::decode_table_query(&resp.payload)
    }

    pub fn fetch_descriptor(&mut self, table_id: u16, item_id: u16) -> Result<ParameterDescriptor> {
        let resp = self.transfer(Command::descriptor_query(table_id, item_id))?;
        protocol::decode_descriptor_query(&resp.payload)
    }

    /// Read the current value, returning the descriptor with it filled in.
    pub fn read_value(&mut self, mut desc: ParameterDescriptor) -> Result<ParameterDescriptor> {
        let resp = self.transfer(Command::value_get(&desc))?;
        let value = protocol::decode_value_get(&resp.payload, &desc)?;
        desc.set_current_value(value);
        Ok(desc)
    }

    /// Write `value`, checked against the controller reported bounds first.
    ///
    /// On success the descriptor's current value is updated.
    pub fn write_value(&mut self, desc: &mut ParameterDescriptor, value: Value) -> Result<()> {
        let cmd = Command::value_set(desc, value)?;
        desc.check_range(value)?;
        let resp = self.transfer(cmd)?;
        protocol::decode_value_set(&resp.payload)?;
        desc.set_current_value(value);
        Ok(())
    }

    /// Fetch descriptor and current value of every item in `tables`.
    pub fn dump_tables(&mut self, tables: &[u16]) -> Result<Vec<ParameterDescriptor>> {
        let mut all = vec![];
        for &table_id in tables {
            let items = self.query_table_item_count(table_id)?;
            log::info!("Table {} => {} items", table_id, items);
            for item_id in 0..items {
                let desc = self.fetch_descriptor(table_id, item_id)?;
                all.push(self.read_value(desc)?);
            }
        }
        Ok(all)
    }

    /// Dispatch controller status text for `duration`.
    pub fn poll(&mut self, duration: Duration) -> Result<()> {
        Ok(self.transport.poll(duration)?)
    }

    fn transfer(&mut self, cmd: Command) -> Result<Message> {
        request(&mut self.transport, &self.config, cmd)
    }
}

fn request<T: Transport>(
    transport: &mut T,
    config: &SessionConfig,
    cmd: Command,
) -> Result<Message> {
    let msg = Message::new(
        config.src,
        config.dst,
        CMD_TYPE_REQUEST,
        cmd.cmd_set(),
        cmd.cmd_id(),
        cmd.into_payload()?,
    );
    transport.send(msg, config.timeout)?.ok_or(Error::Timeout)
}

fn show_status_text(msg: &Message, filter: &StatusFilter) {
    let Some(raw) = msg.payload.get(1..) else {
        return;
    };
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\0', '\r', '\n']);
    if !text.is_empty() && filter(text) {
        log::info!("[FC] {}", text);
    }
}
