use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
    time::Duration,
};

use fcparam::{
    Error, ParameterType, Session, SessionConfig, Value,
    session::SessionState,
    transport::{Address, Handler, Message, Transport},
};

/// Answers requests from a script, one entry per expected request.
/// `None` plays a timeout.
#[derive(Default)]
struct ScriptedTransport {
    replies: VecDeque<Option<Vec<u8>>>,
    sent: Rc<RefCell<Vec<Message>>>,
    notifications: VecDeque<Message>,
    handlers: HashMap<(u8, u8), Handler>,
}

impl ScriptedTransport {
    fn reply(mut self, payload: &[u8]) -> Self {
        self.replies.push_back(Some(payload.to_vec()));
        self
    }

    fn timeout(mut self) -> Self {
        self.replies.push_back(None);
        self
    }

    /// Version response and unlock acknowledgement
    fn handshake(self) -> Self {
        let mut version = vec![0x00];
        version.extend_from_slice(b"wm220_fc\0\0\0\0\0\0\0\0");
        version.extend_from_slice(&0x0102_0304u32.to_le_bytes());
        version.extend_from_slice(&0x0306_2000u32.to_le_bytes());
        self.reply(&version).reply(&[0x00, 0x00])
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, msg: Message, timeout: Duration) -> anyhow::Result<Option<Message>> {
        assert_eq!(timeout, Duration::from_millis(200));
        let reply = self
            .replies
            .pop_front()
            .expect("unexpected request")
            .map(|payload| msg.reply(payload));
        self.sent.borrow_mut().push(msg);
        Ok(reply)
    }

    fn register_handler(&mut self, cmd_set: u8, cmd_id: u8, handler: Handler) {
        self.handlers.insert((cmd_set, cmd_id), handler);
    }

    fn poll(&mut self, _duration: Duration) -> anyhow::Result<()> {
        while let Some(msg) = self.notifications.pop_front() {
            if let Some(handler) = self.handlers.get_mut(&(msg.cmd_set, msg.cmd_id)) {
                handler(&msg);
            }
        }
        Ok(())
    }
}

fn descriptor_payload(
    table: u16,
    item: u16,
    tag: u16,
    len: u16,
    bounds: [[u8; 4]; 3],
    name: &str,
) -> Vec<u8> {
    let mut raw = vec![0x00, 0x00];
    for field in [table, item, tag, len] {
        raw.extend_from_slice(&field.to_le_bytes());
    }
    for bound in bounds {
        raw.extend_from_slice(&bound);
    }
    raw.extend_from_slice(name.as_bytes());
    raw.push(0x00);
    raw
}

fn i16_descriptor() -> Vec<u8> {
    descriptor_payload(
        0,
        3,
        5,
        2,
        [
            0i32.to_le_bytes(),
            (-2000i32).to_le_bytes(),
            2000i32.to_le_bytes(),
        ],
        "g_config_trim",
    )
}

#[test]
fn handshake_reaches_ready() {
    let transport = ScriptedTransport::default().handshake();
    let sent = transport.sent.clone();
    let session = Session::connect(transport, SessionConfig::default()).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.version().hardware, "wm220_fc");

    let sent = sent.borrow();
    assert_eq!(sent.len(), 2);
    assert_eq!((sent[0].cmd_set, sent[0].cmd_id), (0x00, 0x01));
    assert_eq!((sent[1].cmd_type, sent[1].cmd_set, sent[1].cmd_id), (0x40, 0x03, 0xdf));
    assert_eq!(sent[1].payload, vec![0x01, 0x00, 0x00, 0x00]);
    assert_eq!(sent[1].src, Address::from_byte(0x2a));
    assert_eq!(sent[1].dst, Address::from_byte(0x03));
}

#[test]
fn silent_controller_is_unresponsive() {
    let transport = ScriptedTransport::default().timeout();
    assert!(matches!(
        Session::connect(transport, SessionConfig::default()),
        Err(Error::ControllerUnresponsive)
    ));
}

#[test]
fn unanswered_unlock_fails() {
    let mut transport = ScriptedTransport::default().handshake();
    transport.replies.pop_back();
    transport.replies.push_back(None);
    assert!(matches!(
        Session::connect(transport, SessionConfig::default()),
        Err(Error::UnlockFailed)
    ));
}

#[test]
fn table_item_count() {
    let transport = ScriptedTransport::default()
        .handshake()
        .reply(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00]);
    let sent = transport.sent.clone();
    let mut session = Session::connect(transport, SessionConfig::default()).unwrap();
    assert_eq!(session.query_table_item_count(0).unwrap(), 5);
    let last = sent.borrow().last().cloned().unwrap();
    assert_eq!(last.cmd_id, 0xe0);
    assert_eq!(last.payload, vec![0x00, 0x00]);
}

/// Table 1 item 7, float in [0, 100] defaulting to 1
fn f32_descriptor() -> Vec<u8> {
    descriptor_payload(
        1,
        7,
        8,
        4,
        [
            1.0f32.to_le_bytes(),
            0.0f32.to_le_bytes(),
            100.0f32.to_le_bytes(),
        ],
        "g_config_gain",
    )
}

#[test]
fn float_descriptor_then_value() {
    let float_desc = f32_descriptor();
    let mut value = vec![0x00, 0x00, 0x01, 0x00, 0x07, 0x00];
    value.extend_from_slice(&2.5f32.to_le_bytes());
    let transport = ScriptedTransport::default()
        .handshake()
        .reply(&float_desc)
        .reply(&value);
    let sent = transport.sent.clone();
    let mut session = Session::connect(transport, SessionConfig::default()).unwrap();

    let desc = session.fetch_descriptor(1, 7).unwrap();
    assert_eq!(desc.param_type(), ParameterType::F32);
    assert_eq!(desc.default_value(), Value::Float(1.0));
    assert_eq!(desc.min_value(), Value::Float(0.0));
    assert_eq!(desc.max_value(), Value::Float(100.0));
    assert_eq!(desc.current_value(), None);

    let desc = session.read_value(desc).unwrap();
    assert_eq!(desc.current_value(), Some(Value::Float(2.5)));

    let sent = sent.borrow();
    assert_eq!(sent[2].payload, vec![0x01, 0x00, 0x07, 0x00]);
    assert_eq!(sent[3].cmd_id, 0xe2);
    assert_eq!(sent[3].payload, vec![0x01, 0x00, 0x01, 0x00, 0x07, 0x00]);
}

#[test]
fn write_signed_value() {
    let transport = ScriptedTransport::default()
        .handshake()
        .reply(&i16_descriptor())
        .reply(&[0x00, 0x00]);
    let sent = transport.sent.clone();
    let mut session = Session::connect(transport, SessionConfig::default()).unwrap();

    let mut desc = session.fetch_descriptor(0, 3).unwrap();
    let before = desc.clone();
    session.write_value(&mut desc, Value::Signed(-1234)).unwrap();
    assert_eq!(desc.current_value(), Some(Value::Signed(-1234)));
    assert_eq!(desc.min_value(), before.min_value());
    assert_eq!(desc.max_value(), before.max_value());
    assert_eq!(desc.name(), "g_config_trim");

    let last = sent.borrow().last().cloned().unwrap();
    assert_eq!(last.cmd_id, 0xe3);
    assert_eq!(last.payload, vec![0x00, 0x00, 0x01, 0x00, 0x03, 0x00, 0x2e, 0xfb]);
}

#[test]
fn out_of_range_write_never_leaves_the_client() {
    let transport = ScriptedTransport::default()
        .handshake()
        .reply(&i16_descriptor());
    let sent = transport.sent.clone();
    let mut session = Session::connect(transport, SessionConfig::default()).unwrap();

    let mut desc = session.fetch_descriptor(0, 3).unwrap();
    assert!(matches!(
        session.write_value(&mut desc, Value::Signed(2001)),
        Err(Error::OutOfRange { .. })
    ));
    assert!(matches!(
        session.write_value(&mut desc, Value::Float(1.0)),
        Err(Error::TypeMismatch { .. })
    ));
    assert_eq!(desc.current_value(), None);
    assert_eq!(sent.borrow().len(), 3);
}

#[test]
fn non_finite_float_write_is_refused() {
    let transport = ScriptedTransport::default()
        .handshake()
        .reply(&f32_descriptor());
    let sent = transport.sent.clone();
    let mut session = Session::connect(transport, SessionConfig::default()).unwrap();

    let mut desc = session.fetch_descriptor(1, 7).unwrap();
    for value in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        assert!(matches!(
            session.write_value(&mut desc, Value::Float(value)),
            Err(Error::OutOfRange { .. })
        ));
    }
    assert_eq!(desc.current_value(), None);
    assert!(sent.borrow().iter().all(|msg| msg.cmd_id != 0xe3));
    assert_eq!(sent.borrow().len(), 3);
}

#[test]
fn rejection_and_timeout_surface() {
    let transport = ScriptedTransport::default()
        .handshake()
        .reply(&[0x01, 0x00])
        .timeout()
        .reply(&i16_descriptor())
        .reply(&[0x01, 0x00, 0x00, 0x00]);
    let mut session = Session::connect(transport, SessionConfig::default()).unwrap();

    assert!(matches!(
        session.query_table_item_count(2),
        Err(Error::Rejected(1))
    ));
    assert!(matches!(session.fetch_descriptor(0, 0), Err(Error::Timeout)));
    let mut desc = session.fetch_descriptor(0, 3).unwrap();
    assert!(matches!(
        session.write_value(&mut desc, Value::Signed(5)),
        Err(Error::Rejected(1))
    ));
    assert_eq!(desc.current_value(), None);
}

#[test]
fn dump_walks_every_item() {
    let count = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00];
    let u8_desc = descriptor_payload(
        0,
        1,
        0,
        1,
        [1u32.to_le_bytes(), 0u32.to_le_bytes(), 10u32.to_le_bytes()],
        "g_config_mode",
    );
    let transport = ScriptedTransport::default()
        .handshake()
        .reply(&count)
        .reply(&i16_descriptor())
        .reply(&[0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x18, 0xfc])
        .reply(&u8_desc)
        .reply(&[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x04]);
    let mut session = Session::connect(transport, SessionConfig::default()).unwrap();

    let all = session.dump_tables(&[0]).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].current_value(), Some(Value::Signed(-1000)));
    assert_eq!(all[1].current_value(), Some(Value::Unsigned(4)));

    let json = serde_json::to_value(&all).unwrap();
    assert_eq!(json[1]["name"], "g_config_mode");
    assert_eq!(json[1]["type"], "uint8");
    assert_eq!(json[1]["max"], 10);
    assert_eq!(json[0]["value"], -1000);
}

#[test]
fn status_text_goes_through_the_filter() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let mut transport = ScriptedTransport::default().handshake();
    for text in ["\0[CTRL] motors armed\0", "\0[D-SEND DATA][DEBUG][Pub] 4 bytes\0"] {
        transport.notifications.push_back(Message::new(
            Address::from_byte(0x03),
            Address::from_byte(0x2a),
            0x00,
            0x00,
            0x0e,
            text.as_bytes().to_vec(),
        ));
    }
    let config = SessionConfig {
        debug: true,
        ..SessionConfig::default()
    };
    let filter = Box::new(move |line: &str| {
        log.borrow_mut().push(line.to_string());
        !line.contains("[D-SEND DATA]")
    });
    let mut session = Session::connect_with_filter(transport, config, filter).unwrap();
    session.poll(Duration::from_millis(10)).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            "[CTRL] motors armed".to_string(),
            "[D-SEND DATA][DEBUG][Pub] 4 bytes".to_string()
        ]
    );
}
