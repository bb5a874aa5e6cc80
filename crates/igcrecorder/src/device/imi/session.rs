//! Per-connection state and request/reply exchanges.

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::message::{split_big_parameter, Message, MessageId, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::parser::MessageParser;
use super::types::DeviceInfo;
use super::DEVICE_NAME;
use crate::error::{Error, Result};
use crate::port::{read_until_deadline, Port};
use crate::retry::retry;

/// Extra wait for a HELLO reply.
const HELLO_TIMEOUT: Duration = Duration::from_millis(100);

/// Extra wait used by most request/reply exchanges.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// Attempts at fetching the device information block.
const DEVICE_INFO_ATTEMPTS: u32 = 4;

/// Size of the legacy device information block.
const LEGACY_INFO_SIZE: usize = 16;

/// What a reply must look like to be accepted.
#[derive(Debug, Clone, Copy)]
pub struct Expect {
    /// Required message id.
    pub id: MessageId,
    /// Required payload size, `None` for any.
    pub size: Option<usize>,
    /// Wait on top of the transfer time.
    pub extra: Duration,
}

impl Expect {
    /// A reply with the given id and any payload.
    #[must_use]
    pub fn reply(id: MessageId) -> Self {
        Self {
            id,
            size: None,
            extra: DEFAULT_TIMEOUT,
        }
    }

    /// Require an exact payload size.
    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Override the extra wait.
    #[must_use]
    pub fn with_timeout(mut self, extra: Duration) -> Self {
        self.extra = extra;
        self
    }
}

/// State of one configuration session with a recorder.
///
/// Owns the parse buffer and the serial number learnt from HELLO, so two
/// recorders on two ports never share protocol state.
#[derive(Debug)]
pub struct Session {
    serial: u16,
    connected: bool,
    info: DeviceInfo,
    parser: MessageParser,
    inbox: VecDeque<Message>,
    retries: u32,
}

impl Session {
    /// A disconnected session that retries exchanges `retries` times.
    #[must_use]
    pub fn new(retries: u32) -> Self {
        Self {
            serial: 0,
            connected: false,
            info: DeviceInfo::default(),
            parser: MessageParser::new(),
            inbox: VecDeque::new(),
            retries,
        }
    }

    /// Serial number reported by the recorder.
    #[must_use]
    pub fn serial(&self) -> u16 {
        self.serial
    }

    /// Check if a configuration session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Device information read while connecting.
    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn clear_input(&mut self, port: &mut dyn Port) -> Result<()> {
        port.flush_input()?;
        self.parser.reset();
        self.inbox.clear();
        Ok(())
    }

    /// Write one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large or the port fails.
    pub fn send(&mut self, port: &mut dyn Port, message: &Message) -> Result<()> {
        let frame = message.encode().ok_or_else(|| {
            Error::internal(format!(
                "payload of {} bytes exceeds {MAX_PAYLOAD_SIZE}",
                message.payload.len()
            ))
        })?;
        trace!(id = message.id, size = message.payload.len(), "Sending IMI message");
        port.write(&frame)?;
        Ok(())
    }

    /// Receive timeout for a reply of `expected` payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the port reports a baud rate of zero.
    pub fn reply_timeout(port: &dyn Port, extra: Duration, expected: usize) -> Result<Duration> {
        let baud = u64::from(port.baud_rate());
        if baud == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "port has no baud rate",
            )));
        }
        let expected = expected.min(MAX_PAYLOAD_SIZE) + HEADER_SIZE + 10;
        let transfer = 10_000 * u64::try_from(expected).unwrap_or(u64::MAX) / baud;
        Ok(extra + Duration::from_millis(transfer))
    }

    /// Wait for the next message.
    ///
    /// Keep-alive messages are skipped. A "not configured" reply closes the
    /// session and is reported as a rejection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time and
    /// [`Error::Rejected`] on "not configured".
    pub fn receive(&mut self, port: &mut dyn Port, extra: Duration, expected: usize) -> Result<Message> {
        let timeout = Self::reply_timeout(port, extra, expected)?;
        port.set_rx_timeout(timeout)?;
        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 64];

        loop {
            while let Some(message) = self.inbox.pop_front() {
                match message.kind() {
                    Some(MessageId::AckNotConfig) => {
                        warn!("Recorder left configuration mode");
                        self.connected = false;
                        return Err(Error::rejected(DEVICE_NAME, "not in configuration mode"));
                    }
                    Some(MessageId::KeepConfig) => trace!("Keep-alive skipped"),
                    _ => return Ok(message),
                }
            }

            let n = read_until_deadline(port, &mut buffer, deadline)?;
            if n == 0 {
                return Err(Error::timeout("IMI reply"));
            }
            self.inbox.extend(self.parser.feed(&buffer[..n]));
        }
    }

    /// Send `request` and wait for a reply matching `expect`, retrying on
    /// timeouts and unexpected replies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] immediately on "not configured" or
    /// "invalid state", otherwise the last error once all attempts fail.
    pub fn send_ret(&mut self, port: &mut dyn Port, request: &Message, expect: Expect) -> Result<Message> {
        // sending the request itself takes time on slow links
        let extra = Self::reply_timeout(port, expect.extra, request.payload.len())?;
        let expected = expect.size.unwrap_or(0);

        retry(self.retries, |attempt| {
            self.clear_input(port)?;
            self.send(port, request)?;
            let reply = self.receive(port, extra, expected)?;

            if reply.is(MessageId::AckInvalidState) {
                return Err(Error::rejected(DEVICE_NAME, "invalid state"));
            }
            if !reply.is(expect.id) {
                return Err(Error::protocol(format!(
                    "expected message 0x{:02X}, got 0x{:02X}",
                    expect.id as u8, reply.id
                )));
            }
            if let Some(size) = expect.size {
                if reply.payload.len() != size {
                    return Err(Error::protocol(format!(
                        "expected {size} payload bytes, got {}",
                        reply.payload.len()
                    )));
                }
            }
            trace!(attempt, id = reply.id, "IMI reply accepted");
            Ok(reply)
        })
    }

    /// Open a configuration session at the port's current baud rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorder does not answer HELLO or does not
    /// deliver a usable device information block.
    pub fn connect(&mut self, port: &mut dyn Port) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        self.serial = 0;
        self.info = DeviceInfo::default();
        self.clear_input(port)?;

        self.send(port, &Message::new(0, MessageId::Hello))?;
        let hello = self.receive(port, HELLO_TIMEOUT, 0)?;
        if !hello.is(MessageId::Hello) {
            return Err(Error::protocol(format!("expected HELLO, got 0x{:02X}", hello.id)));
        }
        self.serial = hello.serial;
        debug!(serial = self.serial, "Recorder answered HELLO");

        let (high, low) = split_big_parameter(port.baud_rate());
        self.send(
            port,
            &Message::new(self.serial, MessageId::StartConfig).with_parameters(high, low, 0),
        )?;

        for attempt in 1..=DEVICE_INFO_ATTEMPTS {
            self.clear_input(port)?;
            self.send(port, &Message::new(self.serial, MessageId::DeviceInfo))?;
            let reply = self.receive(port, DEFAULT_TIMEOUT, DeviceInfo::SIZE)?;
            if !reply.is(MessageId::DeviceInfo) {
                debug!(attempt, id = reply.id, "Unexpected reply to DEVICEINFO");
                continue;
            }

            self.info = match reply.payload.len() {
                DeviceInfo::SIZE | LEGACY_INFO_SIZE => DeviceInfo::decode(&reply.payload),
                size => {
                    return Err(Error::protocol(format!("device info of {size} bytes")));
                }
            };
            self.connected = true;
            debug!(
                device = self.info.device,
                firmware = self.info.sw_version,
                "IMI session open"
            );
            return Ok(());
        }

        Err(Error::protocol("no device information received"))
    }

    /// Close the configuration session.
    ///
    /// # Errors
    ///
    /// Returns an error if the BYE message cannot be written.
    pub fn disconnect(&mut self, port: &mut dyn Port) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.send(port, &Message::new(self.serial, MessageId::Bye))?;
        self.connected = false;
        debug!("IMI session closed");
        Ok(())
    }

    /// Build a request carrying this session's serial number.
    #[must_use]
    pub fn request(&self, id: MessageId) -> Message {
        Message::new(self.serial, id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::device::imi::message::join_big_parameter;
    use crate::port::mock::ScriptedPort;

    pub(crate) const SERIAL: u16 = 0x0123;

    /// Parse every frame in `data`.
    pub(crate) fn frames(data: &[u8]) -> Vec<Message> {
        MessageParser::new().feed(data)
    }

    /// A device info block for an Erixx with a pressure sensor.
    pub(crate) fn erixx_info() -> DeviceInfo {
        DeviceInfo {
            device: 1,
            sw_version: 0x21,
            hw_version: 3,
            gps: 2,
            sensor: 1,
            ..DeviceInfo::default()
        }
    }

    /// Answer the connection handshake; other requests go to `handler`.
    pub(crate) fn responder(
        mut handler: impl FnMut(&Message) -> Vec<Message> + Send + 'static,
    ) -> impl FnMut(&[u8]) -> Vec<u8> + Send + 'static {
        move |data| {
            let mut out = Vec::new();
            for request in frames(data) {
                let replies = match request.kind() {
                    Some(MessageId::Hello) => vec![Message::new(SERIAL, MessageId::Hello)],
                    Some(MessageId::StartConfig | MessageId::Bye) => Vec::new(),
                    Some(MessageId::DeviceInfo) => vec![Message::new(SERIAL, MessageId::DeviceInfo)
                        .with_payload(erixx_info().encode())],
                    _ => handler(&request),
                };
                for reply in replies {
                    out.extend(reply.encode().unwrap());
                }
            }
            out
        }
    }

    /// A connected session on a fast port served by `handler`.
    pub(crate) fn connected(
        handler: impl FnMut(&Message) -> Vec<Message> + Send + 'static,
    ) -> (ScriptedPort, Session) {
        let mut port = ScriptedPort::new(responder(handler));
        port.set_baud_rate(115_200).unwrap();
        let mut session = Session::new(4);
        session.connect(&mut port).unwrap();
        (port, session)
    }

    #[test]
    fn test_reply_timeout_scales_with_baud() {
        let mut port = ScriptedPort::silent();
        port.set_baud_rate(9600).unwrap();
        let slow = Session::reply_timeout(&port, DEFAULT_TIMEOUT, 1024).unwrap();
        port.set_baud_rate(115_200).unwrap();
        let fast = Session::reply_timeout(&port, DEFAULT_TIMEOUT, 1024).unwrap();
        assert!(slow > fast);
        assert_eq!(slow, Duration::from_millis(300 + 10_000 * 1046 / 9600));
    }

    #[test]
    fn test_zero_baud_is_an_error() {
        let mut port = ScriptedPort::silent();
        port.set_baud_rate(0).unwrap();
        let mut session = Session::new(4);
        assert!(matches!(
            session.receive(&mut port, DEFAULT_TIMEOUT, 0),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_connect_learns_serial_and_info() {
        let (mut port, mut session) = connected(|_| Vec::new());
        assert!(session.is_connected());
        assert_eq!(session.serial(), SERIAL);
        assert_eq!(session.info().sw_version, 0x21);

        let sent: Vec<Message> = port.writes().iter().flat_map(|w| frames(w)).collect();
        let start = sent.iter().find(|m| m.is(MessageId::StartConfig)).unwrap();
        assert_eq!(join_big_parameter(start.parameter1, start.parameter2), 115_200);
        assert_eq!(start.serial, SERIAL);

        session.disconnect(&mut port).unwrap();
        assert!(!session.is_connected());
        let last = frames(port.writes().last().unwrap());
        assert!(last[0].is(MessageId::Bye));
    }

    #[test]
    fn test_connect_accepts_legacy_info() {
        let mut port = ScriptedPort::new(move |data: &[u8]| {
            let request = frames(data).remove(0);
            let reply = if request.is(MessageId::DeviceInfo) {
                Message::new(SERIAL, MessageId::DeviceInfo)
                    .with_payload(erixx_info().encode()[..16].to_vec())
            } else if request.is(MessageId::Hello) {
                Message::new(SERIAL, MessageId::Hello)
            } else {
                return Vec::new();
            };
            reply.encode().unwrap()
        });
        port.set_baud_rate(57_600).unwrap();

        let mut session = Session::new(4);
        session.connect(&mut port).unwrap();
        assert_eq!(session.info().sw_version, 0x21);
        assert_eq!(session.info().flash_size, 0);
    }

    #[test]
    fn test_connect_without_answer_times_out() {
        let mut port = ScriptedPort::silent();
        port.set_baud_rate(115_200).unwrap();
        let mut session = Session::new(4);
        assert!(session.connect(&mut port).unwrap_err().is_timeout());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_send_ret_skips_keep_alive() {
        let (mut port, mut session) = connected(|_| {
            vec![
                Message::new(SERIAL, MessageId::KeepConfig),
                Message::new(SERIAL, MessageId::AckSuccess),
            ]
        });
        let request = session.request(MessageId::Declaration);
        let reply = session
            .send_ret(&mut port, &request, Expect::reply(MessageId::AckSuccess))
            .unwrap();
        assert!(reply.is(MessageId::AckSuccess));
    }

    #[test]
    fn test_send_ret_invalid_state_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let (mut port, mut session) = connected(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            vec![Message::new(SERIAL, MessageId::AckInvalidState)]
        });
        let request = session.request(MessageId::Declaration);
        let err = session
            .send_ret(&mut port, &request, Expect::reply(MessageId::AckSuccess))
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_send_ret_not_config_drops_session() {
        let (mut port, mut session) =
            connected(|_| vec![Message::new(SERIAL, MessageId::AckNotConfig)]);
        let request = session.request(MessageId::Flash);
        let err = session
            .send_ret(&mut port, &request, Expect::reply(MessageId::Flash))
            .unwrap_err();
        assert!(err.is_rejected());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_send_ret_retries_wrong_size() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let (mut port, mut session) = connected(move |_| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            let size = if n < 2 { 3 } else { 8 };
            vec![Message::new(SERIAL, MessageId::Flash).with_payload(vec![0; size])]
        });
        let request = session.request(MessageId::Flash);
        let reply = session
            .send_ret(&mut port, &request, Expect::reply(MessageId::Flash).with_size(8))
            .unwrap();
        assert_eq!(reply.payload.len(), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_send_ret_gives_up_after_retries() {
        let mut port = ScriptedPort::new(responder(|_| Vec::new()));
        port.set_baud_rate(115_200).unwrap();
        let mut session = Session::new(2);
        session.connect(&mut port).unwrap();

        let before = port.writes().len();
        let request = session.request(MessageId::Flash);
        let err = session
            .send_ret(&mut port, &request, Expect::reply(MessageId::Flash))
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(port.writes().len() - before, 2);
    }
}
