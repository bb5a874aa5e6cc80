//! Frames of the IMI binary protocol.
//!
//! ```text
//! 'E' 'X' | serial u16 | id u8 | p1 u8 | p2 u16 | p3 u16 | size u16 | payload | crc u16
//! ```
//!
//! Integers are little-endian except the trailing CRC, which is big-endian
//! and covers everything after the two sync bytes.

use crate::checksum::crc16;
use crate::device::bits::ByteWriter;

/// First synchronisation byte.
pub const SYNC1: u8 = b'E';

/// Second synchronisation byte.
pub const SYNC2: u8 = b'X';

/// Header length including the sync bytes.
pub const HEADER_SIZE: usize = 12;

/// Trailing CRC length.
pub const CRC_SIZE: usize = 2;

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Message identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    /// Request completed.
    AckSuccess = 0x00,
    /// Request failed.
    AckFailure = 0x01,
    /// Recorder is logging and cannot be configured.
    AckLogging = 0x02,
    /// No configuration session is open.
    AckNotConfig = 0x03,
    /// Request not allowed in the current state.
    AckInvalidState = 0x04,
    /// Connectivity probe; the reply carries the recorder's serial number.
    Hello = 0x10,
    /// Close the configuration session.
    Bye = 0x11,
    /// Stop logging.
    ForceStop = 0x12,
    /// Open a configuration session at the given baud rate.
    StartConfig = 0x13,
    /// Request the device information block.
    DeviceInfo = 0x14,
    /// Keep-alive sent by the recorder while a session is open.
    KeepConfig = 0x15,
    /// Configuration identifier.
    ConfigId = 0x16,
    /// Default observation zone.
    DefaultZone = 0x17,
    /// Task declaration.
    Declaration = 0x20,
    /// Raw flash read.
    Flash = 0x30,
    /// Page of the flight list.
    FlightInfo = 0x40,
    /// Erase all flights.
    FlightDeleteAll = 0x42,
}

impl MessageId {
    /// The identifier for a wire byte, if known.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::AckSuccess,
            0x01 => Self::AckFailure,
            0x02 => Self::AckLogging,
            0x03 => Self::AckNotConfig,
            0x04 => Self::AckInvalidState,
            0x10 => Self::Hello,
            0x11 => Self::Bye,
            0x12 => Self::ForceStop,
            0x13 => Self::StartConfig,
            0x14 => Self::DeviceInfo,
            0x15 => Self::KeepConfig,
            0x16 => Self::ConfigId,
            0x17 => Self::DefaultZone,
            0x20 => Self::Declaration,
            0x30 => Self::Flash,
            0x40 => Self::FlightInfo,
            0x42 => Self::FlightDeleteAll,
            _ => return None,
        })
    }
}

/// A decoded or to-be-sent frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Serial number of the recorder.
    pub serial: u16,
    /// Raw message identifier.
    pub id: u8,
    /// First parameter.
    pub parameter1: u8,
    /// Second parameter.
    pub parameter2: u16,
    /// Third parameter.
    pub parameter3: u16,
    /// Message body.
    pub payload: Vec<u8>,
}

impl Message {
    /// A message without parameters or payload.
    #[must_use]
    pub fn new(serial: u16, id: MessageId) -> Self {
        Self {
            serial,
            id: id as u8,
            parameter1: 0,
            parameter2: 0,
            parameter3: 0,
            payload: Vec::new(),
        }
    }

    /// Set the three parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameter1: u8, parameter2: u16, parameter3: u16) -> Self {
        self.parameter1 = parameter1;
        self.parameter2 = parameter2;
        self.parameter3 = parameter3;
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// The known identifier, if any.
    #[must_use]
    pub fn kind(&self) -> Option<MessageId> {
        MessageId::from_u8(self.id)
    }

    /// Check the identifier.
    #[must_use]
    pub fn is(&self, id: MessageId) -> bool {
        self.id == id as u8
    }

    /// Serialise to a complete frame. Returns `None` if the payload is
    /// larger than [`MAX_PAYLOAD_SIZE`].
    #[must_use]
    pub fn encode(&self) -> Option<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return None;
        }
        let size = u16::try_from(self.payload.len()).ok()?;

        let mut frame = ByteWriter::with_capacity(HEADER_SIZE + self.payload.len() + CRC_SIZE);
        frame
            .u8(SYNC1)
            .u8(SYNC2)
            .u16(self.serial)
            .u8(self.id)
            .u8(self.parameter1)
            .u16(self.parameter2)
            .u16(self.parameter3)
            .u16(size)
            .bytes(&self.payload);

        let mut frame = frame.into_bytes();
        let crc = crc16(&frame[2..]);
        frame.extend_from_slice(&crc.to_be_bytes());
        Some(frame)
    }
}

/// Split a 24-bit value over parameter1 (high byte) and parameter2.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn split_big_parameter(value: u32) -> (u8, u16) {
    ((value >> 16) as u8, (value & 0xFFFF) as u16)
}

/// Inverse of [`split_big_parameter`].
#[must_use]
pub fn join_big_parameter(parameter1: u8, parameter2: u16) -> u32 {
    (u32::from(parameter1) << 16) | u32::from(parameter2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Message::new(0x0102, MessageId::Hello)
            .with_parameters(3, 0x0405, 0x0607)
            .with_payload(vec![0xAA, 0xBB])
            .encode()
            .unwrap();

        assert_eq!(frame.len(), HEADER_SIZE + 2 + CRC_SIZE);
        assert_eq!(&frame[..12], &[b'E', b'X', 0x02, 0x01, 0x10, 3, 0x05, 0x04, 0x07, 0x06, 2, 0]);
        assert_eq!(&frame[12..14], &[0xAA, 0xBB]);

        let crc = crc16(&frame[2..14]);
        assert_eq!(&frame[14..], &crc.to_be_bytes());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let msg = Message::new(0, MessageId::Declaration).with_payload(vec![0; MAX_PAYLOAD_SIZE + 1]);
        assert!(msg.encode().is_none());
    }

    #[test]
    fn test_message_id_round_trip() {
        for id in [
            MessageId::AckSuccess,
            MessageId::AckNotConfig,
            MessageId::KeepConfig,
            MessageId::Flash,
            MessageId::FlightDeleteAll,
        ] {
            assert_eq!(MessageId::from_u8(id as u8), Some(id));
        }
        assert_eq!(MessageId::from_u8(0x99), None);
    }

    #[test]
    fn test_big_parameter() {
        assert_eq!(split_big_parameter(115_200), (0x01, 0xC200));
        assert_eq!(join_big_parameter(0x01, 0xC200), 115_200);
    }
}
