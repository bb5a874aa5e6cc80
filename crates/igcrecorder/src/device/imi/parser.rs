//! Incremental frame parser.

use tracing::trace;

use super::message::{Message, CRC_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE, SYNC1, SYNC2};
use crate::checksum::crc16;
use crate::device::bits::ByteReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for the sync bytes.
    NotSync,
    /// Collecting the fixed header.
    Header,
    /// Collecting payload and CRC.
    Payload { remaining: usize },
}

/// Turns a byte stream into [`Message`]s.
///
/// Frames that fail the size or CRC check are dropped and the parser goes
/// back to looking for sync bytes, so corrupt input never stalls it.
#[derive(Debug)]
pub struct MessageParser {
    state: State,
    buffer: Vec<u8>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser {
    /// Create a parser waiting for a sync sequence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::NotSync,
            buffer: Vec::with_capacity(HEADER_SIZE + MAX_PAYLOAD_SIZE + CRC_SIZE),
        }
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = State::NotSync;
        self.buffer.clear();
    }

    /// Feed a chunk, returning every frame completed by it.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Message> {
        data.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    /// Feed one byte.
    pub fn push(&mut self, byte: u8) -> Option<Message> {
        match self.state {
            State::NotSync => {
                if self.buffer.len() == 1 && byte == SYNC2 {
                    self.buffer.push(byte);
                    self.state = State::Header;
                } else {
                    self.buffer.clear();
                    if byte == SYNC1 {
                        self.buffer.push(byte);
                    }
                }
                None
            }
            State::Header => {
                self.buffer.push(byte);
                if self.buffer.len() == HEADER_SIZE {
                    let size = usize::from(u16::from_le_bytes([self.buffer[10], self.buffer[11]]));
                    if size > MAX_PAYLOAD_SIZE {
                        trace!(size, "Frame too large, resynchronising");
                        self.reset();
                    } else {
                        self.state = State::Payload {
                            remaining: size + CRC_SIZE,
                        };
                    }
                }
                None
            }
            State::Payload { remaining } => {
                self.buffer.push(byte);
                if remaining > 1 {
                    self.state = State::Payload {
                        remaining: remaining - 1,
                    };
                    return None;
                }
                let message = self.check();
                self.reset();
                message
            }
        }
    }

    /// Validate and decode a complete frame in the buffer.
    fn check(&self) -> Option<Message> {
        let frame = &self.buffer;
        let body_end = frame.len().checked_sub(CRC_SIZE)?;
        if body_end < HEADER_SIZE {
            return None;
        }

        let received = u16::from_be_bytes([frame[body_end], frame[body_end + 1]]);
        if crc16(&frame[2..body_end]) != received {
            trace!("Frame CRC mismatch, dropping");
            return None;
        }

        let mut header = ByteReader::new(&frame[2..HEADER_SIZE]);
        let serial = header.u16();
        let id = header.u8();
        let parameter1 = header.u8();
        let parameter2 = header.u16();
        let parameter3 = header.u16();

        Some(Message {
            serial,
            id,
            parameter1,
            parameter2,
            parameter3,
            payload: frame[HEADER_SIZE..body_end].to_vec(),
        })
    }
}
