//! Driver for IMI Gliding recorders (ERIXX and relatives).
//!
//! The recorder speaks a framed binary protocol (see [`message`]). A
//! configuration session is opened with HELLO / STARTCONFIG / DEVICEINFO and
//! closed with BYE; every operation here wraps its exchanges in one session.
//!
//! Flights are read straight from flash. A stored flight is laid out as
//!
//! ```text
//! address: declaration (768) | fixes x 16 | signature (132)
//! ```
//!
//! and converted to IGC text on the fly by [`IgcConverter`].

mod igc;
pub mod message;
mod parser;
pub mod records;
mod session;
pub mod types;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::checksum::rle_decompress;
use crate::declaration::{Declaration, DeclarationLimits};
use crate::error::{Error, Result};
use crate::igc::IgcWriter;
use crate::operation::OperationHandle;
use crate::port::{Port, PortGuard};

use super::{Device, FlightHandle, RecordedFlight};

pub use igc::{serial_code, signature_lines, IgcConverter};
pub use message::{Message, MessageId, MAX_PAYLOAD_SIZE};
pub use parser::MessageParser;
pub use session::{Expect, Session, DEFAULT_TIMEOUT};
use records::RECORD_SIZE;
use types::{to_datetime, FlightInfo, ImiDeclaration, ImiWaypoint, Signature};

/// Driver name used in logs and errors.
pub const DEVICE_NAME: &str = "IMI";

/// Default number of attempts per request.
pub const DEFAULT_RETRIES: u32 = 4;

/// Flight list entries requested per page.
const FLIGHT_INFO_PAGE: u8 = 32;

/// Cursor value that marks the end of the flight list.
const END_OF_LIST: u16 = 0xFFFF;

/// Fix bytes fetched per flash read.
const FIX_CHUNK: usize = MAX_PAYLOAD_SIZE / RECORD_SIZE * RECORD_SIZE;

/// Run `exchange` inside a configuration session.
///
/// The port settings are restored and BYE is sent however `exchange` ends.
fn with_session<T>(
    port: &mut dyn Port,
    session: &mut Session,
    exchange: impl FnOnce(&mut Session, &mut dyn Port) -> Result<T>,
) -> Result<T> {
    let mut guard = PortGuard::new(port);
    session.connect(&mut *guard)?;
    let result = exchange(&mut *session, &mut *guard);
    if let Err(e) = session.disconnect(&mut *guard) {
        warn!(error = %e, "Failed to close IMI session");
    }
    result
}

/// Read `size` bytes of flash starting at `address`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the reply does not echo the requested
/// size, or [`Error::Decompress`] if a compressed reply has the wrong length.
pub fn read_flash(
    session: &mut Session,
    port: &mut dyn Port,
    address: u32,
    size: usize,
) -> Result<Vec<u8>> {
    let length = u16::try_from(size)
        .ok()
        .filter(|_| size <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| Error::internal(format!("flash read of {size} bytes")))?;
    let (high, low) = message::split_big_parameter(address);
    let request = session
        .request(MessageId::Flash)
        .with_parameters(high, low, length);
    let extra = Session::reply_timeout(port, DEFAULT_TIMEOUT, size)?;
    let reply = session.send_ret(port, &request, Expect::reply(MessageId::Flash).with_timeout(extra))?;

    if reply.parameter3 != length {
        return Err(Error::protocol(format!(
            "flash reply of {} bytes, requested {size}",
            reply.parameter3
        )));
    }
    if reply.parameter1 != 0 {
        return rle_decompress(&reply.payload, size);
    }
    if reply.payload.len() != size {
        return Err(Error::protocol(format!(
            "flash payload of {} bytes, requested {size}",
            reply.payload.len()
        )));
    }
    Ok(reply.payload)
}

/// `base + offset`, rejecting addresses past the 32-bit flash space.
fn flash_address(base: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| Error::protocol(format!("flash address {base:#x} + {offset} out of range")))
}

fn to_recorded_flight(entry: &FlightInfo) -> Option<RecordedFlight> {
    let start = to_datetime(entry.start)?;
    let finish = to_datetime(entry.finish)?;
    Some(RecordedFlight {
        date: start.date(),
        start_time: start.time(),
        end_time: finish.time(),
        handle: FlightHandle::Imi {
            address: entry.address,
            fixes: entry.fixes,
        },
    })
}

/// An IMI recorder on a port.
#[derive(Debug)]
pub struct ImiDevice<P: Port> {
    port: P,
    session: Session,
}

impl<P: Port> ImiDevice<P> {
    /// Create a driver using the default retry count.
    pub fn new(port: P) -> Self {
        Self::with_retries(port, DEFAULT_RETRIES)
    }

    /// Create a driver that tries each request `retries` times.
    pub fn with_retries(port: P, retries: u32) -> Self {
        Self {
            port,
            session: Session::new(retries),
        }
    }

    /// The underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Session state of the last exchange.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Give the port back.
    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P: Port> Device for ImiDevice<P> {
    fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    fn limits(&self) -> DeclarationLimits {
        DeclarationLimits::new(ImiDeclaration::MAX_TURN_POINTS)
            .with_max_name_length(ImiWaypoint::NAME_LENGTH)
    }

    fn declare(&mut self, declaration: &Declaration, _operation: &OperationHandle) -> Result<()> {
        declaration.validate(&self.limits())?;
        let block = ImiDeclaration::from_declaration(declaration)?;

        with_session(&mut self.port, &mut self.session, |session, port| {
            let request = session
                .request(MessageId::Declaration)
                .with_payload(block.encode());
            session.send_ret(port, &request, Expect::reply(MessageId::AckSuccess))?;
            info!(turn_points = declaration.len(), "Declaration sent to IMI recorder");
            Ok(())
        })
    }

    fn read_flight_list(&mut self, operation: &OperationHandle) -> Result<Vec<RecordedFlight>> {
        with_session(&mut self.port, &mut self.session, |session, port| {
            let mut flights = Vec::new();
            // (address, stop address) the recorder hands back with every page
            let mut cursor = 0u16;
            let mut stop = END_OF_LIST;
            loop {
                operation.checkpoint()?;
                let request = session
                    .request(MessageId::FlightInfo)
                    .with_parameters(FLIGHT_INFO_PAGE, cursor, stop);
                let extra = Session::reply_timeout(
                    port,
                    DEFAULT_TIMEOUT,
                    usize::from(FLIGHT_INFO_PAGE) * FlightInfo::SIZE,
                )?;
                let reply = session.send_ret(
                    port,
                    &request,
                    Expect::reply(MessageId::FlightInfo).with_timeout(extra),
                )?;
                if reply.payload.is_empty() {
                    break;
                }

                let page = FlightInfo::decode_page(&reply.payload);
                debug!(cursor, stop, entries = page.len(), "Flight list page");
                flights.extend(page.iter().filter_map(to_recorded_flight));

                // a cursor that does not move would loop forever
                if reply.parameter2 == END_OF_LIST || reply.parameter2 == cursor {
                    break;
                }
                cursor = reply.parameter2;
                stop = reply.parameter3;
            }
            Ok(flights)
        })
    }

    fn download_flight(
        &mut self,
        flight: &RecordedFlight,
        path: &Path,
        operation: &OperationHandle,
    ) -> Result<()> {
        let FlightHandle::Imi { address, fixes } = flight.handle else {
            return Err(Error::unsupported(DEVICE_NAME, "flights of other recorders"));
        };

        with_session(&mut self.port, &mut self.session, |session, port| {
            let fix_bytes = usize::try_from(fixes)
                .ok()
                .and_then(|n| n.checked_mul(RECORD_SIZE))
                .ok_or_else(|| Error::protocol(format!("flight with {fixes} fixes")))?;
            let total = ImiDeclaration::SIZE + fix_bytes + Signature::SIZE;
            operation.set_progress_range(total as u64);
            operation.set_progress_position(0);
            operation.checkpoint()?;

            let mut declaration_bytes = Vec::with_capacity(ImiDeclaration::SIZE);
            let mut offset = 0;
            while offset < ImiDeclaration::SIZE {
                let size = (ImiDeclaration::SIZE - offset).min(MAX_PAYLOAD_SIZE);
                let at = flash_address(address, offset)?;
                declaration_bytes.extend(read_flash(session, port, at, size)?);
                offset += size;
            }
            let declaration = ImiDeclaration::decode(&declaration_bytes)?;
            operation.set_progress_position(offset as u64);

            let file = File::create(path).map_err(|source| Error::FileOpen {
                path: path.to_path_buf(),
                source,
            })?;
            let mut writer = IgcWriter::new(BufWriter::new(file));
            let mut converter = IgcConverter::new(&declaration);
            let tampered = session.info().tampered != 0;
            writer.write_lines(converter.header_lines(&declaration, tampered))?;

            let fixes_start = flash_address(address, ImiDeclaration::SIZE)?;
            let mut done = 0;
            while done < fix_bytes {
                operation.checkpoint()?;
                let size = (fix_bytes - done).min(FIX_CHUNK);
                let chunk = read_flash(session, port, flash_address(fixes_start, done)?, size)?;
                for record in chunk.chunks_exact(RECORD_SIZE) {
                    writer.write_lines(converter.fix_lines(record))?;
                }
                done += size;
                operation.set_progress_position((ImiDeclaration::SIZE + done) as u64);
            }

            operation.checkpoint()?;
            let at = flash_address(fixes_start, fix_bytes)?;
            let signature_bytes = read_flash(session, port, at, Signature::SIZE)?;
            let signature = Signature::decode(&signature_bytes);
            writer.write_lines(signature_lines(&signature, declaration.header.serial))?;
            writer.into_inner()?;
            operation.set_progress_position(total as u64);

            info!(path = %path.display(), fixes, "IMI flight downloaded");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::message::join_big_parameter;
    use super::records::tests::full_fix;
    use super::records::{FixDelta, FixK, FixRecord};
    use super::session::tests::{connected, frames, responder, SERIAL};
    use super::types::from_datetime;
    use super::*;
    use crate::checksum::rle_compress;
    use crate::declaration::tests::{alpha_bravo_task, task_with};
    use crate::port::mock::ScriptedPort;

    const FLIGHT_ADDRESS: u32 = 0x1000;

    type Log<T> = Arc<Mutex<Vec<T>>>;

    fn recording_start() -> u32 {
        from_datetime(
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        )
        .unwrap()
    }

    /// Flash contents with one flight stored at [`FLIGHT_ADDRESS`].
    fn flash_image(records: &[FixRecord]) -> Vec<u8> {
        let mut decl = ImiDeclaration::from_declaration(&alpha_bravo_task()).unwrap();
        decl.header.serial = SERIAL;
        decl.header.sensor = 1;
        decl.header.recording_start = recording_start();

        let mut image = vec![0xFF; FLIGHT_ADDRESS as usize];
        image.extend(decl.encode());
        for record in records {
            image.extend(record.encode());
        }
        image.extend(
            Signature {
                rsa_bits: 512,
                tampered: false,
                data: (1..=128).collect(),
            }
            .encode(),
        );
        image
    }

    /// Serve flash reads from `image`, logging `(address, size)` per read.
    fn flash_server(
        image: Vec<u8>,
        compress: bool,
        reads: Log<(u32, u16)>,
    ) -> impl FnMut(&Message) -> Vec<Message> + Send + 'static {
        move |request| {
            if !request.is(MessageId::Flash) {
                return Vec::new();
            }
            let address = join_big_parameter(request.parameter1, request.parameter2);
            let size = request.parameter3;
            reads.lock().unwrap().push((address, size));

            let start = address as usize;
            let mut data = image
                .get(start..)
                .unwrap_or_default()
                .iter()
                .take(usize::from(size))
                .copied()
                .collect::<Vec<u8>>();
            data.resize(usize::from(size), 0xFF);

            let packed = rle_compress(&data);
            let (flag, payload) = if compress && packed.len() <= MAX_PAYLOAD_SIZE {
                (1, packed)
            } else {
                (0, data)
            };
            vec![Message::new(SERIAL, MessageId::Flash)
                .with_parameters(flag, 0, size)
                .with_payload(payload)]
        }
    }

    fn fast_port(handler: impl FnMut(&Message) -> Vec<Message> + Send + 'static) -> ScriptedPort {
        let mut port = ScriptedPort::new(responder(handler));
        port.set_baud_rate(115_200).unwrap();
        port
    }

    fn sent_ids(port: &ScriptedPort) -> Vec<u8> {
        frames(&port.writes().concat()).iter().map(|m| m.id).collect()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("igcrecorder-imi-{}-{name}.igc", std::process::id()))
    }

    fn flight(fixes: u32) -> RecordedFlight {
        let start = to_datetime(recording_start()).unwrap();
        RecordedFlight {
            date: start.date(),
            start_time: start.time(),
            end_time: start.time(),
            handle: FlightHandle::Imi {
                address: FLIGHT_ADDRESS,
                fixes,
            },
        }
    }

    #[test]
    fn test_declare_sends_block() {
        let received: Log<Vec<u8>> = Arc::default();
        let log = Arc::clone(&received);
        let port = fast_port(move |request| {
            if request.is(MessageId::Declaration) {
                log.lock().unwrap().push(request.payload.clone());
                vec![Message::new(SERIAL, MessageId::AckSuccess)]
            } else {
                Vec::new()
            }
        });
        let mut device = ImiDevice::new(port);
        device
            .declare(&alpha_bravo_task(), &OperationHandle::new())
            .unwrap();

        let blocks = received.lock().unwrap();
        assert_eq!(blocks.len(), 1);
        let decl = ImiDeclaration::decode(&blocks[0]).unwrap();
        assert_eq!(decl.header.pilot, "Jane Doe");
        assert_eq!(decl.waypoints[2].name, "Bravo");
        assert_eq!(decl.turn_point_count(), 3);

        let ids = sent_ids(device.port());
        assert_eq!(ids.first(), Some(&(MessageId::Hello as u8)));
        assert_eq!(ids.last(), Some(&(MessageId::Bye as u8)));
        assert!(!device.session().is_connected());
        assert_eq!(device.port().rx_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_declare_turn_point_boundaries() {
        let accept = |request: &Message| {
            if request.is(MessageId::Declaration) {
                vec![Message::new(SERIAL, MessageId::AckSuccess)]
            } else {
                Vec::new()
            }
        };
        let op = OperationHandle::new();

        for count in [0, 1, 14] {
            let mut device = ImiDevice::new(fast_port(accept));
            let err = device.declare(&task_with(count), &op).unwrap_err();
            assert!(err.is_invalid_declaration(), "{count} turn points");
            assert!(device.port().writes().is_empty());
        }

        for count in [2, 13] {
            let mut device = ImiDevice::new(fast_port(accept));
            assert!(device.declare(&task_with(count), &op).is_ok(), "{count} turn points");
        }
    }

    #[test]
    fn test_declare_rejects_long_names() {
        let mut task = alpha_bravo_task();
        task.turn_points[1].waypoint.name = "ABCDEFGHIJKLM".to_string();
        let mut device = ImiDevice::new(fast_port(|_| Vec::new()));
        let err = device.declare(&task, &OperationHandle::new()).unwrap_err();
        assert!(err.is_invalid_declaration());
        assert!(device.port().writes().is_empty());
    }

    #[test]
    fn test_declare_failure_closes_session() {
        let port = fast_port(|request| {
            if request.is(MessageId::Declaration) {
                vec![Message::new(SERIAL, MessageId::AckFailure)]
            } else {
                Vec::new()
            }
        });
        let mut device = ImiDevice::with_retries(port, 2);
        let err = device
            .declare(&alpha_bravo_task(), &OperationHandle::new())
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        let ids = sent_ids(device.port());
        let declarations = ids
            .iter()
            .filter(|&&id| id == MessageId::Declaration as u8)
            .count();
        assert_eq!(declarations, 2);
        assert_eq!(ids.last(), Some(&(MessageId::Bye as u8)));
        assert_eq!(device.port().rx_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_read_flight_list_pages() {
        let cursors: Log<(u16, u16)> = Arc::default();
        let log = Arc::clone(&cursors);
        let entry = |address: u32, start: u32| FlightInfo {
            address,
            fixes: 100,
            start,
            finish: start + 3600,
            flight_of_day: 1,
            pilot: "Jane".to_string(),
        };
        let base = recording_start();
        let port = fast_port(move |request| {
            if !request.is(MessageId::FlightInfo) {
                return Vec::new();
            }
            log.lock()
                .unwrap()
                .push((request.parameter2, request.parameter3));
            let (entries, next, stop) = if request.parameter2 == 0 {
                (vec![entry(0x1000, base), entry(0x3000, base + 7200)], 2, 0x0040)
            } else {
                (vec![entry(0x5000, base + 86_400)], END_OF_LIST, 0)
            };
            let payload = entries.iter().flat_map(FlightInfo::encode).collect();
            vec![Message::new(SERIAL, MessageId::FlightInfo)
                .with_parameters(0, next, stop)
                .with_payload(payload)]
        });

        let mut device = ImiDevice::new(port);
        let flights = device.read_flight_list(&OperationHandle::new()).unwrap();
        assert_eq!(
            *cursors.lock().unwrap(),
            vec![(0, END_OF_LIST), (2, 0x0040)]
        );
        assert_eq!(flights.len(), 3);
        assert_eq!(flights[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(flights[0].start_time.to_string(), "10:00:00");
        assert_eq!(flights[0].end_time.to_string(), "11:00:00");
        assert_eq!(flights[2].date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(
            flights[1].handle,
            FlightHandle::Imi {
                address: 0x3000,
                fixes: 100
            }
        );
    }

    #[test]
    fn test_read_flight_list_empty() {
        let port = fast_port(|request| {
            if request.is(MessageId::FlightInfo) {
                vec![Message::new(SERIAL, MessageId::FlightInfo)]
            } else {
                Vec::new()
            }
        });
        let mut device = ImiDevice::new(port);
        assert!(device
            .read_flight_list(&OperationHandle::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_read_flash_compressed() {
        let image = flash_image(&[FixRecord::B(full_fix())]);
        let expected = image[FLIGHT_ADDRESS as usize..][..ImiDeclaration::SIZE].to_vec();
        let reads: Log<(u32, u16)> = Arc::default();
        let (mut port, mut session) = connected(flash_server(image, true, reads));
        let data = read_flash(&mut session, &mut port, FLIGHT_ADDRESS, ImiDeclaration::SIZE).unwrap();
        assert_eq!(data, expected);
    }

    #[test]
    fn test_read_flash_size_mismatch() {
        let (mut port, mut session) = connected(|request| {
            if request.is(MessageId::Flash) {
                vec![Message::new(SERIAL, MessageId::Flash)
                    .with_parameters(0, 0, request.parameter3 - 1)
                    .with_payload(vec![0; 15])]
            } else {
                Vec::new()
            }
        });
        let err = read_flash(&mut session, &mut port, 0, 16).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_download_flight() {
        let mut records = vec![FixRecord::B(full_fix())];
        records.extend((0..3).map(|_| FixRecord::B2([FixDelta::default(); 2])));
        records.extend((0..66u32).map(|i| {
            FixRecord::K(FixK {
                time: 13 * 3600 + i,
                heading: 180,
                ground_speed: 95,
            })
        }));
        let fixes = u32::try_from(records.len()).unwrap();

        let reads: Log<(u32, u16)> = Arc::default();
        let port = fast_port(flash_server(flash_image(&records), false, Arc::clone(&reads)));
        let mut device = ImiDevice::new(port);
        let path = temp_path("download");
        let op = OperationHandle::new();
        device.download_flight(&flight(fixes), &path, &op).unwrap();

        let sizes: Vec<u16> = reads.lock().unwrap().iter().map(|&(_, size)| size).collect();
        assert_eq!(sizes, vec![768, 1024, 96, 132]);
        assert_eq!(reads.lock().unwrap()[3].0, FLIGHT_ADDRESS + 768 + 70 * 16);

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(text.ends_with("\r\n"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "AIMI093");
        assert_eq!(lines[1], "HFDTE010524");
        assert_eq!(lines.iter().filter(|l| l.starts_with('B')).count(), 7);
        assert_eq!(lines.iter().filter(|l| l.starts_with('K')).count(), 66);
        let g: Vec<&&str> = lines.iter().filter(|l| l.starts_with('G')).collect();
        assert_eq!(g.len(), 2);
        assert!(g[0].starts_with("G010203"));

        let total = 768 + 70 * 16 + 132;
        assert_eq!(op.progress(), (total, total));
        assert_eq!(sent_ids(device.port()).last(), Some(&(MessageId::Bye as u8)));
    }

    #[test]
    fn test_download_cancelled() {
        let reads: Log<(u32, u16)> = Arc::default();
        let port = fast_port(flash_server(flash_image(&[]), false, Arc::clone(&reads)));
        let mut device = ImiDevice::new(port);
        let path = temp_path("cancelled");
        let op = OperationHandle::new();
        op.cancel();

        let err = device.download_flight(&flight(0), &path, &op).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(reads.lock().unwrap().is_empty());
        assert!(!path.exists());
        assert_eq!(sent_ids(device.port()).last(), Some(&(MessageId::Bye as u8)));
    }

    #[test]
    fn test_download_rejects_foreign_handle() {
        let mut device = ImiDevice::new(fast_port(|_| Vec::new()));
        let mut other = flight(0);
        other.handle = FlightHandle::Nano {
            filename: "x".to_string(),
        };
        let err = device
            .download_flight(&other, &temp_path("foreign"), &OperationHandle::new())
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
        assert!(device.port().writes().is_empty());
    }
}
