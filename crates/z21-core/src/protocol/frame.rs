//! Frame splitting and classification.
//!
//! Wire format of one frame:
//! ```text
//! [length:u16 LE][header:u16 LE][payload: length-4 bytes]
//! ```
//! A single UDP datagram may carry several frames back to back.  The parser
//! walks them in order and stops at the first frame whose declared length is
//! impossible (shorter than the 4-byte envelope, or running past the end of the
//! buffer).  Whatever was parsed before that point is returned; malformed input
//! never produces an error.
//!
//! # X-BUS tunnel
//!
//! Frames with header [`LAN_X`] carry an X-BUS message:
//! ```text
//! [xHeader][db0 .. dbN][checksum]
//! ```
//! where `checksum` is the XOR of `xHeader` and every data byte.  A wrong
//! checksum does not drop the frame.  The X-BUS dataset is still produced, and
//! a [`Dataset::BadChecksum`] follows it so the fault stays visible.

use tracing::{debug, warn};

use crate::protocol::system_state::{SystemState, SYSTEM_STATE_LEN};

// ── Envelope headers ──────────────────────────────────────────────────────────

pub const LAN_GET_SERIAL_NUMBER: u16 = 0x10;
pub const LAN_GET_CODE: u16 = 0x18;
pub const LAN_GET_HWINFO: u16 = 0x1A;
pub const LAN_LOGOFF: u16 = 0x30;
pub const LAN_X: u16 = 0x40;
pub const LAN_SET_BROADCASTFLAGS: u16 = 0x50;
pub const LAN_SYSTEMSTATE_DATACHANGED: u16 = 0x84;
pub const LAN_SYSTEMSTATE_GETDATA: u16 = 0x85;

/// Size of the `length` + `header` envelope.
pub const ENVELOPE_SIZE: usize = 4;

const HWINFO_PAYLOAD_LEN: usize = 8;
const CODE_PAYLOAD_LEN: usize = 1;

/// One classified frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    /// X-BUS tunnel.  `data` excludes both the `xHeader` and the checksum.
    XBus { x_header: u8, data: Vec<u8> },

    /// Unsolicited or requested system-state snapshot.
    SystemState(SystemState),

    /// Answer to the hardware-info request.  `firmware_bcd` is e.g. `0x0120`.
    HardwareInfo { hardware_type: u32, firmware_bcd: u32 },

    /// Answer to the get-code request.
    Code(u8),

    /// Emitted right after an [`XBus`](Dataset::XBus) dataset whose checksum
    /// did not match.
    BadChecksum { x_header: u8, data: Vec<u8>, expected: u8, actual: u8 },

    /// Anything not recognised, kept verbatim for diagnostics.
    Unknown { header: u16, payload: Vec<u8> },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Splits `buf` into frames and classifies each one.
///
/// # Examples
///
/// ```rust
/// use z21_core::protocol::frame::{parse_datagram, Dataset};
///
/// // LAN_X_STATUS_CHANGED answer: 62 22 00, checksum 0x40
/// let buf = [0x08, 0x00, 0x40, 0x00, 0x62, 0x22, 0x00, 0x40];
/// let datasets = parse_datagram(&buf);
/// assert_eq!(datasets, vec![Dataset::XBus { x_header: 0x62, data: vec![0x22, 0x00] }]);
/// ```
pub fn parse_datagram(buf: &[u8]) -> Vec<Dataset> {
    let mut datasets = Vec::new();
    let mut offset = 0;

    while buf.len() - offset >= ENVELOPE_SIZE {
        let length = usize::from(u16::from_le_bytes([buf[offset], buf[offset + 1]]));
        let header = u16::from_le_bytes([buf[offset + 2], buf[offset + 3]]);

        if length < ENVELOPE_SIZE || offset + length > buf.len() {
            debug!(
                offset,
                length,
                available = buf.len() - offset,
                "stopping at truncated or corrupt frame"
            );
            break;
        }

        let payload = &buf[offset + ENVELOPE_SIZE..offset + length];
        classify(header, payload, &mut datasets);
        offset += length;
    }

    datasets
}

/// XOR of all bytes, the X-BUS checksum.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Wraps `payload` in the length + header envelope.
pub fn encode_frame(header: u16, payload: &[u8]) -> Vec<u8> {
    let length = (ENVELOPE_SIZE + payload.len()) as u16;
    let mut buf = Vec::with_capacity(usize::from(length));
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&header.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Builds a complete X-BUS frame, appending the checksum.
pub fn encode_xbus(x_header: u8, data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(data.len() + 2);
    payload.push(x_header);
    payload.extend_from_slice(data);
    payload.push(xor_checksum(&payload));
    encode_frame(LAN_X, &payload)
}

// ── Classification ────────────────────────────────────────────────────────────

fn classify(header: u16, payload: &[u8], out: &mut Vec<Dataset>) {
    match header {
        LAN_X if payload.len() >= 2 => {
            let (body, checksum) = payload.split_at(payload.len() - 1);
            let x_header = body[0];
            let data = body[1..].to_vec();
            let expected = xor_checksum(body);
            let actual = checksum[0];

            out.push(Dataset::XBus { x_header, data: data.clone() });
            if expected != actual {
                warn!(x_header, expected, actual, "X-BUS checksum mismatch");
                out.push(Dataset::BadChecksum { x_header, data, expected, actual });
            }
        }
        LAN_SYSTEMSTATE_DATACHANGED if payload.len() == SYSTEM_STATE_LEN => {
            let mut raw = [0u8; SYSTEM_STATE_LEN];
            raw.copy_from_slice(payload);
            out.push(Dataset::SystemState(SystemState::from_bytes(&raw)));
        }
        LAN_GET_HWINFO if payload.len() == HWINFO_PAYLOAD_LEN => {
            out.push(Dataset::HardwareInfo {
                hardware_type: read_u32_le(payload, 0),
                firmware_bcd: read_u32_le(payload, 4),
            });
        }
        LAN_GET_CODE if payload.len() == CODE_PAYLOAD_LEN => {
            out.push(Dataset::Code(payload[0]));
        }
        _ => {
            debug!("unclassified frame 0x{header:04X} ({} bytes)", payload.len());
            out.push(Dataset::Unknown { header, payload: payload.to_vec() });
        }
    }
}

/// Caller guarantees `buf.len() >= offset + 4`.
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
