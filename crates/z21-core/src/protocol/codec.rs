//! Request encoders, and their inverse for diagnostics.
//!
//! Every outbound command is a [`Request`].  [`encode_request`] validates the
//! numeric inputs and produces a complete frame (envelope, X-BUS header,
//! checksum).  [`decode_request`] reads such a frame back, which lets the
//! bridge log what it sent and lets the tests check the encoders against the
//! decoders.
//!
//! # Address encoding
//!
//! | kind        | range      | wire                                           |
//! |-------------|------------|------------------------------------------------|
//! | locomotive  | 1–9999     | `MSB LSB`; `MSB \|= 0xC0` when address ≥ 128   |
//! | accessory   | 0–16383    | `MSB LSB`                                      |
//! | CV          | 1–1024     | `cv - 1` as `MSB LSB`                          |

use thiserror::Error;

use crate::domain::accessory::{TurnoutPosition, MAX_ACCESSORY_ADDRESS};
use crate::domain::loco::{
    Direction, FunctionAction, LocoSpeed, SpeedSteps, MAX_FUNCTION, MAX_LOCO_ADDRESS,
    MIN_LOCO_ADDRESS,
};
use crate::protocol::commands::{command_args, lookup, spec_for, CommandKey, SubCommand};
use crate::protocol::frame::{
    encode_frame, encode_xbus, parse_datagram, Dataset, LAN_GET_CODE, LAN_GET_HWINFO, LAN_LOGOFF,
    LAN_SET_BROADCASTFLAGS, LAN_SYSTEMSTATE_GETDATA,
};

pub const MIN_CV: u16 = 1;
pub const MAX_CV: u16 = 1024;

/// Marks a long (≥ 128) locomotive address in the MSB.
const LONG_ADDRESS_MARKER: u8 = 0xC0;
const LONG_ADDRESS_THRESHOLD: u16 = 128;

const DRIVE_SUB_COMMAND: u8 = 0x10;

/// Errors raised by the encoders for out-of-range inputs.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    #[error("locomotive address {0} out of range {MIN_LOCO_ADDRESS}..={MAX_LOCO_ADDRESS}")]
    InvalidLocoAddress(u16),

    #[error("accessory address {0} out of range 0..={MAX_ACCESSORY_ADDRESS}")]
    InvalidAccessoryAddress(u16),

    #[error("CV {0} out of range {MIN_CV}..={MAX_CV}")]
    InvalidCv(u16),

    #[error("function F{0} out of range F0..=F{MAX_FUNCTION}")]
    InvalidFunction(u8),

    #[error("speed step {step} out of range 1..={max}")]
    InvalidSpeed { step: u8, max: u8 },

    #[error("{0:?} is not an outbound command")]
    NotOutbound(CommandKey),
}

/// Drive command for one locomotive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveCommand {
    pub address: u16,
    pub speed_steps: SpeedSteps,
    pub speed: LocoSpeed,
    pub direction: Direction,
}

/// Every command the bridge sends to the command station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Logoff,
    SetBroadcastFlags(u32),
    SystemStateGetData,
    GetHardwareInfo,
    GetCode,
    GetXBusVersion,
    GetStatus,
    SetTrackPower(bool),
    /// Stop all locomotives.
    SetStop,
    GetFirmwareVersion,
    GetLocoInfo { address: u16 },
    SetLocoDrive(DriveCommand),
    SetLocoFunction { address: u16, function: u8, action: FunctionAction },
    SetLocoEStop { address: u16 },
    GetTurnoutInfo { address: u16 },
    /// `activate` switches the output on or off; `queue` asks the station to
    /// buffer the command instead of executing it immediately.
    SetTurnout { address: u16, position: TurnoutPosition, activate: bool, queue: bool },
    CvRead { cv: u16 },
    CvWrite { cv: u16, value: u8 },
}

// ── Address helpers ───────────────────────────────────────────────────────────

pub fn encode_loco_address(address: u16) -> Result<[u8; 2], ProtocolError> {
    if !(MIN_LOCO_ADDRESS..=MAX_LOCO_ADDRESS).contains(&address) {
        return Err(ProtocolError::InvalidLocoAddress(address));
    }
    let [mut msb, lsb] = address.to_be_bytes();
    if address >= LONG_ADDRESS_THRESHOLD {
        msb |= LONG_ADDRESS_MARKER;
    }
    Ok([msb, lsb])
}

pub fn decode_loco_address(msb: u8, lsb: u8) -> u16 {
    u16::from(msb & 0x3F) << 8 | u16::from(lsb)
}

pub fn encode_accessory_address(address: u16) -> Result<[u8; 2], ProtocolError> {
    if address > MAX_ACCESSORY_ADDRESS {
        return Err(ProtocolError::InvalidAccessoryAddress(address));
    }
    Ok(address.to_be_bytes())
}

pub fn decode_accessory_address(msb: u8, lsb: u8) -> u16 {
    u16::from(msb & 0x3F) << 8 | u16::from(lsb)
}

pub fn encode_cv_address(cv: u16) -> Result<[u8; 2], ProtocolError> {
    if !(MIN_CV..=MAX_CV).contains(&cv) {
        return Err(ProtocolError::InvalidCv(cv));
    }
    Ok((cv - 1).to_be_bytes())
}

pub fn decode_cv_address(msb: u8, lsb: u8) -> u16 {
    u16::from_be_bytes([msb, lsb]).wrapping_add(1)
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes `request` into a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] when an address, CV number, function index, or
/// speed step is out of range.  Nothing is encoded in that case.
///
/// # Examples
///
/// ```rust
/// use z21_core::protocol::codec::{encode_request, Request};
///
/// let bytes = encode_request(&Request::SetTrackPower(true)).unwrap();
/// assert_eq!(bytes, vec![0x07, 0x00, 0x40, 0x00, 0x21, 0x81, 0xA0]);
/// ```
pub fn encode_request(request: &Request) -> Result<Vec<u8>, ProtocolError> {
    let frame = match request {
        Request::Logoff => encode_frame(LAN_LOGOFF, &[]),
        Request::SetBroadcastFlags(flags) => encode_frame(LAN_SET_BROADCASTFLAGS, &flags.to_le_bytes()),
        Request::SystemStateGetData => encode_frame(LAN_SYSTEMSTATE_GETDATA, &[]),
        Request::GetHardwareInfo => encode_frame(LAN_GET_HWINFO, &[]),
        Request::GetCode => encode_frame(LAN_GET_CODE, &[]),
        Request::GetXBusVersion => xbus(CommandKey::GetXBusVersion, &[])?,
        Request::GetStatus => xbus(CommandKey::GetStatus, &[])?,
        Request::SetTrackPower(true) => xbus(CommandKey::SetTrackPowerOn, &[])?,
        Request::SetTrackPower(false) => xbus(CommandKey::SetTrackPowerOff, &[])?,
        Request::SetStop => xbus(CommandKey::SetStop, &[])?,
        Request::GetFirmwareVersion => xbus(CommandKey::GetFirmwareVersion, &[])?,
        Request::GetLocoInfo { address } => xbus(CommandKey::GetLocoInfo, &encode_loco_address(*address)?)?,
        Request::SetLocoDrive(drive) => encode_drive(drive)?,
        Request::SetLocoFunction { address, function, action } => {
            if *function > MAX_FUNCTION {
                return Err(ProtocolError::InvalidFunction(*function));
            }
            let [msb, lsb] = encode_loco_address(*address)?;
            xbus(CommandKey::SetLocoFunction, &[msb, lsb, action.wire_code() << 6 | function])?
        }
        Request::SetLocoEStop { address } => xbus(CommandKey::SetLocoEStop, &encode_loco_address(*address)?)?,
        Request::GetTurnoutInfo { address } => {
            xbus(CommandKey::GetTurnoutInfo, &encode_accessory_address(*address)?)?
        }
        Request::SetTurnout { address, position, activate, queue } => {
            let [msb, lsb] = encode_accessory_address(*address)?;
            // 10Q0A00P
            let db2 = 0x80
                | u8::from(*queue) << 5
                | u8::from(*activate) << 3
                | position.output_bit();
            xbus(CommandKey::SetTurnout, &[msb, lsb, db2])?
        }
        Request::CvRead { cv } => xbus(CommandKey::CvRead, &encode_cv_address(*cv)?)?,
        Request::CvWrite { cv, value } => {
            let [msb, lsb] = encode_cv_address(*cv)?;
            xbus(CommandKey::CvWrite, &[msb, lsb, *value])?
        }
    };
    Ok(frame)
}

fn encode_drive(drive: &DriveCommand) -> Result<Vec<u8>, ProtocolError> {
    let [msb, lsb] = encode_loco_address(drive.address)?;
    let max = drive.speed_steps.max_step();
    if let LocoSpeed::Step(step) = drive.speed {
        if step == 0 || step > max {
            return Err(ProtocolError::InvalidSpeed { step, max });
        }
    }
    let direction = match drive.direction {
        Direction::Forward => 0x80,
        Direction::Reverse => 0x00,
    };
    // 0x1S, S = step mode
    let db0 = DRIVE_SUB_COMMAND | drive.speed_steps.drive_code();
    xbus(CommandKey::SetLocoDrive, &[db0, msb, lsb, direction | drive.speed.to_raw()])
}

/// Prepends the table's sub-command byte (if any) to `args`.
fn xbus(key: CommandKey, args: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let spec = spec_for(key).ok_or(ProtocolError::NotOutbound(key))?;
    let frame = match spec.db0 {
        SubCommand::Exact(db0) => {
            let mut data = Vec::with_capacity(args.len() + 1);
            data.push(db0);
            data.extend_from_slice(args);
            encode_xbus(spec.x_header, &data)
        }
        SubCommand::None | SubCommand::Masked { .. } => encode_xbus(spec.x_header, args),
    };
    Ok(frame)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Reads back the first frame of an encoded request.
///
/// Returns `None` for frames that are not a known outbound command or whose
/// arguments are too short.
pub fn decode_request(bytes: &[u8]) -> Option<Request> {
    match parse_datagram(bytes).into_iter().next()? {
        Dataset::XBus { x_header, data } => decode_xbus_request(x_header, &data),
        Dataset::Unknown { header, payload } => match header {
            LAN_LOGOFF => Some(Request::Logoff),
            LAN_SYSTEMSTATE_GETDATA => Some(Request::SystemStateGetData),
            LAN_GET_HWINFO => Some(Request::GetHardwareInfo),
            LAN_GET_CODE => Some(Request::GetCode),
            LAN_SET_BROADCASTFLAGS => match payload.as_slice() {
                [a, b, c, d] => Some(Request::SetBroadcastFlags(u32::from_le_bytes([*a, *b, *c, *d]))),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn decode_xbus_request(x_header: u8, data: &[u8]) -> Option<Request> {
    let key = lookup(x_header, data)?.key;
    let args = command_args(x_header, data);
    let loco = |a: &[u8]| a.get(..2).map(|b| decode_loco_address(b[0], b[1]));
    let accessory = |a: &[u8]| a.get(..2).map(|b| decode_accessory_address(b[0], b[1]));
    let cv = |a: &[u8]| a.get(..2).map(|b| decode_cv_address(b[0], b[1]));

    let request = match key {
        CommandKey::GetXBusVersion => Request::GetXBusVersion,
        CommandKey::GetStatus => Request::GetStatus,
        CommandKey::SetTrackPowerOn => Request::SetTrackPower(true),
        CommandKey::SetTrackPowerOff => Request::SetTrackPower(false),
        CommandKey::SetStop => Request::SetStop,
        CommandKey::GetFirmwareVersion => Request::GetFirmwareVersion,
        CommandKey::GetLocoInfo => Request::GetLocoInfo { address: loco(args)? },
        CommandKey::SetLocoEStop => Request::SetLocoEStop { address: loco(args)? },
        CommandKey::SetLocoDrive => {
            let &[db0, msb, lsb, speed] = args.get(..4)? else { return None };
            Request::SetLocoDrive(DriveCommand {
                address: decode_loco_address(msb, lsb),
                speed_steps: SpeedSteps::from_drive_code(db0 & 0x0F)?,
                speed: LocoSpeed::from_raw(speed),
                direction: if speed & 0x80 != 0 { Direction::Forward } else { Direction::Reverse },
            })
        }
        CommandKey::SetLocoFunction => {
            let byte = *args.get(2)?;
            Request::SetLocoFunction {
                address: loco(args)?,
                function: byte & 0x3F,
                action: FunctionAction::from_wire_code(byte >> 6)?,
            }
        }
        CommandKey::GetTurnoutInfo => Request::GetTurnoutInfo { address: accessory(args)? },
        CommandKey::SetTurnout => {
            let byte = *args.get(2)?;
            Request::SetTurnout {
                address: accessory(args)?,
                position: TurnoutPosition::from_output_bit(byte),
                activate: byte & 0x08 != 0,
                queue: byte & 0x20 != 0,
            }
        }
        CommandKey::CvRead => Request::CvRead { cv: cv(args)? },
        CommandKey::CvWrite => Request::CvWrite { cv: cv(args)?, value: *args.get(2)? },
        _ => return None,
    };
    Some(request)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_loco_address_has_zero_msb() {
        for address in [1, 3, 127] {
            assert_eq!(encode_loco_address(address).unwrap()[0], 0x00);
        }
    }

    #[test]
    fn test_long_loco_address_sets_marker_bits() {
        assert_eq!(encode_loco_address(128).unwrap(), [0xC0, 0x80]);
        assert_eq!(encode_loco_address(9999).unwrap(), [0xE7, 0x0F]);
        assert_eq!(decode_loco_address(0xE7, 0x0F), 9999);
    }

    #[test]
    fn test_out_of_range_addresses_are_rejected() {
        assert_eq!(encode_loco_address(0), Err(ProtocolError::InvalidLocoAddress(0)));
        assert_eq!(encode_loco_address(10_000), Err(ProtocolError::InvalidLocoAddress(10_000)));
        assert_eq!(encode_accessory_address(16_384), Err(ProtocolError::InvalidAccessoryAddress(16_384)));
        assert_eq!(encode_cv_address(0), Err(ProtocolError::InvalidCv(0)));
        assert_eq!(encode_cv_address(1025), Err(ProtocolError::InvalidCv(1025)));
    }

    #[test]
    fn test_cv_address_is_zero_based() {
        assert_eq!(encode_cv_address(1).unwrap(), [0x00, 0x00]);
        assert_eq!(encode_cv_address(1024).unwrap(), [0x03, 0xFF]);
    }

    #[test]
    fn test_drive_frame_bytes() {
        // Arrange
        let drive = DriveCommand {
            address: 3,
            speed_steps: SpeedSteps::Steps128,
            speed: LocoSpeed::Step(9),
            direction: Direction::Forward,
        };

        // Act
        let bytes = encode_request(&Request::SetLocoDrive(drive)).unwrap();

        // Assert: E4 13 00 03 8A, checksum E4^13^00^03^8A = 0x7E
        assert_eq!(bytes, vec![0x0A, 0x00, 0x40, 0x00, 0xE4, 0x13, 0x00, 0x03, 0x8A, 0x7E]);
    }

    #[test]
    fn test_drive_rejects_step_above_mode_maximum() {
        let drive = DriveCommand {
            address: 3,
            speed_steps: SpeedSteps::Steps14,
            speed: LocoSpeed::Step(15),
            direction: Direction::Forward,
        };
        assert_eq!(
            encode_request(&Request::SetLocoDrive(drive)),
            Err(ProtocolError::InvalidSpeed { step: 15, max: 14 })
        );
    }

    #[test]
    fn test_function_index_above_31_is_rejected() {
        let request = Request::SetLocoFunction { address: 3, function: 32, action: FunctionAction::On };
        assert_eq!(encode_request(&request), Err(ProtocolError::InvalidFunction(32)));
    }

    #[test]
    fn test_set_turnout_bits() {
        let request = Request::SetTurnout {
            address: 5,
            position: TurnoutPosition::Diverging,
            activate: true,
            queue: false,
        };
        let bytes = encode_request(&request).unwrap();
        assert_eq!(&bytes[4..8], &[0x53, 0x00, 0x05, 0x89]);
    }

    #[test]
    fn test_broadcast_flags_little_endian() {
        let bytes = encode_request(&Request::SetBroadcastFlags(0x0000_0001)).unwrap();
        assert_eq!(bytes, vec![0x08, 0x00, 0x50, 0x00, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_logoff_is_bare_envelope() {
        assert_eq!(encode_request(&Request::Logoff).unwrap(), vec![0x04, 0x00, 0x30, 0x00]);
    }

    #[test]
    fn test_cv_write_decodes_back() {
        let request = Request::CvWrite { cv: 29, value: 6 };
        let bytes = encode_request(&request).unwrap();
        assert_eq!(&bytes[4..9], &[0x24, 0x12, 0x00, 0x1C, 0x06]);
        assert_eq!(decode_request(&bytes), Some(request));
    }

    #[test]
    fn test_inbound_frames_are_not_requests() {
        let bytes = encode_xbus(0x61, &[0x01]);
        assert_eq!(decode_request(&bytes), None);
    }

    #[test]
    fn test_key_without_table_row_is_an_error() {
        assert_eq!(xbus(CommandKey::Unknown, &[]), Err(ProtocolError::NotOutbound(CommandKey::Unknown)));
    }
}
