//! Payload decoders: [`Dataset`] → [`Event`].
//!
//! Each decoder is a pure function over the command arguments (the bytes left
//! after `xHeader` and, where the table row has one, the sub-command byte).
//! A payload that is too short for its command becomes [`Event::Unknown`]
//! rather than an error, so one odd frame never stops the stream.

use serde::{Deserialize, Serialize};

use crate::domain::accessory::TurnoutState;
use crate::domain::loco::{Direction, FunctionStates, LocoInfo, LocoSpeed, SpeedSteps};
use crate::domain::station::{FirmwareVersion, HardwareType, LockCode, XBusVersion};
use crate::protocol::codec::{decode_accessory_address, decode_cv_address, decode_loco_address};
use crate::protocol::commands::{command_args, resolve_command, CommandKey};
use crate::protocol::frame::Dataset;
use crate::protocol::system_state::SystemState;

/// Track-power notification.
///
/// `programming_mode` and `short_circuit` are only `Some` for the broadcasts
/// that actually report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPowerEvent {
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub programming_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_circuit: Option<bool>,
}

/// A decoded fact about the command station or the layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TrackPower(TrackPowerEvent),
    LocoInfo(LocoInfo),
    TurnoutInfo { address: u16, state: TurnoutState },
    SystemState(SystemState),
    /// Raw central-state mask from the status answer.
    StatusChanged { status: u8 },
    FirmwareVersion(FirmwareVersion),
    XBusVersion(XBusVersion),
    HardwareInfo { hardware_type: HardwareType, firmware: FirmwareVersion },
    Code(LockCode),
    /// All locomotives were stopped (`LAN_X_BC_STOPPED`).
    Stopped,
    CvResult { cv: u16, value: u8 },
    CvNack { short_circuit: bool },
    /// The station did not understand something we sent.
    CommandRejected,
    /// The data was delivered anyway, in the event before this one.
    BadChecksum { x_header: u8, data: Vec<u8>, expected: u8, actual: u8 },
    /// Anything else.  For X-BUS frames `header` is `0x40` and `data` starts
    /// with `xHeader`.
    Unknown { header: u16, data: Vec<u8> },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one dataset.
pub fn decode_dataset(dataset: &Dataset) -> Event {
    match dataset {
        Dataset::XBus { x_header, data } => decode_xbus(*x_header, data),
        Dataset::SystemState(state) => Event::SystemState(*state),
        Dataset::HardwareInfo { hardware_type, firmware_bcd } => Event::HardwareInfo {
            hardware_type: HardwareType::from_code(*hardware_type),
            firmware: FirmwareVersion::from_bcd_word(*firmware_bcd),
        },
        Dataset::Code(byte) => Event::Code(LockCode::from_byte(*byte)),
        Dataset::BadChecksum { x_header, data, expected, actual } => Event::BadChecksum {
            x_header: *x_header,
            data: data.clone(),
            expected: *expected,
            actual: *actual,
        },
        Dataset::Unknown { header, payload } => Event::Unknown { header: *header, data: payload.clone() },
    }
}

/// Decodes an X-BUS message given its `xHeader` and the bytes after it.
pub fn decode_xbus(x_header: u8, data: &[u8]) -> Event {
    let key = resolve_command(x_header, data);
    let args = command_args(x_header, data);

    let decoded = match key {
        CommandKey::BcTrackPowerOff => Some(track_power(false, None, None)),
        CommandKey::BcTrackPowerOn => Some(track_power(true, None, None)),
        CommandKey::BcProgrammingMode => Some(track_power(true, Some(true), None)),
        CommandKey::BcTrackShortCircuit => Some(track_power(false, None, Some(true))),
        CommandKey::BcStopped => Some(Event::Stopped),
        CommandKey::CvNack => Some(Event::CvNack { short_circuit: false }),
        CommandKey::CvNackShortCircuit => Some(Event::CvNack { short_circuit: true }),
        CommandKey::UnknownCommand => Some(Event::CommandRejected),
        CommandKey::LocoInfo => decode_loco_info(args).map(Event::LocoInfo),
        CommandKey::TurnoutInfo => decode_turnout_info(args),
        CommandKey::StatusChanged => decode_status_changed(data),
        CommandKey::FirmwareVersion => decode_firmware_version(args).map(Event::FirmwareVersion),
        CommandKey::XBusVersion => decode_xbus_version(args).map(Event::XBusVersion),
        CommandKey::CvResult => decode_cv_result(args),
        _ => None,
    };

    decoded.unwrap_or_else(|| {
        let mut raw = Vec::with_capacity(data.len() + 1);
        raw.push(x_header);
        raw.extend_from_slice(data);
        Event::Unknown { header: crate::protocol::frame::LAN_X, data: raw }
    })
}

// ── Decoders ──────────────────────────────────────────────────────────────────

fn track_power(on: bool, programming_mode: Option<bool>, short_circuit: Option<bool>) -> Event {
    Event::TrackPower(TrackPowerEvent { on, programming_mode, short_circuit })
}

// DB2
const DB2_STEP_CODE: u8 = 0x07;
const DB2_OCCUPIED: u8 = 0x08;
const DB2_MM: u8 = 0x10;
// DB3
const DB3_FORWARD: u8 = 0x80;
// DB4
const DB4_DOUBLE_TRACTION: u8 = 0x40;
const DB4_SMART_SEARCH: u8 = 0x20;
const DB4_F0: u8 = 0x10;

/// `MSB LSB DB2 DB3 [DB4 .. DB8]`.
///
/// DB4–DB8 are each optional; functions they would carry stay unknown.
pub fn decode_loco_info(args: &[u8]) -> Option<LocoInfo> {
    if args.len() < 4 {
        return None;
    }
    let db2 = args[2];
    let db3 = args[3];

    let mut info = LocoInfo {
        address: decode_loco_address(args[0], args[1]),
        speed_steps: SpeedSteps::from_info_code(db2 & DB2_STEP_CODE),
        occupied: db2 & DB2_OCCUPIED != 0,
        mm: db2 & DB2_MM != 0,
        direction: if db3 & DB3_FORWARD != 0 { Direction::Forward } else { Direction::Reverse },
        speed: LocoSpeed::from_raw(db3),
        double_traction: None,
        smart_search: None,
        functions: FunctionStates::new(),
    };

    if let Some(&db4) = args.get(4) {
        info.double_traction = Some(db4 & DB4_DOUBLE_TRACTION != 0);
        info.smart_search = Some(db4 & DB4_SMART_SEARCH != 0);
        info.functions.set(0, db4 & DB4_F0 != 0);
        set_function_bits(&mut info.functions, db4, 1, 4);
    }
    // (byte index, first function, count)
    for (index, first, count) in [(5, 5, 8), (6, 13, 8), (7, 21, 8), (8, 29, 3)] {
        if let Some(&byte) = args.get(index) {
            set_function_bits(&mut info.functions, byte, first, count);
        }
    }

    Some(info)
}

fn set_function_bits(functions: &mut FunctionStates, byte: u8, first: u8, count: u8) {
    for bit in 0..count {
        functions.set(first + bit, byte & (1 << bit) != 0);
    }
}

/// `MSB LSB 000000ZZ`.
fn decode_turnout_info(args: &[u8]) -> Option<Event> {
    if args.len() < 3 {
        return None;
    }
    Some(Event::TurnoutInfo {
        address: decode_accessory_address(args[0], args[1]),
        state: TurnoutState::from_code(args[2]),
    })
}

/// `22 status`: needs the sub-command plus the mask.
fn decode_status_changed(data: &[u8]) -> Option<Event> {
    if data.len() < 2 {
        return None;
    }
    Some(Event::StatusChanged { status: data[1] })
}

/// `major-BCD minor-BCD`.
fn decode_firmware_version(args: &[u8]) -> Option<FirmwareVersion> {
    match args {
        [major, minor, ..] => Some(FirmwareVersion::from_bcd(*major, *minor)),
        _ => None,
    }
}

/// `version station-id`, version as two BCD nibbles.
fn decode_xbus_version(args: &[u8]) -> Option<XBusVersion> {
    let (&version, &command_station_id) = (args.first()?, args.get(1)?);
    let major = version >> 4;
    let minor = version & 0x0F;
    let version = if major == 0 && minor == 0 {
        "Unknown".to_string()
    } else {
        format!("V{major}.{minor}")
    };
    Some(XBusVersion { version, command_station_id })
}

/// `MSB LSB value`, zero-based CV address on the wire.
fn decode_cv_result(args: &[u8]) -> Option<Event> {
    if args.len() < 3 {
        return None;
    }
    Some(Event::CvResult { cv: decode_cv_address(args[0], args[1]), value: args[2] })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
