//! Translation between decoded wire events and browser JSON.
//!
//! These functions have no I/O side effects and no dependency on the gateway's
//! state machines, so they are tested in isolation.
//!
//! ```text
//! Z21 → Browser:  Event → ServerMsg            translate_event()
//! Browser → Z21:  ClientMsg fields → DriveCommand / pulse Duration
//!                                              drive_command(), pulse_duration()
//! ```

use std::time::Duration;

use thiserror::Error;
use z21_core::protocol::system_state::{
    CS_EMERGENCY_STOP, CS_PROGRAMMING_MODE, CS_SHORT_CIRCUIT, CS_TRACK_VOLTAGE_OFF,
};
use z21_core::{Direction, DriveCommand, Event, LocoSpeed, ProtocolError, SpeedSteps};

use super::cv_programmer::CvOutcome;
use super::loco_cache::LocoState;
use crate::domain::config::TURNOUT_PULSE_RANGE_MS;
use crate::domain::messages::{DiagnosticKind, LocoStateJson, ServerMsg};

// ── Error type ────────────────────────────────────────────────────────────────

/// A browser request the bridge refuses to act on.
///
/// These are reported back to the requesting client as
/// [`ServerMsg::Error`]; the session carries on.
#[derive(Debug, Error, PartialEq)]
pub enum BridgeError {
    /// An address, CV number, function index, or speed step is out of range.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("turnout pulse of {0} ms is outside 1..=10000 ms")]
    InvalidPulse(u64),

    /// Neither or both of `speed` and `step` were given, or `speed` is not a
    /// finite number.
    #[error("drive request needs exactly one of `speed` (0.0..=1.0) or `step`")]
    InvalidSpeed,
}

// ── Z21 → Browser ─────────────────────────────────────────────────────────────

/// Translates an event that needs no gateway state.
///
/// Returns `None` for events the gateway handles itself: loco info goes through
/// the loco cache and CV answers through the CV programmer.
pub fn translate_event(event: &Event) -> Option<ServerMsg> {
    let msg = match event {
        Event::TrackPower(power) => ServerMsg::TrackPower(*power),
        Event::TurnoutInfo { address, state } => ServerMsg::TurnoutState { address: *address, state: *state },
        Event::SystemState(state) => ServerMsg::SystemState(*state),
        Event::StatusChanged { status } => status_changed(*status),
        Event::FirmwareVersion(v) => ServerMsg::FirmwareVersion { major: v.major, minor: v.minor },
        Event::XBusVersion(v) => ServerMsg::XBusVersion {
            version: v.version.clone(),
            command_station_id: v.command_station_id,
        },
        Event::HardwareInfo { hardware_type, firmware } => ServerMsg::HardwareInfo {
            hardware_type: hardware_name(hardware_type),
            hardware_code: hardware_type.code(),
            firmware: firmware.to_string(),
        },
        Event::Code(code) => ServerMsg::Code { code: *code },
        Event::Stopped => ServerMsg::Stopped,
        Event::CommandRejected => ServerMsg::Diagnostic {
            kind: DiagnosticKind::CommandRejected,
            header: z21_core::protocol::frame::LAN_X,
            data_base64: String::new(),
        },
        Event::BadChecksum { x_header, data, .. } => {
            let mut raw = Vec::with_capacity(data.len() + 1);
            raw.push(*x_header);
            raw.extend_from_slice(data);
            ServerMsg::Diagnostic {
                kind: DiagnosticKind::BadChecksum,
                header: z21_core::protocol::frame::LAN_X,
                data_base64: base64_encode(&raw),
            }
        }
        Event::Unknown { header, data } => ServerMsg::Diagnostic {
            kind: DiagnosticKind::Unknown,
            header: *header,
            data_base64: base64_encode(data),
        },
        Event::LocoInfo(_) | Event::CvResult { .. } | Event::CvNack { .. } => return None,
    };
    Some(msg)
}

/// Splits the central-state mask into named flags.
pub fn status_changed(status: u8) -> ServerMsg {
    ServerMsg::StatusChanged {
        status,
        emergency_stop: status & CS_EMERGENCY_STOP != 0,
        track_voltage_off: status & CS_TRACK_VOLTAGE_OFF != 0,
        short_circuit: status & CS_SHORT_CIRCUIT != 0,
        programming_mode: status & CS_PROGRAMMING_MODE != 0,
    }
}

fn hardware_name(hardware_type: &z21_core::HardwareType) -> String {
    // Reuse the serde name so JSON and this string never disagree.
    match serde_json::to_value(hardware_type) {
        Ok(serde_json::Value::String(name)) => name,
        _ => format!("unknown_{:#06x}", hardware_type.code()),
    }
}

pub fn loco_state_json(state: &LocoState) -> LocoStateJson {
    let mut functions = vec![None; z21_core::domain::loco::FUNCTION_COUNT];
    for (index, on) in state.functions.known() {
        functions[usize::from(index)] = Some(on);
    }
    // Trailing unknowns carry no information.
    while functions.last() == Some(&None) {
        functions.pop();
    }
    LocoStateJson {
        address: state.address,
        speed: state.speed.fraction(state.speed_steps),
        step: state.speed.step(),
        speed_steps: state.speed_steps,
        direction: state.direction,
        estop: state.speed.is_emergency_stop(),
        functions,
    }
}

pub fn cv_outcome_msg(outcome: &CvOutcome) -> ServerMsg {
    match outcome {
        Ok(v) => ServerMsg::CvResult { cv: v.cv, value: v.value },
        Err(e) => ServerMsg::CvNack { cv: e.cv, reason: e.reason },
    }
}

// ── Browser → Z21 ─────────────────────────────────────────────────────────────

/// Builds a drive command from a browser `Drive` message.
///
/// Missing `speed_steps` and `direction` come from the cached state.  A
/// fractional `speed` is scaled to the step mode; `step: 0` means stop.
///
/// # Errors
///
/// [`BridgeError::InvalidSpeed`] unless exactly one of `speed` and `step` is
/// given and `speed` is finite.  Step range is checked when the command is
/// encoded.
pub fn drive_command(
    cached: &LocoState,
    speed: Option<f64>,
    step: Option<u8>,
    speed_steps: Option<SpeedSteps>,
    direction: Option<Direction>,
) -> Result<DriveCommand, BridgeError> {
    let speed_steps = speed_steps.unwrap_or(cached.speed_steps);
    let speed = match (speed, step) {
        (Some(fraction), None) if fraction.is_finite() => LocoSpeed::from_fraction(fraction, speed_steps),
        (None, Some(0)) => LocoSpeed::Stop,
        (None, Some(n)) => LocoSpeed::Step(n),
        _ => return Err(BridgeError::InvalidSpeed),
    };
    Ok(DriveCommand {
        address: cached.address,
        speed_steps,
        speed,
        direction: direction.unwrap_or(cached.direction),
    })
}

/// Resolves a requested pulse length against the configured default.
pub fn pulse_duration(pulse_ms: Option<u64>, default: Duration) -> Result<Duration, BridgeError> {
    match pulse_ms {
        None => Ok(default),
        Some(ms) if TURNOUT_PULSE_RANGE_MS.contains(&ms) => Ok(Duration::from_millis(ms)),
        Some(ms) => Err(BridgeError::InvalidPulse(ms)),
    }
}

// ── Helper: base64 encoding ───────────────────────────────────────────────────

/// Encodes binary data as standard base64 (RFC 4648) with `=` padding.
///
/// Used for raw-frame echoes and diagnostics, which browsers decode with
/// `atob()`.
pub fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b = [chunk[0], chunk.get(1).copied().unwrap_or(0), chunk.get(2).copied().unwrap_or(0)];
        let triple = u32::from(b[0]) << 16 | u32::from(b[1]) << 8 | u32::from(b[2]);
        for (i, shift) in [18u32, 12, 6, 0].into_iter().enumerate() {
            if i <= chunk.len() {
                out.push(ALPHABET[(triple >> shift & 0x3F) as usize] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
