//! JSON message types for the browser-facing WebSocket protocol.
//!
//! The command station speaks a compact binary protocol over UDP.  Browsers
//! speak JSON.  Rather than push the binary codec into JavaScript, the bridge
//! exposes a small JSON vocabulary of commands and notifications.
//!
//! # Message flow
//!
//! ```text
//! Browser → Bridge:  JSON text frame  →  ClientMsg  →  Request(s) on the wire
//! Bridge  → Browser: Event / gateway state  →  ServerMsg  →  JSON text frame
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field naming the variant;
//! the other fields sit next to it:
//!
//! ```json
//! {"type":"Drive","address":3,"speed":0.5,"direction":"forward"}
//! ```

use serde::{Deserialize, Serialize};
use z21_core::{
    CommandStationInfo, Direction, FunctionAction, LockCode, SpeedSteps, SystemState,
    TrackPowerEvent, TurnoutPosition, TurnoutState,
};

use crate::domain::client_id::ClientId;

// ── Browser → Bridge ──────────────────────────────────────────────────────────

/// All messages a browser can send.
///
/// ```json
/// {"type":"Hello"}
/// {"type":"Function","address":3,"function":0,"action":"toggle"}
/// {"type":"Turnout","address":12,"state":"diverging","pulse_ms":250}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Asks for a [`ServerMsg::SessionReady`] snapshot.
    Hello,

    SetTrackPower { on: bool },

    /// Drive a locomotive.
    ///
    /// Exactly one of `speed` (fraction of full throttle, `0.0..=1.0`) and
    /// `step` should be given.  `speed_steps` and `direction` fall back to the
    /// last known values for the address.
    Drive {
        address: u16,
        #[serde(default)]
        speed: Option<f64>,
        #[serde(default)]
        step: Option<u8>,
        #[serde(default)]
        speed_steps: Option<SpeedSteps>,
        #[serde(default)]
        direction: Option<Direction>,
    },

    Function { address: u16, function: u8, action: FunctionAction },

    /// Emergency stop of one locomotive.
    EStop { address: u16 },

    /// Emergency stop of every locomotive on the layout.
    EStopAll,

    /// Switch a turnout.  `pulse_ms` overrides the configured pulse length.
    Turnout {
        address: u16,
        state: TurnoutPosition,
        #[serde(default)]
        pulse_ms: Option<u64>,
    },

    CvRead { cv: u16 },

    CvWrite { cv: u16, value: u8 },

    GetLocoInfo { address: u16 },

    GetTurnoutInfo { address: u16 },

    GetStatus,
}

// ── Bridge → Browser ──────────────────────────────────────────────────────────

/// Why a CV operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvFailure {
    Nack,
    ShortCircuit,
    Timeout,
    /// The gateway shut down before an answer arrived.
    Cancelled,
}

/// What kind of wire anomaly a [`ServerMsg::Diagnostic`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    BadChecksum,
    Unknown,
    /// The command station answered "unknown command".
    CommandRejected,
}

/// Last known state of one locomotive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocoStateJson {
    pub address: u16,
    /// Fraction of full throttle, `0.0..=1.0`.
    pub speed: f64,
    pub step: u8,
    pub speed_steps: SpeedSteps,
    pub direction: Direction,
    pub estop: bool,
    /// Indexed by function number; `null` where the state is unknown.
    pub functions: Vec<Option<bool>>,
}

/// All messages the bridge sends to a browser.
///
/// ```json
/// {"type":"TrackPower","on":true}
/// {"type":"LocoState","address":3,"speed":0.5,"step":63,"speed_steps":128,
///  "direction":"forward","estop":false,"functions":[true,null,false]}
/// {"type":"CvNack","cv":29,"reason":"timeout"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// Reply to `Hello`: everything the bridge knows right now.
    SessionReady {
        client_id: ClientId,
        station: CommandStationInfo,
        track_power: Option<TrackPowerEvent>,
        locos: Vec<LocoStateJson>,
    },

    TrackPower(TrackPowerEvent),

    LocoState(LocoStateJson),

    TurnoutState { address: u16, state: TurnoutState },

    CvResult { cv: u16, value: u8 },

    CvNack { cv: u16, reason: CvFailure },

    FirmwareVersion { major: u8, minor: u8 },

    XBusVersion { version: String, command_station_id: u8 },

    HardwareInfo { hardware_type: String, hardware_code: u32, firmware: String },

    Code { code: LockCode },

    SystemState(SystemState),

    /// Answer to `GetStatus`, with the mask already split into flags.
    StatusChanged {
        status: u8,
        emergency_stop: bool,
        track_voltage_off: bool,
        short_circuit: bool,
        programming_mode: bool,
    },

    /// One inbound datagram, verbatim.
    RawFrame { data_base64: String },

    Diagnostic { kind: DiagnosticKind, header: u16, data_base64: String },

    /// Every locomotive was stopped.
    Stopped,

    /// A request from this client was rejected.
    Error { message: String },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
