//! # z21-core
//!
//! Shared library for the Z21 web bridge containing the command-station wire
//! codec, the X-BUS command table, and the domain types the bridge reasons
//! about (locomotives, turnouts, command-station capabilities).
//!
//! It has zero dependencies on sockets, timers, or async runtimes.  Everything
//! in here is a pure function over bytes or a plain data type, which keeps the
//! bit-level behaviour testable without a command station on the desk.
//!
//! # Architecture overview
//!
//! A Z21 command station speaks a binary protocol over UDP.  Each datagram
//! carries one or more *frames*:
//!
//! ```text
//! [length:u16 LE][header:u16 LE][payload: length-4 bytes]
//! ```
//!
//! Most interesting traffic is tunnelled X-BUS: header `0x40`, and the payload
//! is `xHeader | data... | xor-checksum`.
//!
//! - **`protocol`** – frame splitting and classification ([`parse_datagram`]),
//!   X-BUS command resolution ([`resolve_command`]), payload decoding into
//!   [`Event`]s, and request encoding ([`encode_request`]).
//!
//! - **`domain`** – locomotive, turnout, and command-station types that the
//!   decoders produce and the encoders consume.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `z21_core::Event` instead of `z21_core::protocol::events::Event`.
pub use domain::accessory::{TurnoutPosition, TurnoutState};
pub use domain::loco::{Direction, FunctionAction, FunctionStates, LocoInfo, LocoSpeed, SpeedSteps};
pub use domain::station::{CommandStationInfo, FirmwareVersion, HardwareType, LockCode, XBusVersion};
pub use protocol::codec::{decode_request, encode_request, DriveCommand, ProtocolError, Request};
pub use protocol::commands::{resolve_command, CommandKey};
pub use protocol::events::{decode_dataset, Event, TrackPowerEvent};
pub use protocol::frame::{parse_datagram, Dataset};
pub use protocol::system_state::SystemState;
