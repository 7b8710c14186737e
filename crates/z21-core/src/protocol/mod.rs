//! Protocol module containing the frame codec, the X-BUS command table, the
//! inbound payload decoders, and the outbound request encoders.

pub mod codec;
pub mod commands;
pub mod events;
pub mod frame;
pub mod system_state;

pub use codec::{decode_request, encode_request, DriveCommand, ProtocolError, Request};
pub use commands::{resolve_command, CommandKey};
pub use events::{decode_dataset, Event, TrackPowerEvent};
pub use frame::{encode_frame, encode_xbus, parse_datagram, xor_checksum, Dataset};
pub use system_state::SystemState;
