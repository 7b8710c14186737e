//! Domain types for the Z21 bridge.
//!
//! This module contains plain data types with no infrastructure dependencies.
//! The protocol decoders produce them and the encoders consume them, so they
//! are the vocabulary shared by every layer above the wire.
//!
//! - [`loco`] – locomotive address, speed, direction, and function states.
//! - [`accessory`] – turnout positions.
//! - [`station`] – what the bridge has learned about the command station
//!   (firmware, hardware type, lock code).

pub mod accessory;
pub mod loco;
pub mod station;
