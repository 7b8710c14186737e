//! Domain layer for z21-web-bridge.
//!
//! Plain types with no dependencies on I/O, networking, or async runtimes:
//! the JSON messages exchanged with browsers, the bridge configuration, and
//! the per-connection identity.

pub mod client_id;
pub mod config;
pub mod messages;

pub use client_id::{ClientId, ClientIdAllocator};
pub use config::BridgeConfig;
pub use messages::{ClientMsg, ServerMsg};
