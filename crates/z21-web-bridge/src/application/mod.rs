//! Application layer for z21-web-bridge.
//!
//! The application layer holds every state machine of the bridge.  It knows
//! *what* to send and when, but delegates *how* to the infrastructure layer
//! through the traits in [`ports`].
//!
//! # Responsibilities
//!
//! - Serialising CV reads and writes on the programming track
//! - Discovering firmware, hardware type, and lock code of the command station
//! - Opening, keeping alive, and logging off the wire session
//! - Coalescing drive commands and timing turnout pulses
//! - Translating decoded events into browser JSON
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning and real timers (also infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod bridge_service;
pub mod cv_programmer;
pub mod gateway;
pub mod loco_cache;
#[doc(hidden)]
pub mod mock;
pub mod ports;
pub mod session;
pub mod station_info;
pub mod throttle;
pub mod turnout_pulse;

pub use bridge_service::{base64_encode, translate_event, BridgeError};
pub use cv_programmer::{CvError, CvOutcome, CvReply, CvValue};
pub use gateway::Gateway;
pub use ports::{ClientSink, Ports, Scheduler, TimerId, TimerKey, WireSink};
