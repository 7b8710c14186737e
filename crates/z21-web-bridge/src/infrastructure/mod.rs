//! Infrastructure layer for z21-web-bridge.
//!
//! The infrastructure layer handles all I/O and all tokio plumbing.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener for browser WebSocket connections
//! - Performing the WebSocket HTTP upgrade handshake
//! - Sending and receiving Z21 datagrams over UDP
//! - Backing the application's timers with tokio sleeps
//! - Running the gateway task that serialises every handler
//!
//! # What does NOT belong here?
//!
//! - Protocol state machines (that is the application layer)
//! - Message type definitions (that is the domain layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod gateway_task;
pub mod scheduler;
pub mod ws_server;
pub mod z21_link;

pub use gateway_task::{channel, run_gateway, GatewayHandle, GatewayInput};
pub use ws_server::{bind, run_server};
pub use z21_link::Z21Link;
