//! z21-web-bridge library crate.
//!
//! This crate lets web browsers drive a model railroad through a Z21 command
//! station.  Browsers speak JSON over WebSocket; the command station speaks a
//! binary protocol over UDP.  The bridge sits in between, owns the single wire
//! session to the command station, and shares it between every connected
//! browser.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON over WebSocket)
//!         ↕
//! [z21-web-bridge]
//!   ├── domain/           Pure types: JSON message enums, BridgeConfig, ClientId
//!   ├── application/      The gateway state machines, behind narrow ports
//!   └── infrastructure/
//!         ├── ws_server/     WebSocket accept loop (tokio-tungstenite)
//!         ├── z21_link/      UDP socket to the command station
//!         ├── scheduler/     tokio-backed timers
//!         └── gateway_task/  the one task that runs every handler
//!         ↕
//! Z21 command station (binary over UDP)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `z21-core`, and tokio's `oneshot`
//!   channel (for deferred CV results) only.  It talks to the outside world
//!   through the [`application::ports`] traits, so every state machine can be
//!   tested with in-memory doubles and virtual time.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.
//!
//! # Concurrency
//!
//! Every state transition runs inside one tokio task, fed by a single channel
//! of inputs (datagram, client connected/disconnected/message, timer fired).
//! No two handlers ever run at once, so the application layer needs no locks.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: the gateway and its state machines.
pub mod application;

/// Infrastructure layer: sockets, timers, and the gateway task.
pub mod infrastructure;
