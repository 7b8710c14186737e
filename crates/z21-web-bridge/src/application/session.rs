//! Ties the number of connected browsers to the wire session.
//!
//! The command station only sends broadcasts to clients that asked for them,
//! and forgets clients that stay silent for a minute.  The bridge therefore
//! opens a wire session when the first browser connects, keeps it alive with
//! a periodic system-state request, and logs off when the last one leaves.

use std::time::Duration;

use tracing::{debug, info, warn};
use z21_core::Request;

use super::ports::{send_request, Scheduler, TimerId, TimerKey, WireSink};

#[derive(Debug)]
pub struct Session {
    broadcast_flags: u32,
    heartbeat_interval: Duration,
    active: bool,
    client_count: usize,
    heartbeat: Option<TimerId>,
}

impl Session {
    pub fn new(broadcast_flags: u32, heartbeat_interval: Duration) -> Self {
        Self { broadcast_flags, heartbeat_interval, active: false, client_count: 0, heartbeat: None }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn client_count(&self) -> usize {
        self.client_count
    }

    /// Counts a new connection.  Returns `true` on the 0 → 1 transition.
    pub fn client_connected(&mut self) -> bool {
        self.client_count += 1;
        self.client_count == 1
    }

    /// Counts a closed connection.  Returns `true` when the count reaches 0.
    ///
    /// A disconnect with no connections counted is logged and ignored.
    pub fn client_disconnected(&mut self) -> bool {
        match self.client_count {
            0 => {
                warn!("disconnect with no clients counted");
                false
            }
            n => {
                self.client_count = n - 1;
                self.client_count == 0
            }
        }
    }

    /// Opens the wire session.  No-op when already active.
    pub fn activate(&mut self, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        info!(flags = self.broadcast_flags, "activating wire session");
        self.request(wire, &Request::SetBroadcastFlags(self.broadcast_flags));
        self.request(wire, &Request::SystemStateGetData);
        self.heartbeat = Some(timers.schedule(TimerKey::Heartbeat, self.heartbeat_interval));
        true
    }

    /// Closes the wire session.  No-op when already inactive.
    pub fn deactivate(&mut self, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        if let Some(id) = self.heartbeat.take() {
            timers.cancel(id);
        }
        info!("logging off wire session");
        self.request(wire, &Request::Logoff);
        true
    }

    /// Handles a fired [`TimerKey::Heartbeat`].
    pub fn on_heartbeat(&mut self, id: TimerId, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) {
        if !self.active || self.heartbeat != Some(id) {
            debug!(?id, "ignoring stale heartbeat");
            return;
        }
        debug!("heartbeat");
        self.request(wire, &Request::SystemStateGetData);
        self.heartbeat = Some(timers.schedule(TimerKey::Heartbeat, self.heartbeat_interval));
    }

    fn request(&self, wire: &mut dyn WireSink, request: &Request) {
        // Session requests have no range-checked fields.
        if let Err(err) = send_request(wire, request) {
            warn!(%err, "session request not sent");
        }
    }
}
