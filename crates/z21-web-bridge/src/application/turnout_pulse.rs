//! Turnout activation pulses.
//!
//! A solenoid turnout is switched by energising one of its two outputs for a
//! short time.  The activation goes out immediately; the matching deactivation
//! is scheduled after the pulse length.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;
use z21_core::{ProtocolError, Request, TurnoutPosition};

use super::ports::{send_request, Scheduler, TimerId, TimerKey, WireSink};

#[derive(Debug, Clone, Copy)]
struct PendingRelease {
    position: TurnoutPosition,
    timer: TimerId,
}

#[derive(Debug, Default)]
pub struct TurnoutPulser {
    pending: HashMap<u16, PendingRelease>,
}

impl TurnoutPulser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates `position` now and schedules its deactivation after `pulse`.
    ///
    /// A pending deactivation for the same turnout is cancelled first.  It is
    /// not sent: the new activation supersedes it.
    pub fn switch(
        &mut self,
        address: u16,
        position: TurnoutPosition,
        pulse: Duration,
        wire: &mut dyn WireSink,
        timers: &mut dyn Scheduler,
    ) -> Result<(), ProtocolError> {
        send_request(wire, &set_turnout(address, position, true))?;

        if let Some(previous) = self.pending.remove(&address) {
            timers.cancel(previous.timer);
        }
        let timer = timers.schedule(TimerKey::TurnoutPulse(address), pulse);
        self.pending.insert(address, PendingRelease { position, timer });
        Ok(())
    }

    /// Handles a fired [`TimerKey::TurnoutPulse`]: sends the deactivation.
    pub fn on_timer(&mut self, address: u16, id: TimerId, wire: &mut dyn WireSink) {
        let Some(release) = self.pending.get(&address).copied() else {
            return;
        };
        if release.timer != id {
            return;
        }
        self.pending.remove(&address);
        debug!(address, "releasing turnout output");
        release_output(address, release.position, wire);
    }

    /// Sends every pending deactivation now.
    pub fn flush_all(&mut self, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) {
        for (address, release) in self.pending.drain() {
            timers.cancel(release.timer);
            release_output(address, release.position, wire);
        }
    }

    pub fn is_pending(&self, address: u16) -> bool {
        self.pending.contains_key(&address)
    }
}

fn set_turnout(address: u16, position: TurnoutPosition, activate: bool) -> Request {
    Request::SetTurnout { address, position, activate, queue: false }
}

fn release_output(address: u16, position: TurnoutPosition, wire: &mut dyn WireSink) {
    // The address was validated when the activation was sent.
    if let Err(err) = send_request(wire, &set_turnout(address, position, false)) {
        debug!(%err, address, "turnout release not sent");
    }
}
