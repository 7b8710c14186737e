//! Per-locomotive coalescing of drive commands.
//!
//! A throttle slider can produce dozens of drive requests per second.  The
//! command station does not need them all: per address, at most one drive
//! command goes out per window, carrying whatever was requested last.
//!
//! The window is anchored to the first request.  Later requests inside the
//! window only replace the pending values; they never push the timer back, so
//! a continuously moving slider still produces a steady stream of commands.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace};
use z21_core::{encode_request, DriveCommand, ProtocolError, Request};

use super::ports::{Scheduler, TimerId, TimerKey, WireSink};

#[derive(Debug)]
struct ThrottleEntry {
    command: DriveCommand,
    frame: Vec<u8>,
    timer: TimerId,
}

#[derive(Debug)]
pub struct DriveThrottle {
    window: Duration,
    entries: HashMap<u16, ThrottleEntry>,
}

impl DriveThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, entries: HashMap::new() }
    }

    /// Records `command` as the next drive command for its address.
    ///
    /// The command is encoded now so range errors surface to the caller
    /// immediately; it is sent when the address's window closes.
    pub fn submit(&mut self, command: DriveCommand, timers: &mut dyn Scheduler) -> Result<(), ProtocolError> {
        let frame = encode_request(&Request::SetLocoDrive(command))?;
        let address = command.address;

        match self.entries.get_mut(&address) {
            Some(entry) => {
                trace!(address, "coalescing drive command");
                entry.command = command;
                entry.frame = frame;
            }
            None => {
                let timer = timers.schedule(TimerKey::Drive(address), self.window);
                self.entries.insert(address, ThrottleEntry { command, frame, timer });
            }
        }
        Ok(())
    }

    /// Handles a fired [`TimerKey::Drive`]: sends the pending command.
    pub fn on_timer(&mut self, address: u16, id: TimerId, wire: &mut dyn WireSink) {
        match self.entries.get(&address) {
            Some(entry) if entry.timer == id => {}
            _ => return,
        }
        if let Some(entry) = self.entries.remove(&address) {
            debug!(address, speed = ?entry.command.speed, direction = ?entry.command.direction, "→ Z21 drive");
            wire.send(&entry.frame);
        }
    }

    /// Drops any pending command for `address`.  Returns whether one existed.
    pub fn cancel(&mut self, address: u16, timers: &mut dyn Scheduler) -> bool {
        match self.entries.remove(&address) {
            Some(entry) => {
                timers.cancel(entry.timer);
                debug!(address, "discarded pending drive command");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self, timers: &mut dyn Scheduler) {
        for (_, entry) in self.entries.drain() {
            timers.cancel(entry.timer);
        }
    }

    /// The command waiting to be sent for `address`, if any.
    pub fn pending(&self, address: u16) -> Option<&DriveCommand> {
        self.entries.get(&address).map(|e| &e.command)
    }
}
