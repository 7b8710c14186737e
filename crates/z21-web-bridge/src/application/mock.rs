//! In-memory port implementations for tests.
//!
//! Test-only: nothing in the binary uses this module.  It is public so the
//! integration tests under `tests/` can drive the gateway without sockets.
//!
//! [`ManualScheduler`] runs on virtual time: nothing fires until the test
//! calls [`ManualScheduler::advance`], which returns the timers that came due
//! in firing order.  The test then hands each one back to the component under
//! test, exactly as the gateway task does with real timers.

use std::collections::BTreeMap;
use std::time::Duration;

use z21_core::{decode_request, Request};

use super::ports::{ClientSink, Scheduler, TimerId, TimerKey, WireSink};
use crate::domain::{ClientId, ServerMsg};

/// Records every frame sent.
#[derive(Debug, Default)]
pub struct RecordingWire {
    pub frames: Vec<Vec<u8>>,
}

impl RecordingWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded frames decoded back into requests.
    ///
    /// Frames that do not decode are skipped.
    pub fn requests(&self) -> Vec<Request> {
        self.frames.iter().filter_map(|f| decode_request(f)).collect()
    }

    /// Number of recorded requests matching `pred`.
    pub fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests().iter().filter(|r| pred(r)).count()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl WireSink for RecordingWire {
    fn send(&mut self, frame: &[u8]) {
        self.frames.push(frame.to_vec());
    }
}

/// Virtual-time scheduler.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now_ms: u64,
    next_id: u64,
    /// (due time, id) → key.  Ordering by due time then id gives FIFO for
    /// timers due at the same instant.
    armed: BTreeMap<(u64, TimerId), TimerKey>,
    pub cancelled: Vec<TimerId>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward and returns the timers that fired, in order.
    pub fn advance(&mut self, by: Duration) -> Vec<(TimerId, TimerKey)> {
        self.now_ms += by.as_millis() as u64;
        let due: Vec<(u64, TimerId)> =
            self.armed.range(..(self.now_ms + 1, TimerId(0))).map(|(k, _)| *k).collect();
        due.into_iter()
            .filter_map(|k| self.armed.remove(&k).map(|key| (k.1, key)))
            .collect()
    }

    /// Keys of all timers still armed.
    pub fn armed_keys(&self) -> Vec<TimerKey> {
        self.armed.values().copied().collect()
    }

    pub fn is_armed(&self, key: TimerKey) -> bool {
        self.armed.values().any(|k| *k == key)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, key: TimerKey, after: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.armed.insert((self.now_ms + after.as_millis() as u64, id), key);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.armed.retain(|(_, armed_id), _| *armed_id != id);
        self.cancelled.push(id);
    }

    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

/// Records broadcasts and direct messages.
#[derive(Debug, Default)]
pub struct RecordingClients {
    pub broadcasts: Vec<ServerMsg>,
    pub direct: Vec<(ClientId, ServerMsg)>,
}

impl RecordingClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent directly to `client`.
    pub fn sent_to(&self, client: ClientId) -> Vec<&ServerMsg> {
        self.direct.iter().filter(|(c, _)| *c == client).map(|(_, m)| m).collect()
    }
}

impl ClientSink for RecordingClients {
    fn broadcast(&mut self, msg: &ServerMsg) {
        self.broadcasts.push(msg.clone());
    }

    fn send_to(&mut self, client: ClientId, msg: &ServerMsg) {
        self.direct.push((client, msg.clone()));
    }
}
