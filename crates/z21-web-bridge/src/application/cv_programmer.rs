//! Programming-track CV reads and writes.
//!
//! The programming track is one physical resource: the command station can
//! only run one CV operation at a time, and its answers do not say which
//! request they belong to.  [`CvProgrammer`] therefore serialises every
//! operation, whatever its CV number, behind a FIFO queue:
//!
//! ```text
//!            read()/write()
//!                 │ enqueue
//!                 ▼
//!   ┌──────┐  drain  ┌──────────┐  result / NACK / timeout  ┌──────┐
//!   │ Idle │ ──────► │ InFlight │ ────────────────────────► │ Idle │ ─► drain next
//!   └──────┘         └──────────┘                           └──────┘
//! ```
//!
//! Each call returns a [`CvReply`] future.  It completes only when a later
//! datagram or timer callback settles the operation; the caller never blocks
//! the gateway while waiting.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use z21_core::{encode_request, Event, ProtocolError, Request};

use super::ports::{Scheduler, TimerId, TimerKey, WireSink};
use crate::domain::messages::CvFailure;

/// A successful CV read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvValue {
    pub cv: u16,
    pub value: u8,
}

/// A failed CV read or write.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("CV {cv} failed: {reason:?}")]
pub struct CvError {
    pub cv: u16,
    pub reason: CvFailure,
}

pub type CvOutcome = Result<CvValue, CvError>;

/// Deferred result of [`CvProgrammer::read`] / [`CvProgrammer::write`].
#[derive(Debug)]
pub struct CvReply {
    cv: u16,
    rx: oneshot::Receiver<CvOutcome>,
}

impl CvReply {
    pub fn cv(&self) -> u16 {
        self.cv
    }
}

impl Future for CvReply {
    type Output = CvOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let cv = self.cv;
        Pin::new(&mut self.rx)
            .poll(cx)
            // Sender dropped without an answer: the programmer went away.
            .map(|r| r.unwrap_or(Err(CvError { cv, reason: CvFailure::Cancelled })))
    }
}

struct CvTask {
    cv: u16,
    frame: Vec<u8>,
    reply: oneshot::Sender<CvOutcome>,
}

struct PendingCv {
    cv: u16,
    reply: oneshot::Sender<CvOutcome>,
    timer: TimerId,
}

/// Serialises CV operations against the programming track.
pub struct CvProgrammer {
    timeout: Duration,
    queue: VecDeque<CvTask>,
    pending: Option<PendingCv>,
}

impl CvProgrammer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, queue: VecDeque::new(), pending: None }
    }

    /// Queues a direct-mode CV read.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidCv`] when `cv` is outside 1–1024; nothing is
    /// queued in that case.
    pub fn read(
        &mut self,
        cv: u16,
        wire: &mut dyn WireSink,
        timers: &mut dyn Scheduler,
    ) -> Result<CvReply, ProtocolError> {
        let frame = encode_request(&Request::CvRead { cv })?;
        Ok(self.enqueue(cv, frame, wire, timers))
    }

    /// Queues a direct-mode CV write.
    pub fn write(
        &mut self,
        cv: u16,
        value: u8,
        wire: &mut dyn WireSink,
        timers: &mut dyn Scheduler,
    ) -> Result<CvReply, ProtocolError> {
        let frame = encode_request(&Request::CvWrite { cv, value })?;
        Ok(self.enqueue(cv, frame, wire, timers))
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Feeds a decoded event.  Only CV results and NACKs matter.
    pub fn on_event(&mut self, event: &Event, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) {
        match *event {
            Event::CvResult { cv, value } => match &self.pending {
                Some(pending) if pending.cv == cv => self.resolve(value, wire, timers),
                Some(pending) => {
                    debug!(expected = pending.cv, got = cv, "ignoring CV result for another address");
                }
                None => debug!(cv, "ignoring CV result with nothing in flight"),
            },
            Event::CvNack { short_circuit } => {
                let reason = if short_circuit { CvFailure::ShortCircuit } else { CvFailure::Nack };
                self.reject(reason, wire, timers);
            }
            _ => {}
        }
    }

    /// Handles a fired [`TimerKey::CvTimeout`].  Stale ids are ignored.
    pub fn on_timeout(&mut self, id: TimerId, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) {
        if self.pending.as_ref().is_some_and(|p| p.timer == id) {
            self.reject(CvFailure::Timeout, wire, timers);
        }
    }

    /// Completes the in-flight operation successfully.  No-op when idle.
    pub fn resolve(&mut self, value: u8, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) {
        self.settle(|cv| Ok(CvValue { cv, value }), wire, timers);
    }

    /// Fails the in-flight operation.  No-op when idle.
    pub fn reject(&mut self, reason: CvFailure, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) {
        self.settle(|cv| Err(CvError { cv, reason }), wire, timers);
    }

    /// Fails everything, in flight and queued, with [`CvFailure::Cancelled`].
    pub fn cancel_all(&mut self, timers: &mut dyn Scheduler) {
        if let Some(pending) = self.pending.take() {
            timers.cancel(pending.timer);
            let _ = pending.reply.send(Err(CvError { cv: pending.cv, reason: CvFailure::Cancelled }));
        }
        for task in self.queue.drain(..) {
            let _ = task.reply.send(Err(CvError { cv: task.cv, reason: CvFailure::Cancelled }));
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn enqueue(
        &mut self,
        cv: u16,
        frame: Vec<u8>,
        wire: &mut dyn WireSink,
        timers: &mut dyn Scheduler,
    ) -> CvReply {
        let (tx, rx) = oneshot::channel();
        self.queue.push_back(CvTask { cv, frame, reply: tx });
        if self.pending.is_none() {
            self.drain(wire, timers);
        } else {
            debug!(cv, queued = self.queue.len(), "CV operation queued behind in-flight one");
        }
        CvReply { cv, rx }
    }

    fn drain(&mut self, wire: &mut dyn WireSink, timers: &mut dyn Scheduler) {
        if self.pending.is_some() {
            return;
        }
        while let Some(task) = self.queue.pop_front() {
            if task.reply.is_closed() {
                debug!(cv = task.cv, "dropping CV operation nobody waits for");
                continue;
            }
            info!(cv = task.cv, "starting CV operation");
            wire.send(&task.frame);
            let timer = timers.schedule(TimerKey::CvTimeout, self.timeout);
            self.pending = Some(PendingCv { cv: task.cv, reply: task.reply, timer });
            return;
        }
    }

    fn settle(
        &mut self,
        outcome: impl FnOnce(u16) -> CvOutcome,
        wire: &mut dyn WireSink,
        timers: &mut dyn Scheduler,
    ) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        timers.cancel(pending.timer);
        let outcome = outcome(pending.cv);
        if let Err(err) = &outcome {
            warn!(%err, "CV operation failed");
        }
        if pending.reply.send(outcome).is_err() {
            debug!(cv = pending.cv, "CV caller went away before the answer");
        }
        self.drain(wire, timers);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
