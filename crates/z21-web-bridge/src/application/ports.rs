//! The narrow interfaces the application layer needs from the outside world.
//!
//! The gateway never touches a socket or a runtime directly.  It is handed
//! these ports on every call, borrowed for the duration of one handler:
//!
//! - [`WireSink`] – send one encoded frame to the command station.
//! - [`Scheduler`] – arm and cancel one-shot timers, read a monotonic clock.
//! - [`ClientSink`] – push JSON notifications to browsers.
//!
//! The infrastructure layer implements them on top of tokio; tests use the
//! in-memory doubles in [`crate::application::mock`] or the `mockall`
//! automocks generated here.

use std::time::Duration;

use tracing::{debug, trace};
use z21_core::{encode_request, ProtocolError, Request};

use crate::domain::{ClientId, ServerMsg};

/// Outbound byte channel to the command station.
#[cfg_attr(test, mockall::automock)]
pub trait WireSink {
    /// Sends one complete frame.  Transport errors are the sink's problem;
    /// UDP gives no delivery guarantee anyway.
    fn send(&mut self, frame: &[u8]);
}

/// What a timer is for.  Delivered back to the gateway together with the
/// [`TimerId`] when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Heartbeat,
    CvTimeout,
    /// Throttle window for one locomotive address.
    Drive(u16),
    /// Deactivation of one turnout output.
    TurnoutPulse(u16),
}

/// Handle of an armed timer.
///
/// Ids are never reused, so a component can tell a stale firing (one that
/// raced with a cancel) from the timer it is actually waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// One-shot timers and a monotonic clock.
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler {
    /// Arms a timer that fires once after `after`.
    fn schedule(&mut self, key: TimerKey, after: Duration) -> TimerId;

    /// Cancels a timer.  Cancelling an unknown or already fired id is a no-op.
    fn cancel(&mut self, id: TimerId);

    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// Outbound channel to connected browsers.
#[cfg_attr(test, mockall::automock)]
pub trait ClientSink {
    fn broadcast(&mut self, msg: &ServerMsg);
    fn send_to(&mut self, client: ClientId, msg: &ServerMsg);
}

/// All three ports, borrowed for one handler invocation.
pub struct Ports<'a> {
    pub wire: &'a mut dyn WireSink,
    pub timers: &'a mut dyn Scheduler,
    pub clients: &'a mut dyn ClientSink,
}

impl<'a> Ports<'a> {
    pub fn new(
        wire: &'a mut dyn WireSink,
        timers: &'a mut dyn Scheduler,
        clients: &'a mut dyn ClientSink,
    ) -> Self {
        Self { wire, timers, clients }
    }
}

/// Encodes `request` and sends it.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the request has out-of-range fields; nothing
/// is sent in that case.
pub fn send_request(wire: &mut dyn WireSink, request: &Request) -> Result<(), ProtocolError> {
    let frame = encode_request(request)?;
    debug!(?request, "→ Z21");
    trace!(len = frame.len(), "frame bytes: {:02X?}", frame);
    wire.send(&frame);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_encodes_and_sends_once() {
        // Arrange
        let mut wire = MockWireSink::new();
        wire.expect_send().times(1).return_const(());

        // Act
        let result = send_request(&mut wire, &Request::Logoff);

        // Assert
        assert!(result.is_ok());
    }

    #[test]
    fn test_send_request_with_bad_address_sends_nothing() {
        let mut wire = MockWireSink::new();
        wire.expect_send().times(0);

        let result = send_request(&mut wire, &Request::SetLocoEStop { address: 0 });

        assert_eq!(result, Err(ProtocolError::InvalidLocoAddress(0)));
    }
}
