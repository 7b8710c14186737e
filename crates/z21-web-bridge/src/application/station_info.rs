//! Step-by-step discovery of the command station's capabilities.
//!
//! Discovery order is fixed: firmware version first, then hardware info
//! (firmware ≥ 1.20) or the legacy X-BUS version (older firmware), then the
//! lock code for the starter-set stations that have one.  [`InfoOrchestrator::poke`]
//! advances at most one step per call and is meant to be called often.

use std::time::Duration;

use tracing::debug;
use z21_core::{CommandStationInfo, Request};

use super::ports::{send_request, WireSink};

/// One discoverable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    Firmware,
    XBusVersion,
    HardwareInfo,
    Code,
}

impl InfoKind {
    fn request(self) -> Request {
        match self {
            InfoKind::Firmware => Request::GetFirmwareVersion,
            InfoKind::XBusVersion => Request::GetXBusVersion,
            InfoKind::HardwareInfo => Request::GetHardwareInfo,
            InfoKind::Code => Request::GetCode,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RequestSlot {
    in_flight: bool,
    last_sent_at: Option<u64>,
}

#[derive(Debug)]
pub struct InfoOrchestrator {
    retry_window_ms: u64,
    slots: [RequestSlot; 4],
}

impl InfoOrchestrator {
    pub fn new(retry_window: Duration) -> Self {
        Self { retry_window_ms: retry_window.as_millis() as u64, slots: [RequestSlot::default(); 4] }
    }

    /// Advances discovery by at most one request.
    ///
    /// Returns the kind that was requested, or `None` when nothing was sent
    /// (either everything is known or the next request is still in flight).
    pub fn poke(
        &mut self,
        info: &CommandStationInfo,
        now_ms: u64,
        wire: &mut dyn WireSink,
    ) -> Option<InfoKind> {
        let Some(firmware) = info.firmware_version else {
            return self.fetch(InfoKind::Firmware, now_ms, wire);
        };

        if firmware.supports_hardware_info() {
            if info.hardware_type.is_none() {
                return self.fetch(InfoKind::HardwareInfo, now_ms, wire);
            }
        } else if info.xbus_version.is_none() {
            return self.fetch(InfoKind::XBusVersion, now_ms, wire);
        }

        match info.hardware_type {
            Some(hw) if hw.requires_code() && info.code.is_none() => {
                self.fetch(InfoKind::Code, now_ms, wire)
            }
            _ => None,
        }
    }

    /// The answer for `kind` arrived.
    pub fn ack(&mut self, kind: InfoKind) {
        self.slots[kind.index()].in_flight = false;
    }

    pub fn reset(&mut self) {
        self.slots = [RequestSlot::default(); 4];
    }

    pub fn is_in_flight(&self, kind: InfoKind) -> bool {
        self.slots[kind.index()].in_flight
    }

    fn fetch(&mut self, kind: InfoKind, now_ms: u64, wire: &mut dyn WireSink) -> Option<InfoKind> {
        let slot = &mut self.slots[kind.index()];
        if slot.in_flight {
            let recent = slot
                .last_sent_at
                .is_some_and(|at| now_ms.saturating_sub(at) < self.retry_window_ms);
            if recent {
                return None;
            }
            debug!(?kind, "no answer within retry window, asking again");
        }

        slot.in_flight = true;
        slot.last_sent_at = Some(now_ms);
        // These requests carry no fields, so encoding cannot fail.
        if send_request(wire, &kind.request()).is_err() {
            return None;
        }
        Some(kind)
    }
}
