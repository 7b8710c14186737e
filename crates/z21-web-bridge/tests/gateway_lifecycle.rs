//! End-to-end scenarios for the gateway, driven through its public handlers
//! with the in-memory ports and virtual time.

use std::time::Duration;

use tokio_test::{assert_pending, assert_ready_eq, task};
use z21_core::protocol::{encode_frame, encode_xbus};
use z21_core::{Direction, DriveCommand, LocoSpeed, Request, SpeedSteps, TurnoutPosition};
use z21_web_bridge::application::mock::{ManualScheduler, RecordingClients, RecordingWire};
use z21_web_bridge::application::{CvError, CvReply, CvValue, Gateway, Ports};
use z21_web_bridge::domain::messages::CvFailure;
use z21_web_bridge::domain::{BridgeConfig, ClientId, ClientMsg, ServerMsg};

struct Bench {
    gateway: Gateway,
    wire: RecordingWire,
    timers: ManualScheduler,
    clients: RecordingClients,
}

impl Bench {
    fn new(config: BridgeConfig) -> Self {
        Self {
            gateway: Gateway::new(&config),
            wire: RecordingWire::new(),
            timers: ManualScheduler::new(),
            clients: RecordingClients::new(),
        }
    }

    fn ports(&mut self) -> (&mut Gateway, Ports<'_>) {
        (&mut self.gateway, Ports::new(&mut self.wire, &mut self.timers, &mut self.clients))
    }

    fn connect(&mut self, id: u64) {
        let (gateway, mut ports) = self.ports();
        gateway.on_client_connected(ClientId(id), &mut ports);
    }

    fn disconnect(&mut self, id: u64) {
        let (gateway, mut ports) = self.ports();
        gateway.on_client_disconnected(ClientId(id), &mut ports);
    }

    fn send(&mut self, id: u64, msg: ClientMsg) -> Option<CvReply> {
        let (gateway, mut ports) = self.ports();
        gateway.on_client_message(ClientId(id), msg, &mut ports)
    }

    fn receive(&mut self, datagram: &[u8]) {
        let (gateway, mut ports) = self.ports();
        gateway.on_datagram(datagram, &mut ports);
    }

    fn advance(&mut self, ms: u64) {
        for (id, key) in self.timers.advance(Duration::from_millis(ms)) {
            let (gateway, mut ports) = self.ports();
            gateway.on_timer(id, key, &mut ports);
        }
    }

    fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.wire.count(pred)
    }
}

fn cv_result(cv: u16, value: u8) -> Vec<u8> {
    let [msb, lsb] = (cv - 1).to_be_bytes();
    encode_xbus(0x64, &[0x14, msb, lsb, value])
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

#[test]
fn test_session_opens_once_and_closes_on_last_disconnect() {
    // Arrange
    let mut bench = Bench::new(BridgeConfig::default());

    // Act: two browsers arrive
    bench.connect(1);
    bench.connect(2);

    // Assert: the wire session was opened exactly once
    assert_eq!(bench.count(|r| matches!(r, Request::SetBroadcastFlags(_))), 1);
    assert_eq!(bench.count(|r| *r == Request::SystemStateGetData), 1);

    // Act: both leave
    bench.disconnect(1);
    assert!(bench.gateway.is_active());
    bench.disconnect(2);

    // Assert
    assert!(!bench.gateway.is_active());
    assert_eq!(bench.count(|r| *r == Request::Logoff), 1);
}

#[test]
fn test_heartbeat_runs_while_active_and_stops_after_logoff() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);

    bench.advance(60_000);
    assert_eq!(bench.count(|r| *r == Request::SystemStateGetData), 2);

    bench.disconnect(1);
    bench.wire.clear();
    bench.advance(180_000);

    assert_eq!(bench.count(|r| *r == Request::SystemStateGetData), 0);
}

#[test]
fn test_reconnect_after_logoff_opens_a_fresh_session() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    bench.receive(&encode_xbus(0xF3, &[0x0A, 0x01, 0x20]));
    bench.disconnect(1);
    bench.wire.clear();

    bench.connect(2);

    // Discovery starts over because the station may have changed meanwhile.
    assert_eq!(
        bench.wire.requests(),
        vec![Request::SetBroadcastFlags(1), Request::SystemStateGetData, Request::GetFirmwareVersion]
    );
    assert!(bench.gateway.station().firmware_version.is_none());
}

// ── Command-station discovery ─────────────────────────────────────────────────

#[test]
fn test_discovery_for_legacy_firmware_asks_xbus_version() {
    // Arrange
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    bench.wire.clear();

    // Act: firmware 1.00 predates the hardware-info request
    bench.receive(&encode_xbus(0xF3, &[0x0A, 0x01, 0x00]));

    // Assert
    assert_eq!(bench.wire.requests(), vec![Request::GetXBusVersion]);

    // Act: the X-BUS version completes discovery
    bench.wire.clear();
    bench.receive(&encode_xbus(0x63, &[0x21, 0x30, 0x12]));

    // Assert
    assert!(bench.wire.frames.is_empty());
    assert!(bench.gateway.station().xbus_version.is_some());
}

#[test]
fn test_discovery_for_starter_station_fetches_lock_code() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    bench.receive(&encode_xbus(0xF3, &[0x0A, 0x01, 0x30]));
    bench.wire.clear();

    // Hardware info: z21 start (0x0204), firmware 1.30 BCD
    bench.receive(&encode_frame(0x1A, &[0x04, 0x02, 0x00, 0x00, 0x30, 0x01, 0x00, 0x00]));
    assert_eq!(bench.wire.requests(), vec![Request::GetCode]);

    bench.wire.clear();
    bench.receive(&encode_frame(0x18, &[0x02]));
    assert!(bench.wire.frames.is_empty());
    assert!(bench.gateway.station().code.is_some());
}

#[test]
fn test_unanswered_discovery_request_is_repeated_after_retry_window() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);

    // Any inbound traffic pokes discovery; too soon to ask again.
    bench.receive(&encode_xbus(0x61, &[0x01]));
    assert_eq!(bench.count(|r| *r == Request::GetFirmwareVersion), 1);

    bench.advance(1_000);
    bench.receive(&encode_xbus(0x61, &[0x01]));
    assert_eq!(bench.count(|r| *r == Request::GetFirmwareVersion), 2);
}

// ── CV programming ────────────────────────────────────────────────────────────

#[test]
fn test_cv_read_ignores_mismatched_answer_then_resolves() {
    // Arrange
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    let reply = bench.send(1, ClientMsg::CvRead { cv: 29 }).expect("CV read returns a reply");
    let mut reply = task::spawn(reply);

    // Act: an answer for another CV
    bench.receive(&cv_result(1, 3));

    // Assert
    assert_pending!(reply.poll());

    // Act: the real answer
    bench.receive(&cv_result(29, 42));

    // Assert
    assert_ready_eq!(reply.poll(), Ok(CvValue { cv: 29, value: 42 }));
}

#[test]
fn test_cv_operations_are_sent_one_at_a_time() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);

    let first = bench.send(1, ClientMsg::CvRead { cv: 1 }).expect("reply");
    let second = bench.send(2, ClientMsg::CvRead { cv: 17 }).expect("reply");
    assert_eq!(bench.count(|r| matches!(r, Request::CvRead { .. })), 1);

    bench.receive(&cv_result(1, 3));

    assert_eq!(bench.count(|r| *r == Request::CvRead { cv: 17 }), 1);
    let mut first = task::spawn(first);
    let mut second = task::spawn(second);
    assert_ready_eq!(first.poll(), Ok(CvValue { cv: 1, value: 3 }));
    assert_pending!(second.poll());
}

#[test]
fn test_cv_timeout_rejects_and_starts_next() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    let first = bench.send(1, ClientMsg::CvWrite { cv: 3, value: 10 }).expect("reply");
    let _second = bench.send(1, ClientMsg::CvRead { cv: 4 }).expect("reply");

    bench.advance(10_000);

    let mut first = task::spawn(first);
    assert_ready_eq!(first.poll(), Err(CvError { cv: 3, reason: CvFailure::Timeout }));
    assert_eq!(bench.count(|r| *r == Request::CvRead { cv: 4 }), 1);
}

#[test]
fn test_cv_nack_rejects_pending_operation() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    let reply = bench.send(1, ClientMsg::CvRead { cv: 8 }).expect("reply");

    bench.receive(&encode_xbus(0x61, &[0x13]));

    let mut reply = task::spawn(reply);
    assert_ready_eq!(reply.poll(), Err(CvError { cv: 8, reason: CvFailure::Nack }));
}

// ── Driving ───────────────────────────────────────────────────────────────────

#[test]
fn test_rapid_drives_coalesce_into_last_one() {
    // Arrange
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    bench.wire.clear();
    let drive = |step, direction| ClientMsg::Drive {
        address: 3,
        speed: None,
        step: Some(step),
        speed_steps: None,
        direction: Some(direction),
    };

    // Act
    bench.send(1, drive(10, Direction::Forward));
    bench.advance(10);
    bench.send(1, drive(20, Direction::Forward));
    bench.advance(10);
    bench.send(1, drive(30, Direction::Reverse));
    bench.advance(50);

    // Assert
    assert_eq!(
        bench.wire.requests(),
        vec![Request::SetLocoDrive(DriveCommand {
            address: 3,
            speed_steps: SpeedSteps::Steps128,
            speed: LocoSpeed::Step(30),
            direction: Direction::Reverse,
        })]
    );
}

#[test]
fn test_drives_for_different_locos_are_independent() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    bench.wire.clear();

    for address in [3, 4] {
        bench.send(
            1,
            ClientMsg::Drive { address, speed: Some(1.0), step: None, speed_steps: None, direction: None },
        );
    }
    bench.advance(50);

    assert_eq!(bench.count(|r| matches!(r, Request::SetLocoDrive(_))), 2);
}

#[test]
fn test_loco_info_broadcast_updates_cache() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);

    // Address 3, 128 steps, forward at raw speed 0x40, F0 on
    bench.receive(&encode_xbus(0xEF, &[0x00, 0x03, 0x04, 0xC0, 0x10, 0x00, 0x00, 0x00, 0x00]));

    let state = bench.gateway.locos().get(3).copied().expect("cached");
    assert_eq!(state.direction, Direction::Forward);
    assert!(bench.clients.broadcasts.iter().any(|m| matches!(m, ServerMsg::LocoState(s) if s.address == 3)));
}

#[test]
fn test_last_disconnect_without_safety_stop_only_logs_off() {
    let config = BridgeConfig { stop_on_disconnect: false, ..BridgeConfig::default() };
    let mut bench = Bench::new(config);
    bench.connect(1);
    bench.send(1, ClientMsg::Drive { address: 3, speed: None, step: Some(40), speed_steps: None, direction: None });
    bench.advance(50);
    bench.wire.clear();

    bench.disconnect(1);

    assert_eq!(bench.wire.requests(), vec![Request::Logoff]);
}

#[test]
fn test_non_last_disconnect_stops_locos_and_keeps_session() {
    // Arrange
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    bench.connect(2);
    bench.send(1, ClientMsg::Drive { address: 3, speed: None, step: Some(40), speed_steps: None, direction: None });
    bench.advance(50);
    bench.wire.clear();
    bench.clients.broadcasts.clear();

    // Act
    bench.disconnect(1);

    // Assert: one stop frame, the remaining client sees it, the session stays up
    assert_eq!(
        bench.count(|r| matches!(r, Request::SetLocoDrive(DriveCommand { address: 3, speed: LocoSpeed::Stop, .. }))),
        1
    );
    assert!(bench
        .clients
        .broadcasts
        .iter()
        .any(|m| matches!(m, ServerMsg::LocoState(s) if s.address == 3 && s.step == 0 && s.speed == 0.0)));
    assert!(bench.gateway.is_active());
    assert_eq!(bench.count(|r| *r == Request::Logoff), 0);
}

// ── Turnouts ──────────────────────────────────────────────────────────────────

#[test]
fn test_turnout_activates_then_releases_after_pulse() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    bench.wire.clear();

    bench.send(1, ClientMsg::Turnout { address: 12, state: TurnoutPosition::Diverging, pulse_ms: Some(250) });
    bench.advance(249);
    let before = bench.wire.requests();
    bench.advance(1);

    assert_eq!(
        before,
        vec![Request::SetTurnout { address: 12, position: TurnoutPosition::Diverging, activate: true, queue: false }]
    );
    assert_eq!(
        bench.wire.requests().last(),
        Some(&Request::SetTurnout {
            address: 12,
            position: TurnoutPosition::Diverging,
            activate: false,
            queue: false
        })
    );
}

#[test]
fn test_shutdown_cancels_pending_cv_operation() {
    let mut bench = Bench::new(BridgeConfig::default());
    bench.connect(1);
    let reply = bench.send(1, ClientMsg::CvRead { cv: 29 }).expect("reply");

    let (gateway, mut ports) = bench.ports();
    gateway.shutdown(&mut ports);

    let mut reply = task::spawn(reply);
    assert_ready_eq!(reply.poll(), Err(CvError { cv: 29, reason: CvFailure::Cancelled }));
    assert!(!bench.gateway.is_active());
}
