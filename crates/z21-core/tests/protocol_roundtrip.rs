//! Integration tests for the z21-core protocol codec.
//!
//! These tests go through the public API only: requests are encoded, read back
//! with `decode_request`, and inbound frames are built by hand and pushed
//! through `parse_datagram` + `decode_dataset` the way the bridge does it.

use z21_core::{
    decode_dataset, decode_request, encode_request, parse_datagram,
    protocol::{
        codec::MAX_CV,
        frame::{encode_frame, encode_xbus, LAN_GET_HWINFO},
    },
    Dataset, Direction, DriveCommand, Event, FirmwareVersion, FunctionAction, HardwareType,
    LocoSpeed, ProtocolError, Request, SpeedSteps, TrackPowerEvent, TurnoutPosition,
    TurnoutState,
};

/// Encodes a request and decodes it back.
fn roundtrip(request: Request) -> Request {
    let bytes = encode_request(&request).expect("encode must succeed");
    decode_request(&bytes).expect("decode must succeed")
}

fn events(buf: &[u8]) -> Vec<Event> {
    parse_datagram(buf).iter().map(decode_dataset).collect()
}

// ── Request round trips ───────────────────────────────────────────────────────

#[test]
fn test_roundtrip_drive_in_every_step_mode() {
    for (speed_steps, step) in [
        (SpeedSteps::Steps14, 14),
        (SpeedSteps::Steps28, 17),
        (SpeedSteps::Steps128, 126),
    ] {
        for direction in [Direction::Forward, Direction::Reverse] {
            let original = Request::SetLocoDrive(DriveCommand {
                address: 2000,
                speed_steps,
                speed: LocoSpeed::Step(step),
                direction,
            });
            assert_eq!(original, roundtrip(original.clone()));
        }
    }
}

#[test]
fn test_roundtrip_drive_stop_and_emergency_stop() {
    for speed in [LocoSpeed::Stop, LocoSpeed::EmergencyStop] {
        let original = Request::SetLocoDrive(DriveCommand {
            address: 3,
            speed_steps: SpeedSteps::Steps128,
            speed,
            direction: Direction::Reverse,
        });
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_roundtrip_function_actions() {
    for action in [FunctionAction::Off, FunctionAction::On, FunctionAction::Toggle] {
        let original = Request::SetLocoFunction { address: 127, function: 31, action };
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_roundtrip_turnout() {
    let original = Request::SetTurnout {
        address: 16383,
        position: TurnoutPosition::Through,
        activate: false,
        queue: true,
    };
    assert_eq!(original, roundtrip(original.clone()));
    assert_eq!(
        Request::GetTurnoutInfo { address: 0 },
        roundtrip(Request::GetTurnoutInfo { address: 0 })
    );
}

#[test]
fn test_roundtrip_cv_read_and_write_at_range_edges() {
    for cv in [1, 29, MAX_CV] {
        assert_eq!(Request::CvRead { cv }, roundtrip(Request::CvRead { cv }));
        assert_eq!(
            Request::CvWrite { cv, value: 0xFF },
            roundtrip(Request::CvWrite { cv, value: 0xFF })
        );
    }
}

#[test]
fn test_roundtrip_estop_and_track_power() {
    for original in [
        Request::SetLocoEStop { address: 9999 },
        Request::SetTrackPower(true),
        Request::SetTrackPower(false),
        Request::SetStop,
    ] {
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_roundtrip_session_requests() {
    for original in [
        Request::Logoff,
        Request::SetBroadcastFlags(0x0001_0101),
        Request::SystemStateGetData,
        Request::GetHardwareInfo,
        Request::GetCode,
        Request::GetFirmwareVersion,
        Request::GetXBusVersion,
        Request::GetStatus,
        Request::GetLocoInfo { address: 128 },
    ] {
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_invalid_inputs_are_rejected_before_encoding() {
    let bad = [
        (Request::GetLocoInfo { address: 0 }, ProtocolError::InvalidLocoAddress(0)),
        (Request::SetLocoEStop { address: 10_000 }, ProtocolError::InvalidLocoAddress(10_000)),
        (Request::GetTurnoutInfo { address: 20_000 }, ProtocolError::InvalidAccessoryAddress(20_000)),
        (Request::CvRead { cv: 0 }, ProtocolError::InvalidCv(0)),
        (Request::CvWrite { cv: 1025, value: 1 }, ProtocolError::InvalidCv(1025)),
    ];
    for (request, expected) in bad {
        assert_eq!(encode_request(&request), Err(expected));
    }
}

// ── Inbound decoding ──────────────────────────────────────────────────────────

#[test]
fn test_datagram_with_mixed_frames_decodes_in_order() {
    // Arrange: power on broadcast, loco info, hardware info in one datagram
    let mut buf = encode_xbus(0x61, &[0x01]);
    buf.extend(encode_xbus(0xEF, &[0x00, 0x03, 0x04, 0x85, 0x10]));
    let mut hw = Vec::new();
    hw.extend_from_slice(&0x0201u32.to_le_bytes());
    hw.extend_from_slice(&0x0142u32.to_le_bytes());
    buf.extend(encode_frame(LAN_GET_HWINFO, &hw));

    // Act
    let decoded = events(&buf);

    // Assert
    assert_eq!(decoded.len(), 3);
    assert_eq!(
        decoded[0],
        Event::TrackPower(TrackPowerEvent { on: true, programming_mode: None, short_circuit: None })
    );
    match &decoded[1] {
        Event::LocoInfo(info) => {
            assert_eq!(info.address, 3);
            assert_eq!(info.speed, LocoSpeed::Step(4));
            assert_eq!(info.functions.get(0), Some(true));
            assert_eq!(info.functions.get(5), None);
        }
        other => panic!("expected loco info, got {other:?}"),
    }
    assert_eq!(
        decoded[2],
        Event::HardwareInfo { hardware_type: HardwareType::Z21New, firmware: FirmwareVersion::new(1, 42) }
    );
}

#[test]
fn test_corrupt_checksum_reports_data_and_diagnostic() {
    let mut buf = encode_xbus(0x43, &[0x00, 0x07, 0x01]);
    let last = buf.len() - 1;
    buf[last] = 0x00;

    let decoded = events(&buf);

    assert_eq!(decoded[0], Event::TurnoutInfo { address: 7, state: TurnoutState::Through });
    assert!(matches!(decoded[1], Event::BadChecksum { x_header: 0x43, actual: 0x00, .. }));
}

#[test]
fn test_truncated_second_frame_is_dropped_silently() {
    let mut buf = encode_xbus(0x81, &[0x00]);
    let second = encode_xbus(0x61, &[0x00]);
    buf.extend_from_slice(&second[..second.len() - 2]);

    let parsed = parse_datagram(&buf);

    assert_eq!(parsed, vec![Dataset::XBus { x_header: 0x81, data: vec![0x00] }]);
    assert_eq!(events(&buf), vec![Event::Stopped]);
}
