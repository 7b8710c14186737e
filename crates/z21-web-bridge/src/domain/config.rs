//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is populated in `main.rs` from CLI arguments, `Z21_*` environment
//! variables, and an optional TOML file; the domain never reads any of those
//! itself.

use std::net::SocketAddr;
use std::time::Duration;

/// Bit 0 of the broadcast flags: driving, switching, and track-power broadcasts.
pub const BROADCAST_BASIC: u32 = 0x0000_0001;

/// Turnout pulse durations a client may request, in milliseconds.
pub const TURNOUT_PULSE_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=10_000;

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use z21_web_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.z21_addr.port(), 21105);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Where the WebSocket server listens.
    pub ws_bind_addr: SocketAddr,

    /// UDP address of the command station.
    pub z21_addr: SocketAddr,

    /// How often the system state is re-requested while a session is active.
    ///
    /// The command station drops clients it has not heard from for about a
    /// minute, so this doubles as the keep-alive.
    pub heartbeat_interval: Duration,

    /// How long a CV read or write may wait for an answer.
    pub cv_timeout: Duration,

    /// Minimum gap between two identical discovery requests with no answer.
    pub info_retry_window: Duration,

    /// Drive commands for one locomotive are coalesced within this window.
    pub drive_throttle_window: Duration,

    /// Default time between activating and deactivating a turnout output.
    pub turnout_pulse: Duration,

    /// Broadcast flags enabled when the wire session starts.
    pub broadcast_flags: u32,

    /// Stop every known locomotive when a client disconnects.
    pub stop_on_disconnect: bool,

    /// Echo every inbound datagram to clients, base64-encoded.
    pub echo_raw_frames: bool,
}

impl Default for BridgeConfig {
    /// | Field                 | Default               |
    /// |-----------------------|-----------------------|
    /// | ws_bind_addr          | `0.0.0.0:8080`        |
    /// | z21_addr              | `192.168.0.111:21105` |
    /// | heartbeat_interval    | 60 s                  |
    /// | cv_timeout            | 10 s                  |
    /// | info_retry_window     | 1000 ms               |
    /// | drive_throttle_window | 50 ms                 |
    /// | turnout_pulse         | 100 ms                |
    /// | broadcast_flags       | `0x0000_0001`         |
    /// | stop_on_disconnect    | `true`                |
    /// | echo_raw_frames       | `false`               |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            z21_addr: SocketAddr::from(([192, 168, 0, 111], 21105)),
            heartbeat_interval: Duration::from_secs(60),
            cv_timeout: Duration::from_secs(10),
            info_retry_window: Duration::from_millis(1000),
            drive_throttle_window: Duration::from_millis(50),
            turnout_pulse: Duration::from_millis(100),
            broadcast_flags: BROADCAST_BASIC,
            stop_on_disconnect: true,
            echo_raw_frames: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ws_port_is_8080() {
        // Arrange / Act
        let cfg = BridgeConfig::default();
        // Assert
        assert_eq!(cfg.ws_bind_addr.port(), 8080);
    }

    #[test]
    fn test_default_z21_address() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.z21_addr.to_string(), "192.168.0.111:21105");
    }

    #[test]
    fn test_default_timings() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(cfg.cv_timeout, Duration::from_secs(10));
        assert_eq!(cfg.info_retry_window, Duration::from_millis(1000));
        assert_eq!(cfg.drive_throttle_window, Duration::from_millis(50));
        assert_eq!(cfg.turnout_pulse, Duration::from_millis(100));
    }

    #[test]
    fn test_default_pulse_is_in_client_range() {
        let cfg = BridgeConfig::default();
        assert!(TURNOUT_PULSE_RANGE_MS.contains(&(cfg.turnout_pulse.as_millis() as u64)));
    }

    #[test]
    fn test_default_enables_basic_broadcasts_and_safety_stop() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.broadcast_flags, BROADCAST_BASIC);
        assert!(cfg.stop_on_disconnect);
        assert!(!cfg.echo_raw_frames);
    }
}
