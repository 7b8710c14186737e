//! Z21 WebSocket Bridge, entry point.
//!
//! This binary accepts WebSocket connections from web browsers and shares one
//! UDP session with a Z21 command station between all of them.  Browsers send
//! and receive JSON; the command station speaks its binary LAN protocol.
//!
//! # Usage
//!
//! ```text
//! z21-web-bridge [OPTIONS]
//!
//! Options:
//!   --config <FILE>              TOML file with default settings
//!   --ws-port <PORT>             WebSocket listener port [default: 8080]
//!   --ws-bind <IP>               WebSocket bind address [default: 0.0.0.0]
//!   --z21-host <IP>              Command station address [default: 192.168.0.111]
//!   --z21-port <PORT>            Command station UDP port [default: 21105]
//!   --heartbeat-secs <SECS>      System-state poll interval [default: 60]
//!   --cv-timeout-secs <SECS>     CV read/write timeout [default: 10]
//!   --info-retry-ms <MS>         Gap before repeating a discovery request [default: 1000]
//!   --throttle-ms <MS>           Drive coalescing window [default: 50]
//!   --turnout-pulse-ms <MS>      Default turnout pulse [default: 100]
//!   --broadcast-flags <MASK>     Broadcast flags, decimal or 0x-hex [default: 0x1]
//!   --stop-on-disconnect <BOOL>  Stop all locos when a browser leaves [default: true]
//!   --echo-raw-frames            Forward every datagram to browsers (base64)
//! ```
//!
//! # Precedence
//!
//! Command line, then `Z21_*` environment variables, then the `--config`
//! file, then built-in defaults.
//!
//! | Variable                  | Default         |
//! |---------------------------|-----------------|
//! | `Z21_CONFIG`              | (none)          |
//! | `Z21_WS_PORT`             | `8080`          |
//! | `Z21_WS_BIND`             | `0.0.0.0`       |
//! | `Z21_HOST`                | `192.168.0.111` |
//! | `Z21_PORT`                | `21105`         |
//! | `Z21_HEARTBEAT_SECS`      | `60`            |
//! | `Z21_CV_TIMEOUT_SECS`     | `10`            |
//! | `Z21_INFO_RETRY_MS`       | `1000`          |
//! | `Z21_THROTTLE_MS`         | `50`            |
//! | `Z21_TURNOUT_PULSE_MS`    | `100`           |
//! | `Z21_BROADCAST_FLAGS`     | `0x1`           |
//! | `Z21_STOP_ON_DISCONNECT`  | `true`          |
//! | `Z21_ECHO_RAW_FRAMES`     | `false`         |

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use z21_web_bridge::application::Gateway;
use z21_web_bridge::domain::config::TURNOUT_PULSE_RANGE_MS;
use z21_web_bridge::domain::BridgeConfig;
use z21_web_bridge::infrastructure::{bind, channel, run_gateway, run_server, GatewayInput, Z21Link};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Z21 WebSocket bridge.
///
/// Every option is optional on the command line so that an unset option can
/// fall through to the config file before the built-in default applies.
#[derive(Debug, Default, Parser)]
#[command(
    name = "z21-web-bridge",
    about = "WebSocket-to-Z21 gateway for browser-based model railroad control",
    version
)]
struct Cli {
    /// TOML file whose keys mirror the long option names (with underscores).
    #[arg(long, env = "Z21_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "Z21_WS_PORT")]
    ws_port: Option<u16>,

    /// IP address to bind the WebSocket server to.
    ///
    /// `0.0.0.0` accepts connections from the LAN, `127.0.0.1` only local ones.
    #[arg(long, env = "Z21_WS_BIND")]
    ws_bind: Option<String>,

    /// IP address of the command station.
    #[arg(long, env = "Z21_HOST")]
    z21_host: Option<String>,

    /// UDP port of the command station.
    #[arg(long, env = "Z21_PORT")]
    z21_port: Option<u16>,

    #[arg(long, env = "Z21_HEARTBEAT_SECS")]
    heartbeat_secs: Option<u64>,

    #[arg(long, env = "Z21_CV_TIMEOUT_SECS")]
    cv_timeout_secs: Option<u64>,

    /// Minimum gap between two unanswered identical discovery requests.
    #[arg(long, env = "Z21_INFO_RETRY_MS")]
    info_retry_ms: Option<u64>,

    #[arg(long, env = "Z21_THROTTLE_MS")]
    throttle_ms: Option<u64>,

    #[arg(long, env = "Z21_TURNOUT_PULSE_MS")]
    turnout_pulse_ms: Option<u64>,

    /// Broadcast flags sent at session start; decimal or `0x`-prefixed hex.
    #[arg(long, env = "Z21_BROADCAST_FLAGS", value_parser = parse_flags)]
    broadcast_flags: Option<u32>,

    #[arg(long, env = "Z21_STOP_ON_DISCONNECT")]
    stop_on_disconnect: Option<bool>,

    #[arg(long, env = "Z21_ECHO_RAW_FRAMES", num_args = 0..=1, default_missing_value = "true")]
    echo_raw_frames: Option<bool>,
}

/// Settings read from `--config`.  Same keys as the long options.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    ws_port: Option<u16>,
    ws_bind: Option<String>,
    z21_host: Option<String>,
    z21_port: Option<u16>,
    heartbeat_secs: Option<u64>,
    cv_timeout_secs: Option<u64>,
    info_retry_ms: Option<u64>,
    throttle_ms: Option<u64>,
    turnout_pulse_ms: Option<u64>,
    broadcast_flags: Option<u32>,
    stop_on_disconnect: Option<bool>,
    echo_raw_frames: Option<bool>,
}

impl FileConfig {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

fn parse_flags(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid broadcast flags '{s}': {e}"))
}

fn socket_addr(host: &str, port: u16, what: &str) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("invalid {what} address: '{host}'"))?;
    Ok(SocketAddr::new(ip, port))
}

impl Cli {
    /// Merges the command line over `file` over [`BridgeConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns an error if an address is not a valid IP, or if the turnout
    /// pulse is outside the range clients may request.
    fn into_bridge_config(self, file: FileConfig) -> anyhow::Result<BridgeConfig> {
        let defaults = BridgeConfig::default();

        let ws_ip = self.ws_bind.or(file.ws_bind).unwrap_or_else(|| defaults.ws_bind_addr.ip().to_string());
        let ws_port = self.ws_port.or(file.ws_port).unwrap_or(defaults.ws_bind_addr.port());
        let z21_ip = self.z21_host.or(file.z21_host).unwrap_or_else(|| defaults.z21_addr.ip().to_string());
        let z21_port = self.z21_port.or(file.z21_port).unwrap_or(defaults.z21_addr.port());

        let turnout_pulse = self
            .turnout_pulse_ms
            .or(file.turnout_pulse_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.turnout_pulse);
        let pulse_ms = turnout_pulse.as_millis() as u64;
        if !TURNOUT_PULSE_RANGE_MS.contains(&pulse_ms) {
            anyhow::bail!(
                "turnout pulse {pulse_ms} ms is outside {}..={} ms",
                TURNOUT_PULSE_RANGE_MS.start(),
                TURNOUT_PULSE_RANGE_MS.end()
            );
        }

        Ok(BridgeConfig {
            ws_bind_addr: socket_addr(&ws_ip, ws_port, "WebSocket bind")?,
            z21_addr: socket_addr(&z21_ip, z21_port, "command station")?,
            heartbeat_interval: self
                .heartbeat_secs
                .or(file.heartbeat_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            cv_timeout: self
                .cv_timeout_secs
                .or(file.cv_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cv_timeout),
            info_retry_window: self
                .info_retry_ms
                .or(file.info_retry_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.info_retry_window),
            drive_throttle_window: self
                .throttle_ms
                .or(file.throttle_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.drive_throttle_window),
            turnout_pulse,
            broadcast_flags: self.broadcast_flags.or(file.broadcast_flags).unwrap_or(defaults.broadcast_flags),
            stop_on_disconnect: self
                .stop_on_disconnect
                .or(file.stop_on_disconnect)
                .unwrap_or(defaults.stop_on_disconnect),
            echo_raw_frames: self.echo_raw_frames.or(file.echo_raw_frames).unwrap_or(defaults.echo_raw_frames),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. Logging is initialised from `RUST_LOG` (default `info`).
/// 2. The CLI and optional config file are merged into a [`BridgeConfig`].
/// 3. The WebSocket port is bound and the UDP link to the command station is
///    opened; either failure aborts startup.
/// 4. The gateway task and the UDP reader are spawned.
/// 5. [`run_server`] accepts browsers until Ctrl+C clears the running flag.
/// 6. The gateway logs off the wire session and every task is wound down.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = cli.into_bridge_config(file)?;

    info!("Z21 WebSocket bridge starting: ws={}, z21={}", config.ws_bind_addr, config.z21_addr);

    let listener = bind(config.ws_bind_addr).await?;
    let link = Z21Link::connect(config.z21_addr).await?;

    let (gateway, inputs) = channel();
    let gateway_task = tokio::spawn(run_gateway(Gateway::new(&config), link.sink(), gateway.clone(), inputs));
    let reader = link.spawn_reader(gateway.sender());

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let served = run_server(listener, gateway.clone(), running).await;

    // Each resource is wound down on its own; one failing does not skip the rest.
    if !gateway.send(GatewayInput::Shutdown) {
        warn!("gateway task already stopped");
    }
    match tokio::time::timeout(Duration::from_secs(2), gateway_task).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("gateway task ended abnormally: {e}"),
        Err(_) => warn!("gateway task did not stop in time"),
    }
    reader.abort();

    if let Err(e) = &served {
        warn!("WebSocket server stopped with error: {e:#}");
    }
    info!("Z21 WebSocket bridge stopped");
    served
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_arguments_leaves_everything_unset() {
        // Arrange / Act
        let cli = Cli::try_parse_from(["z21-web-bridge"]).expect("parses");

        // Assert
        assert!(cli.ws_port.is_none());
        assert!(cli.z21_host.is_none());
        assert!(cli.echo_raw_frames.is_none());
    }

    #[test]
    fn test_defaults_match_bridge_config_default() {
        // Arrange
        let cli = Cli::default();

        // Act
        let config = cli.into_bridge_config(FileConfig::default()).expect("valid");

        // Assert
        assert_eq!(config.ws_bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.z21_addr.to_string(), "192.168.0.111:21105");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.broadcast_flags, 1);
        assert!(config.stop_on_disconnect);
    }

    #[test]
    fn test_cli_overrides_parse() {
        let cli = Cli::try_parse_from([
            "z21-web-bridge",
            "--ws-port",
            "9000",
            "--z21-host",
            "10.0.0.5",
            "--z21-port",
            "21106",
            "--throttle-ms",
            "20",
        ])
        .expect("parses");

        let config = cli.into_bridge_config(FileConfig::default()).expect("valid");

        assert_eq!(config.ws_bind_addr.port(), 9000);
        assert_eq!(config.z21_addr.to_string(), "10.0.0.5:21106");
        assert_eq!(config.drive_throttle_window, Duration::from_millis(20));
    }

    #[test]
    fn test_echo_flag_without_value_means_true() {
        let cli = Cli::try_parse_from(["z21-web-bridge", "--echo-raw-frames"]).expect("parses");
        assert_eq!(cli.echo_raw_frames, Some(true));
    }

    #[test]
    fn test_stop_on_disconnect_can_be_disabled() {
        let cli = Cli::try_parse_from(["z21-web-bridge", "--stop-on-disconnect", "false"]).expect("parses");
        let config = cli.into_bridge_config(FileConfig::default()).expect("valid");
        assert!(!config.stop_on_disconnect);
    }

    #[test]
    fn test_broadcast_flags_accept_hex_and_decimal() {
        assert_eq!(parse_flags("0x00010001"), Ok(0x0001_0001));
        assert_eq!(parse_flags("257"), Ok(257));
        assert!(parse_flags("0xZZ").is_err());
    }

    #[test]
    fn test_file_values_apply_below_cli() {
        // Arrange
        let file = FileConfig::parse(
            r#"
            ws_port = 7000
            z21_host = "192.168.1.50"
            heartbeat_secs = 30
            "#,
        )
        .expect("valid toml");
        let cli = Cli::try_parse_from(["z21-web-bridge", "--ws-port", "7001"]).expect("parses");

        // Act
        let config = cli.into_bridge_config(file).expect("valid");

        // Assert: CLI wins, file fills the rest
        assert_eq!(config.ws_bind_addr.port(), 7001);
        assert_eq!(config.z21_addr.ip().to_string(), "192.168.1.50");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_info_retry_window_is_configurable() {
        // Arrange
        let file = || FileConfig::parse("info_retry_ms = 2500").expect("valid toml");
        let cli = Cli::try_parse_from(["z21-web-bridge", "--info-retry-ms", "400"]).expect("parses");

        // Act
        let from_file = Cli::default().into_bridge_config(file()).expect("valid");
        let from_cli = cli.into_bridge_config(file()).expect("valid");
        let default = Cli::default().into_bridge_config(FileConfig::default()).expect("valid");

        // Assert
        assert_eq!(from_file.info_retry_window, Duration::from_millis(2500));
        assert_eq!(from_cli.info_retry_window, Duration::from_millis(400));
        assert_eq!(default.info_retry_window, Duration::from_millis(1000));
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        assert!(FileConfig::parse("master_port = 1").is_err());
    }

    #[test]
    fn test_invalid_z21_host_returns_error() {
        // Arrange
        let cli = Cli { z21_host: Some("not.an.ip".to_string()), ..Cli::default() };

        // Act
        let result = cli.into_bridge_config(FileConfig::default());

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_ws_bind_returns_error() {
        let cli = Cli { ws_bind: Some("localhost".to_string()), ..Cli::default() };
        assert!(cli.into_bridge_config(FileConfig::default()).is_err());
    }

    #[test]
    fn test_turnout_pulse_out_of_range_returns_error() {
        let cli = Cli { turnout_pulse_ms: Some(0), ..Cli::default() };
        assert!(cli.into_bridge_config(FileConfig::default()).is_err());

        let cli = Cli { turnout_pulse_ms: Some(20_000), ..Cli::default() };
        assert!(cli.into_bridge_config(FileConfig::default()).is_err());
    }
}
