//! The gateway: every state machine, wired together.
//!
//! [`Gateway`] owns the derived state (command-station info, track power, loco
//! cache) and each component that drives the wire.  It reacts to exactly four
//! kinds of input, each handled to completion before the next one starts:
//!
//! | Input                    | Handler                                  |
//! |--------------------------|------------------------------------------|
//! | inbound datagram         | [`Gateway::on_datagram`]                 |
//! | browser connected / gone | [`Gateway::on_client_connected`] / [`Gateway::on_client_disconnected`] |
//! | browser message          | [`Gateway::on_client_message`]           |
//! | timer fired              | [`Gateway::on_timer`]                    |
//!
//! Every handler borrows the outside world as [`Ports`] for its duration only.

use std::time::Duration;

use tracing::{debug, info, warn};
use z21_core::{
    decode_dataset, parse_datagram, CommandStationInfo, Event, LocoSpeed, Request, TrackPowerEvent,
    TurnoutState,
};

use super::bridge_service::{
    base64_encode, drive_command, loco_state_json, pulse_duration, translate_event, BridgeError,
};
use super::cv_programmer::{CvProgrammer, CvReply};
use super::loco_cache::{LocoCache, LocoState};
use super::ports::{send_request, Ports, TimerId, TimerKey};
use super::session::Session;
use super::station_info::{InfoKind, InfoOrchestrator};
use super::throttle::DriveThrottle;
use super::turnout_pulse::TurnoutPulser;
use crate::domain::{BridgeConfig, ClientId, ClientMsg, ServerMsg};

pub struct Gateway {
    turnout_pulse: Duration,
    stop_on_disconnect: bool,
    echo_raw_frames: bool,

    station: CommandStationInfo,
    track_power: Option<TrackPowerEvent>,
    locos: LocoCache,

    session: Session,
    info: InfoOrchestrator,
    cv: CvProgrammer,
    throttle: DriveThrottle,
    turnouts: TurnoutPulser,
}

impl Gateway {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            turnout_pulse: config.turnout_pulse,
            stop_on_disconnect: config.stop_on_disconnect,
            echo_raw_frames: config.echo_raw_frames,
            station: CommandStationInfo::new(),
            track_power: None,
            locos: LocoCache::new(),
            session: Session::new(config.broadcast_flags, config.heartbeat_interval),
            info: InfoOrchestrator::new(config.info_retry_window),
            cv: CvProgrammer::new(config.cv_timeout),
            throttle: DriveThrottle::new(config.drive_throttle_window),
            turnouts: TurnoutPulser::new(),
        }
    }

    pub fn station(&self) -> &CommandStationInfo {
        &self.station
    }

    pub fn locos(&self) -> &LocoCache {
        &self.locos
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn client_count(&self) -> usize {
        self.session.client_count()
    }

    // ── Inbound datagrams ─────────────────────────────────────────────────────

    pub fn on_datagram(&mut self, bytes: &[u8], ports: &mut Ports<'_>) {
        if self.echo_raw_frames {
            ports.clients.broadcast(&ServerMsg::RawFrame { data_base64: base64_encode(bytes) });
        }
        for dataset in parse_datagram(bytes) {
            let event = decode_dataset(&dataset);
            self.on_event(event, ports);
            if self.session.is_active() {
                self.poke(ports);
            }
        }
    }

    fn on_event(&mut self, event: Event, ports: &mut Ports<'_>) {
        debug!(?event, "← Z21");
        match &event {
            Event::FirmwareVersion(version) => {
                self.info.ack(InfoKind::Firmware);
                self.station.set_firmware_version(*version);
            }
            Event::XBusVersion(version) => {
                self.info.ack(InfoKind::XBusVersion);
                self.station.set_xbus_version(version.clone());
            }
            Event::HardwareInfo { hardware_type, firmware } => {
                self.info.ack(InfoKind::HardwareInfo);
                self.station.set_hardware_type(*hardware_type);
                self.station.set_firmware_version(*firmware);
            }
            Event::Code(code) => {
                self.info.ack(InfoKind::Code);
                self.station.set_code(*code);
            }
            Event::TrackPower(power) => self.track_power = Some(*power),
            Event::LocoInfo(loco) => {
                let state = self.locos.apply_info(loco);
                ports.clients.broadcast(&ServerMsg::LocoState(loco_state_json(state)));
                return;
            }
            Event::CvResult { .. } | Event::CvNack { .. } => {
                self.cv.on_event(&event, ports.wire, ports.timers);
                return;
            }
            Event::Stopped => {
                for address in self.locos.addresses() {
                    self.locos.entry(address).speed = LocoSpeed::EmergencyStop;
                }
            }
            Event::CommandRejected => warn!("command station rejected a command"),
            Event::Unknown { header, data } => debug!(header, len = data.len(), "unknown dataset"),
            _ => {}
        }
        if let Some(msg) = translate_event(&event) {
            ports.clients.broadcast(&msg);
        }
    }

    fn poke(&mut self, ports: &mut Ports<'_>) {
        let now = ports.timers.now_ms();
        if let Some(kind) = self.info.poke(&self.station, now, ports.wire) {
            debug!(?kind, "requested command-station info");
        }
    }

    // ── Client lifecycle ──────────────────────────────────────────────────────

    pub fn on_client_connected(&mut self, client: ClientId, ports: &mut Ports<'_>) {
        let first = self.session.client_connected();
        info!(%client, clients = self.session.client_count(), "client connected");
        if first && self.session.activate(ports.wire, ports.timers) {
            self.info.reset();
        }
        self.poke(ports);
    }

    /// The client is already gone from `ports.clients` when this runs, so
    /// broadcasts reach only the remaining ones.
    pub fn on_client_disconnected(&mut self, client: ClientId, ports: &mut Ports<'_>) {
        let last = self.session.client_disconnected();
        info!(%client, clients = self.session.client_count(), "client disconnected");

        if self.stop_on_disconnect && self.session.is_active() {
            self.stop_all_locos(ports);
        }
        if last && self.session.deactivate(ports.wire, ports.timers) {
            self.info.reset();
            self.station.reset();
            self.track_power = None;
        }
    }

    /// Sends a plain stop to every cached loco, bypassing the throttle.
    fn stop_all_locos(&mut self, ports: &mut Ports<'_>) {
        for address in self.locos.addresses() {
            self.throttle.cancel(address, ports.timers);
            let state = self.locos.entry(address);
            let stop = state.drive(LocoSpeed::Stop);
            if let Err(err) = send_request(ports.wire, &Request::SetLocoDrive(stop)) {
                warn!(address, %err, "safety stop not sent");
                continue;
            }
            let state = self.locos.apply_drive(&stop);
            ports.clients.broadcast(&ServerMsg::LocoState(loco_state_json(state)));
        }
        info!(locos = self.locos.len(), "safety stop after disconnect");
    }

    // ── Client messages ───────────────────────────────────────────────────────

    /// Handles one browser message.
    ///
    /// CV reads and writes return the pending reply; the caller forwards it to
    /// `client` once it completes.  Rejected requests are answered with
    /// [`ServerMsg::Error`] to `client` only.
    pub fn on_client_message(
        &mut self,
        client: ClientId,
        msg: ClientMsg,
        ports: &mut Ports<'_>,
    ) -> Option<CvReply> {
        match self.dispatch(client, msg, ports) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%client, %err, "request rejected");
                ports.clients.send_to(client, &ServerMsg::Error { message: err.to_string() });
                None
            }
        }
    }

    fn dispatch(
        &mut self,
        client: ClientId,
        msg: ClientMsg,
        ports: &mut Ports<'_>,
    ) -> Result<Option<CvReply>, BridgeError> {
        match msg {
            ClientMsg::Hello => {
                let ready = ServerMsg::SessionReady {
                    client_id: client,
                    station: self.station.clone(),
                    track_power: self.track_power,
                    locos: self.locos.iter().map(loco_state_json).collect(),
                };
                ports.clients.send_to(client, &ready);
            }
            ClientMsg::SetTrackPower { on } => send_request(ports.wire, &Request::SetTrackPower(on))?,
            ClientMsg::Drive { address, speed, step, speed_steps, direction } => {
                let cached = self.locos.get(address).copied().unwrap_or_else(|| LocoState::new(address));
                let command = drive_command(&cached, speed, step, speed_steps, direction)?;
                self.throttle.submit(command, ports.timers)?;
                let state = self.locos.apply_drive(&command);
                ports.clients.broadcast(&ServerMsg::LocoState(loco_state_json(state)));
            }
            ClientMsg::Function { address, function, action } => {
                send_request(ports.wire, &Request::SetLocoFunction { address, function, action })?;
                let state = self.locos.entry(address);
                state.functions.apply(function, action);
                ports.clients.broadcast(&ServerMsg::LocoState(loco_state_json(state)));
            }
            ClientMsg::EStop { address } => {
                self.throttle.cancel(address, ports.timers);
                send_request(ports.wire, &Request::SetLocoEStop { address })?;
                let state = self.locos.entry(address);
                state.speed = LocoSpeed::EmergencyStop;
                ports.clients.broadcast(&ServerMsg::LocoState(loco_state_json(state)));
            }
            ClientMsg::EStopAll => {
                self.throttle.cancel_all(ports.timers);
                send_request(ports.wire, &Request::SetStop)?;
            }
            ClientMsg::Turnout { address, state, pulse_ms } => {
                let pulse = pulse_duration(pulse_ms, self.turnout_pulse)?;
                self.turnouts.switch(address, state, pulse, ports.wire, ports.timers)?;
                ports.clients.broadcast(&ServerMsg::TurnoutState { address, state: TurnoutState::from(state) });
            }
            ClientMsg::CvRead { cv } => {
                info!(%client, cv, "CV read requested");
                return Ok(Some(self.cv.read(cv, ports.wire, ports.timers)?));
            }
            ClientMsg::CvWrite { cv, value } => {
                info!(%client, cv, value, "CV write requested");
                return Ok(Some(self.cv.write(cv, value, ports.wire, ports.timers)?));
            }
            ClientMsg::GetLocoInfo { address } => send_request(ports.wire, &Request::GetLocoInfo { address })?,
            ClientMsg::GetTurnoutInfo { address } => {
                send_request(ports.wire, &Request::GetTurnoutInfo { address })?
            }
            ClientMsg::GetStatus => send_request(ports.wire, &Request::GetStatus)?,
        }
        Ok(None)
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    pub fn on_timer(&mut self, id: TimerId, key: TimerKey, ports: &mut Ports<'_>) {
        match key {
            TimerKey::Heartbeat => self.session.on_heartbeat(id, ports.wire, ports.timers),
            TimerKey::CvTimeout => self.cv.on_timeout(id, ports.wire, ports.timers),
            TimerKey::Drive(address) => self.throttle.on_timer(address, id, ports.wire),
            TimerKey::TurnoutPulse(address) => self.turnouts.on_timer(address, id, ports.wire),
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Releases every turnout output, fails pending CV operations, and logs off
    /// the wire session if one is open.
    pub fn shutdown(&mut self, ports: &mut Ports<'_>) {
        self.throttle.cancel_all(ports.timers);
        self.turnouts.flush_all(ports.wire, ports.timers);
        self.cv.cancel_all(ports.timers);
        if self.session.deactivate(ports.wire, ports.timers) {
            self.info.reset();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
