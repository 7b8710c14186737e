//! System-state snapshot (`LAN_SYSTEMSTATE_DATACHANGED`).
//!
//! ```text
//! offset  size  field
//!      0     2  main track current, mA (i16)
//!      2     2  programming track current, mA (i16)
//!      4     2  filtered main current, mA (i16)
//!      6     2  internal temperature, °C (i16)
//!      8     2  supply voltage, mV (u16)
//!     10     2  VCC (track) voltage, mV (u16)
//!     12     1  central state
//!     13     1  extended central state
//!     14     1  reserved
//!     15     1  capabilities
//! ```

use serde::{Deserialize, Serialize};

pub const SYSTEM_STATE_LEN: usize = 16;

// Central state bits (byte 12)
pub const CS_EMERGENCY_STOP: u8 = 0x01;
pub const CS_TRACK_VOLTAGE_OFF: u8 = 0x02;
pub const CS_SHORT_CIRCUIT: u8 = 0x04;
pub const CS_PROGRAMMING_MODE: u8 = 0x20;

// Extended central state bits (byte 13)
pub const CSE_HIGH_TEMPERATURE: u8 = 0x01;
pub const CSE_POWER_LOST: u8 = 0x02;
pub const CSE_SHORT_CIRCUIT_EXTERNAL: u8 = 0x04;
pub const CSE_SHORT_CIRCUIT_INTERNAL: u8 = 0x08;

// Capability bits (byte 15)
pub const CAP_DCC: u8 = 0x01;
pub const CAP_MM: u8 = 0x02;
pub const CAP_RAILCOM: u8 = 0x08;
pub const CAP_LOCO_CMDS: u8 = 0x10;
pub const CAP_ACCESSORY_CMDS: u8 = 0x20;
pub const CAP_DETECTOR_CMDS: u8 = 0x40;
pub const CAP_NEEDS_UNLOCK_CODE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub main_current_ma: i16,
    pub prog_current_ma: i16,
    pub filtered_main_current_ma: i16,
    pub temperature_c: i16,
    pub supply_voltage_mv: u16,
    pub vcc_voltage_mv: u16,
    pub central_state: u8,
    pub central_state_ex: u8,
    pub capabilities: u8,
}

impl SystemState {
    pub fn from_bytes(raw: &[u8; SYSTEM_STATE_LEN]) -> Self {
        let i16_at = |o: usize| i16::from_le_bytes([raw[o], raw[o + 1]]);
        let u16_at = |o: usize| u16::from_le_bytes([raw[o], raw[o + 1]]);
        Self {
            main_current_ma: i16_at(0),
            prog_current_ma: i16_at(2),
            filtered_main_current_ma: i16_at(4),
            temperature_c: i16_at(6),
            supply_voltage_mv: u16_at(8),
            vcc_voltage_mv: u16_at(10),
            central_state: raw[12],
            central_state_ex: raw[13],
            capabilities: raw[15],
        }
    }

    pub fn to_bytes(&self) -> [u8; SYSTEM_STATE_LEN] {
        let mut raw = [0u8; SYSTEM_STATE_LEN];
        raw[0..2].copy_from_slice(&self.main_current_ma.to_le_bytes());
        raw[2..4].copy_from_slice(&self.prog_current_ma.to_le_bytes());
        raw[4..6].copy_from_slice(&self.filtered_main_current_ma.to_le_bytes());
        raw[6..8].copy_from_slice(&self.temperature_c.to_le_bytes());
        raw[8..10].copy_from_slice(&self.supply_voltage_mv.to_le_bytes());
        raw[10..12].copy_from_slice(&self.vcc_voltage_mv.to_le_bytes());
        raw[12] = self.central_state;
        raw[13] = self.central_state_ex;
        raw[15] = self.capabilities;
        raw
    }

    pub fn emergency_stop(&self) -> bool {
        self.central_state & CS_EMERGENCY_STOP != 0
    }

    pub fn track_voltage_off(&self) -> bool {
        self.central_state & CS_TRACK_VOLTAGE_OFF != 0
    }

    pub fn short_circuit(&self) -> bool {
        self.central_state & CS_SHORT_CIRCUIT != 0
    }

    pub fn programming_mode(&self) -> bool {
        self.central_state & CS_PROGRAMMING_MODE != 0
    }

    pub fn high_temperature(&self) -> bool {
        self.central_state_ex & CSE_HIGH_TEMPERATURE != 0
    }

    pub fn power_lost(&self) -> bool {
        self.central_state_ex & CSE_POWER_LOST != 0
    }

    pub fn has_capability(&self, mask: u8) -> bool {
        self.capabilities & mask == mask
    }

    /// Track power as the bridge reports it: on unless the voltage is off,
    /// emergency stop is active, or the track is shorted.
    pub fn track_power_on(&self) -> bool {
        !(self.track_voltage_off() || self.emergency_stop() || self.short_circuit())
    }
}
