//! What the bridge knows about the command station it is talking to.
//!
//! The record starts out empty and is filled in piece by piece as answers to
//! discovery requests arrive.  Each field goes from absent to present at most
//! once per wire session; [`CommandStationInfo::reset`] clears everything when
//! the session is torn down.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Firmware version, decoded from two BCD bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    /// First firmware that answers the hardware-info request.
    pub const HWINFO_MIN: FirmwareVersion = FirmwareVersion { major: 1, minor: 20 };

    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Decodes a pair of BCD bytes, e.g. `0x01 0x20` → 1.20.
    pub fn from_bcd(major: u8, minor: u8) -> Self {
        Self { major: bcd_to_u8(major), minor: bcd_to_u8(minor) }
    }

    /// Decodes the firmware word of the hardware-info answer (`0x0000_0120` → 1.20).
    pub fn from_bcd_word(word: u32) -> Self {
        Self::from_bcd(((word >> 8) & 0xFF) as u8, (word & 0xFF) as u8)
    }

    pub fn to_bcd(self) -> (u8, u8) {
        (u8_to_bcd(self.major), u8_to_bcd(self.minor))
    }

    pub fn supports_hardware_info(self) -> bool {
        self >= Self::HWINFO_MIN
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

pub(crate) fn bcd_to_u8(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

pub(crate) fn u8_to_bcd(value: u8) -> u8 {
    ((value / 10 % 10) << 4) | (value % 10)
}

/// Hardware variant reported by the hardware-info answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareType {
    Z21Old,
    Z21New,
    SmartRail,
    Z21Small,
    Z21Start,
    SingleBooster,
    DualBooster,
    Z21Xl,
    XlBooster,
    SwitchDecoder,
    SignalDecoder,
    Other(u32),
}

impl HardwareType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0200 => HardwareType::Z21Old,
            0x0201 => HardwareType::Z21New,
            0x0202 => HardwareType::SmartRail,
            0x0203 => HardwareType::Z21Small,
            0x0204 => HardwareType::Z21Start,
            0x0205 => HardwareType::SingleBooster,
            0x0206 => HardwareType::DualBooster,
            0x0211 => HardwareType::Z21Xl,
            0x0212 => HardwareType::XlBooster,
            0x0301 => HardwareType::SwitchDecoder,
            0x0302 => HardwareType::SignalDecoder,
            other => HardwareType::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            HardwareType::Z21Old => 0x0200,
            HardwareType::Z21New => 0x0201,
            HardwareType::SmartRail => 0x0202,
            HardwareType::Z21Small => 0x0203,
            HardwareType::Z21Start => 0x0204,
            HardwareType::SingleBooster => 0x0205,
            HardwareType::DualBooster => 0x0206,
            HardwareType::Z21Xl => 0x0211,
            HardwareType::XlBooster => 0x0212,
            HardwareType::SwitchDecoder => 0x0301,
            HardwareType::SignalDecoder => 0x0302,
            HardwareType::Other(code) => code,
        }
    }

    /// The starter-set stations can be feature-locked; ask them for their code.
    pub fn requires_code(self) -> bool {
        matches!(self, HardwareType::Z21Small | HardwareType::Z21Start)
    }
}

/// Feature-lock state of a z21 start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockCode {
    NoLock,
    StartLocked,
    StartUnlocked,
    Other(u8),
}

impl LockCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => LockCode::NoLock,
            1 => LockCode::StartLocked,
            2 => LockCode::StartUnlocked,
            other => LockCode::Other(other),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            LockCode::NoLock => 0,
            LockCode::StartLocked => 1,
            LockCode::StartUnlocked => 2,
            LockCode::Other(b) => b,
        }
    }
}

/// Legacy X-BUS version answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XBusVersion {
    /// `"V3.0"` style string, or `"Unknown"`.
    pub version: String,
    pub command_station_id: u8,
}

/// Discovered command-station capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStationInfo {
    pub firmware_version: Option<FirmwareVersion>,
    pub xbus_version: Option<XBusVersion>,
    pub hardware_type: Option<HardwareType>,
    pub code: Option<LockCode>,
}

impl CommandStationInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the firmware version; returns `false` if it was already known.
    pub fn set_firmware_version(&mut self, version: FirmwareVersion) -> bool {
        set_once(&mut self.firmware_version, version)
    }

    pub fn set_xbus_version(&mut self, version: XBusVersion) -> bool {
        set_once(&mut self.xbus_version, version)
    }

    pub fn set_hardware_type(&mut self, hardware_type: HardwareType) -> bool {
        set_once(&mut self.hardware_type, hardware_type)
    }

    pub fn set_code(&mut self, code: LockCode) -> bool {
        set_once(&mut self.code, code)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}
