//! Turnout (accessory decoder) types.

use serde::{Deserialize, Serialize};

/// Highest accessory address the command station accepts.
pub const MAX_ACCESSORY_ADDRESS: u16 = 16383;

/// Position a turnout can be commanded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnoutPosition {
    /// Output 1, `P = 0` in the set-turnout command.
    Through,
    /// Output 2, `P = 1`.
    Diverging,
}

impl TurnoutPosition {
    /// The `P` bit of the set-turnout command.
    pub fn output_bit(self) -> u8 {
        match self {
            TurnoutPosition::Through => 0,
            TurnoutPosition::Diverging => 1,
        }
    }

    pub fn from_output_bit(bit: u8) -> Self {
        if bit & 0x01 == 0 {
            TurnoutPosition::Through
        } else {
            TurnoutPosition::Diverging
        }
    }
}

/// Position reported by a turnout-info answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnoutState {
    Through,
    Diverging,
    /// Not switched since power-up, or an invalid `ZZ` code.
    Unknown,
}

impl TurnoutState {
    /// Decodes the 2-bit `ZZ` field.
    pub fn from_code(code: u8) -> Self {
        match code & 0x03 {
            1 => TurnoutState::Through,
            2 => TurnoutState::Diverging,
            _ => TurnoutState::Unknown,
        }
    }
}

impl From<TurnoutPosition> for TurnoutState {
    fn from(position: TurnoutPosition) -> Self {
        match position {
            TurnoutPosition::Through => TurnoutState::Through,
            TurnoutPosition::Diverging => TurnoutState::Diverging,
        }
    }
}
