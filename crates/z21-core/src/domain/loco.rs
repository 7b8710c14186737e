//! Locomotive domain types.
//!
//! # Speed encoding
//!
//! DCC decoders run in one of three speed-step modes.  The wire carries the
//! speed as a 7-bit value where `0` is stop, `1` is emergency stop and any
//! other value `N` is speed step `N - 1`.  [`LocoSpeed`] models that directly
//! so neither the decoder nor the encoder has to special-case the two
//! reserved values.

use serde::{Deserialize, Serialize};

/// Lowest valid DCC locomotive address.
pub const MIN_LOCO_ADDRESS: u16 = 1;

/// Highest locomotive address the command station accepts.
pub const MAX_LOCO_ADDRESS: u16 = 9999;

/// Highest function index carried in a loco-info answer (F0–F31).
pub const MAX_FUNCTION: u8 = 31;

/// Number of function slots tracked per locomotive.
pub const FUNCTION_COUNT: usize = MAX_FUNCTION as usize + 1;

/// Travel direction of a locomotive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Speed-step mode of a locomotive decoder.
///
/// Serialized as the plain step count (`14`, `28`, `128`) so browser code can
/// use it as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum SpeedSteps {
    Steps14,
    Steps28,
    #[default]
    Steps128,
}

impl SpeedSteps {
    /// Maps the 3-bit code from a loco-info answer to a step mode.
    ///
    /// `0` is 14 steps, `2` is 28 steps, everything else is 128 steps.
    pub fn from_info_code(code: u8) -> Self {
        match code {
            0 => SpeedSteps::Steps14,
            2 => SpeedSteps::Steps28,
            _ => SpeedSteps::Steps128,
        }
    }

    /// The code used in the loco-info answer.
    pub fn info_code(self) -> u8 {
        match self {
            SpeedSteps::Steps14 => 0,
            SpeedSteps::Steps28 => 2,
            SpeedSteps::Steps128 => 4,
        }
    }

    /// The low nibble of the `0x1S` drive sub-command.
    pub fn drive_code(self) -> u8 {
        match self {
            SpeedSteps::Steps14 => 0,
            SpeedSteps::Steps28 => 2,
            SpeedSteps::Steps128 => 3,
        }
    }

    /// Inverse of [`drive_code`](Self::drive_code).
    pub fn from_drive_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SpeedSteps::Steps14),
            2 => Some(SpeedSteps::Steps28),
            3 => Some(SpeedSteps::Steps128),
            _ => None,
        }
    }

    /// Highest drivable step in this mode.
    pub fn max_step(self) -> u8 {
        match self {
            SpeedSteps::Steps14 => 14,
            SpeedSteps::Steps28 => 28,
            SpeedSteps::Steps128 => 126,
        }
    }
}

impl From<SpeedSteps> for u8 {
    fn from(steps: SpeedSteps) -> u8 {
        match steps {
            SpeedSteps::Steps14 => 14,
            SpeedSteps::Steps28 => 28,
            SpeedSteps::Steps128 => 128,
        }
    }
}

impl TryFrom<u8> for SpeedSteps {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            14 => Ok(SpeedSteps::Steps14),
            28 => Ok(SpeedSteps::Steps28),
            128 => Ok(SpeedSteps::Steps128),
            other => Err(format!("unsupported speed-step mode: {other}")),
        }
    }
}

/// Speed of a locomotive as carried in the low 7 bits of the speed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocoSpeed {
    #[default]
    Stop,
    EmergencyStop,
    /// Drivable step, `1..=steps.max_step()`.
    Step(u8),
}

impl LocoSpeed {
    /// Decodes the low 7 bits of a speed byte.
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x7F {
            0 => LocoSpeed::Stop,
            1 => LocoSpeed::EmergencyStop,
            n => LocoSpeed::Step(n - 1),
        }
    }

    /// Encodes to the low 7 bits of a speed byte.
    ///
    /// `Step(0)` has no wire form of its own and encodes as stop.
    pub fn to_raw(self) -> u8 {
        match self {
            LocoSpeed::Stop | LocoSpeed::Step(0) => 0,
            LocoSpeed::EmergencyStop => 1,
            LocoSpeed::Step(n) => (n + 1) & 0x7F,
        }
    }

    /// Converts a throttle fraction in `0.0..=1.0` to a step.
    ///
    /// Values are clamped; anything that rounds to step 0 becomes `Stop`.
    pub fn from_fraction(fraction: f64, steps: SpeedSteps) -> Self {
        let max = steps.max_step();
        let step = (fraction.clamp(0.0, 1.0) * f64::from(max)).round() as u8;
        if step == 0 {
            LocoSpeed::Stop
        } else {
            LocoSpeed::Step(step.min(max))
        }
    }

    /// The step number, with stop and emergency stop both reading as 0.
    pub fn step(self) -> u8 {
        match self {
            LocoSpeed::Step(n) => n,
            LocoSpeed::Stop | LocoSpeed::EmergencyStop => 0,
        }
    }

    /// Speed as a fraction of full throttle for the given step mode.
    pub fn fraction(self, steps: SpeedSteps) -> f64 {
        f64::from(self.step().min(steps.max_step())) / f64::from(steps.max_step())
    }

    pub fn is_emergency_stop(self) -> bool {
        matches!(self, LocoSpeed::EmergencyStop)
    }
}

/// What to do with a locomotive function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionAction {
    Off,
    On,
    Toggle,
}

impl FunctionAction {
    /// The two `TT` bits of the function sub-command.
    pub fn wire_code(self) -> u8 {
        match self {
            FunctionAction::Off => 0b00,
            FunctionAction::On => 0b01,
            FunctionAction::Toggle => 0b10,
        }
    }

    pub fn from_wire_code(code: u8) -> Option<Self> {
        match code {
            0b00 => Some(FunctionAction::Off),
            0b01 => Some(FunctionAction::On),
            0b10 => Some(FunctionAction::Toggle),
            _ => None,
        }
    }
}

/// Known states of functions F0–F31.
///
/// A slot is `None` when the command station has not told us about it, which
/// is different from `Some(false)`.  Short loco-info answers from older
/// firmware leave the upper slots unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionStates([Option<bool>; FUNCTION_COUNT]);

impl FunctionStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of function `index`, or `None` when unknown or out of range.
    pub fn get(&self, index: u8) -> Option<bool> {
        self.0.get(usize::from(index)).copied().flatten()
    }

    /// Records the state of function `index`; out-of-range indices are ignored.
    pub fn set(&mut self, index: u8, on: bool) {
        if let Some(slot) = self.0.get_mut(usize::from(index)) {
            *slot = Some(on);
        }
    }

    /// Applies a client-side action to the cached state.
    ///
    /// Toggling an unknown function assumes it was off.
    pub fn apply(&mut self, index: u8, action: FunctionAction) {
        let next = match action {
            FunctionAction::On => true,
            FunctionAction::Off => false,
            FunctionAction::Toggle => !self.get(index).unwrap_or(false),
        };
        self.set(index, next);
    }

    /// Iterates over the functions whose state is known.
    pub fn known(&self) -> impl Iterator<Item = (u8, bool)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|on| (i as u8, on)))
    }

    /// Overwrites every slot that `other` knows about.
    pub fn merge(&mut self, other: &FunctionStates) {
        for (index, on) in other.known() {
            self.set(index, on);
        }
    }
}

/// Decoded loco-info answer (`LAN_X_LOCO_INFO`).
#[derive(Debug, Clone, PartialEq)]
pub struct LocoInfo {
    pub address: u16,
    pub speed_steps: SpeedSteps,
    /// Controlled by another handheld or PC.
    pub occupied: bool,
    /// Märklin-Motorola decoder rather than DCC.
    pub mm: bool,
    pub direction: Direction,
    pub speed: LocoSpeed,
    /// `None` when the answer was too short to carry the flag.
    pub double_traction: Option<bool>,
    pub smart_search: Option<bool>,
    pub functions: FunctionStates,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_raw_zero_is_stop_and_one_is_emergency_stop() {
        assert_eq!(LocoSpeed::from_raw(0), LocoSpeed::Stop);
        assert_eq!(LocoSpeed::from_raw(1), LocoSpeed::EmergencyStop);
    }

    #[test]
    fn test_speed_raw_n_is_step_n_minus_one() {
        assert_eq!(LocoSpeed::from_raw(2), LocoSpeed::Step(1));
        assert_eq!(LocoSpeed::from_raw(127), LocoSpeed::Step(126));
        // The direction bit must be ignored
        assert_eq!(LocoSpeed::from_raw(0x80 | 10), LocoSpeed::Step(9));
    }

    #[test]
    fn test_speed_to_raw_inverts_from_raw() {
        for raw in 0u8..=127 {
            assert_eq!(LocoSpeed::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn test_fraction_zero_is_stop() {
        assert_eq!(LocoSpeed::from_fraction(0.0, SpeedSteps::Steps128), LocoSpeed::Stop);
    }

    #[test]
    fn test_fraction_one_is_max_step() {
        assert_eq!(LocoSpeed::from_fraction(1.0, SpeedSteps::Steps128), LocoSpeed::Step(126));
        assert_eq!(LocoSpeed::from_fraction(1.0, SpeedSteps::Steps28), LocoSpeed::Step(28));
        assert_eq!(LocoSpeed::from_fraction(1.0, SpeedSteps::Steps14), LocoSpeed::Step(14));
    }

    #[test]
    fn test_fraction_is_clamped() {
        assert_eq!(LocoSpeed::from_fraction(7.5, SpeedSteps::Steps14), LocoSpeed::Step(14));
        assert_eq!(LocoSpeed::from_fraction(-1.0, SpeedSteps::Steps14), LocoSpeed::Stop);
    }

    #[test]
    fn test_speed_steps_info_code_mapping() {
        assert_eq!(SpeedSteps::from_info_code(0), SpeedSteps::Steps14);
        assert_eq!(SpeedSteps::from_info_code(2), SpeedSteps::Steps28);
        assert_eq!(SpeedSteps::from_info_code(4), SpeedSteps::Steps128);
        assert_eq!(SpeedSteps::from_info_code(7), SpeedSteps::Steps128);
    }

    #[test]
    fn test_speed_steps_number_conversion() {
        assert_eq!(u8::from(SpeedSteps::Steps28), 28);
        assert_eq!(SpeedSteps::try_from(128), Ok(SpeedSteps::Steps128));
        assert!(SpeedSteps::try_from(27).is_err());
    }

    #[test]
    fn test_function_states_distinguish_unknown_from_off() {
        let mut fns = FunctionStates::new();
        fns.set(3, false);
        assert_eq!(fns.get(3), Some(false));
        assert_eq!(fns.get(4), None);
        assert_eq!(fns.get(200), None);
    }

    #[test]
    fn test_function_toggle_of_unknown_turns_it_on() {
        let mut fns = FunctionStates::new();
        fns.apply(0, FunctionAction::Toggle);
        assert_eq!(fns.get(0), Some(true));
        fns.apply(0, FunctionAction::Toggle);
        assert_eq!(fns.get(0), Some(false));
    }

    #[test]
    fn test_merge_keeps_slots_other_does_not_know() {
        let mut cached = FunctionStates::new();
        cached.set(20, true);
        let mut fresh = FunctionStates::new();
        fresh.set(0, true);
        cached.merge(&fresh);
        assert_eq!(cached.get(0), Some(true));
        assert_eq!(cached.get(20), Some(true));
        assert_eq!(cached.known().count(), 2);
    }
}
