//! Last known state of every locomotive the bridge has seen.

use std::collections::BTreeMap;

use z21_core::{Direction, DriveCommand, FunctionStates, LocoInfo, LocoSpeed, SpeedSteps};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocoState {
    pub address: u16,
    pub speed_steps: SpeedSteps,
    pub direction: Direction,
    pub speed: LocoSpeed,
    pub functions: FunctionStates,
}

impl LocoState {
    pub fn new(address: u16) -> Self {
        Self { address, ..Self::default() }
    }

    /// The drive command that would put the loco in this state with `speed`.
    pub fn drive(&self, speed: LocoSpeed) -> DriveCommand {
        DriveCommand { address: self.address, speed_steps: self.speed_steps, speed, direction: self.direction }
    }
}

/// Keyed by address, iterated in address order.
#[derive(Debug, Default)]
pub struct LocoCache {
    locos: BTreeMap<u16, LocoState>,
}

impl LocoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: u16) -> Option<&LocoState> {
        self.locos.get(&address)
    }

    /// The cached state, created with defaults on first use.
    pub fn entry(&mut self, address: u16) -> &mut LocoState {
        self.locos.entry(address).or_insert_with(|| LocoState::new(address))
    }

    /// Merges a loco-info answer.  Functions the answer does not carry keep
    /// their cached state.
    pub fn apply_info(&mut self, info: &LocoInfo) -> &LocoState {
        let state = self.entry(info.address);
        state.speed_steps = info.speed_steps;
        state.direction = info.direction;
        state.speed = info.speed;
        state.functions.merge(&info.functions);
        state
    }

    /// Records a drive command as if it had already taken effect.
    pub fn apply_drive(&mut self, drive: &DriveCommand) -> &LocoState {
        let state = self.entry(drive.address);
        state.speed_steps = drive.speed_steps;
        state.direction = drive.direction;
        state.speed = drive.speed;
        state
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocoState> {
        self.locos.values()
    }

    pub fn addresses(&self) -> Vec<u16> {
        self.locos.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.locos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locos.is_empty()
    }
}
