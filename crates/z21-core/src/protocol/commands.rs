//! X-BUS command table and resolver.
//!
//! Every X-BUS message starts with an `xHeader` byte, and most follow it with a
//! sub-command byte `db0`.  The pair identifies the command.  A few commands
//! have no `db0` (`xHeader` alone is the key), the drive command encodes the
//! speed-step mode in the low nibble of `db0`, and `0x43` is shared between
//! the turnout-info query and its answer, told apart only by length.
//!
//! The table is static and scanned linearly; it is small enough that a map
//! would not pay for itself.

/// Named X-BUS command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKey {
    // Outbound requests
    GetXBusVersion,
    GetStatus,
    SetTrackPowerOff,
    SetTrackPowerOn,
    CvRead,
    CvWrite,
    GetTurnoutInfo,
    SetTurnout,
    SetStop,
    SetLocoEStop,
    GetLocoInfo,
    SetLocoDrive,
    SetLocoFunction,
    GetFirmwareVersion,

    // Inbound answers and broadcasts
    TurnoutInfo,
    BcTrackPowerOff,
    BcTrackPowerOn,
    BcProgrammingMode,
    BcTrackShortCircuit,
    CvNackShortCircuit,
    CvNack,
    UnknownCommand,
    StatusChanged,
    XBusVersion,
    CvResult,
    BcStopped,
    LocoInfo,
    FirmwareVersion,

    /// No table entry matched.
    Unknown,
}

/// How `db0` participates in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCommand {
    /// `xHeader` alone identifies the command.
    None,
    /// `db0` must equal this byte.
    Exact(u8),
    /// `db0 & mask == value`; the remaining bits carry data.
    Masked { mask: u8, value: u8 },
}

/// One row of the command table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub key: CommandKey,
    pub x_header: u8,
    pub db0: SubCommand,
}

impl CommandSpec {
    fn matches(&self, x_header: u8, data: &[u8]) -> bool {
        if self.x_header != x_header {
            return false;
        }
        match (self.db0, data.first()) {
            (SubCommand::None, _) => true,
            (SubCommand::Exact(b), Some(&db0)) => db0 == b,
            (SubCommand::Masked { mask, value }, Some(&db0)) => db0 & mask == value,
            (_, None) => false,
        }
    }

    /// Number of command-identifying bytes after `xHeader` (0 or 1).
    ///
    /// Masked sub-commands carry data in `db0`, so it is not stripped.
    pub fn sub_command_len(&self) -> usize {
        match self.db0 {
            SubCommand::Exact(_) => 1,
            SubCommand::None | SubCommand::Masked { .. } => 0,
        }
    }
}

const fn row(key: CommandKey, x_header: u8, db0: SubCommand) -> CommandSpec {
    CommandSpec { key, x_header, db0 }
}

/// `xHeader` shared by the turnout-info query and answer.
pub const X_TURNOUT_INFO: u8 = 0x43;

/// Ordered so that more specific rows win when headers overlap.
pub static COMMANDS: &[CommandSpec] = &[
    row(CommandKey::GetXBusVersion, 0x21, SubCommand::Exact(0x21)),
    row(CommandKey::GetStatus, 0x21, SubCommand::Exact(0x24)),
    row(CommandKey::SetTrackPowerOff, 0x21, SubCommand::Exact(0x80)),
    row(CommandKey::SetTrackPowerOn, 0x21, SubCommand::Exact(0x81)),
    row(CommandKey::CvRead, 0x23, SubCommand::Exact(0x11)),
    row(CommandKey::CvWrite, 0x24, SubCommand::Exact(0x12)),
    row(CommandKey::SetTurnout, 0x53, SubCommand::None),
    row(CommandKey::BcTrackPowerOff, 0x61, SubCommand::Exact(0x00)),
    row(CommandKey::BcTrackPowerOn, 0x61, SubCommand::Exact(0x01)),
    row(CommandKey::BcProgrammingMode, 0x61, SubCommand::Exact(0x02)),
    row(CommandKey::BcTrackShortCircuit, 0x61, SubCommand::Exact(0x08)),
    row(CommandKey::CvNackShortCircuit, 0x61, SubCommand::Exact(0x12)),
    row(CommandKey::CvNack, 0x61, SubCommand::Exact(0x13)),
    row(CommandKey::UnknownCommand, 0x61, SubCommand::Exact(0x82)),
    row(CommandKey::StatusChanged, 0x62, SubCommand::Exact(0x22)),
    row(CommandKey::XBusVersion, 0x63, SubCommand::Exact(0x21)),
    row(CommandKey::CvResult, 0x64, SubCommand::Exact(0x14)),
    row(CommandKey::SetStop, 0x80, SubCommand::None),
    row(CommandKey::BcStopped, 0x81, SubCommand::Exact(0x00)),
    row(CommandKey::SetLocoEStop, 0x92, SubCommand::None),
    row(CommandKey::GetLocoInfo, 0xE3, SubCommand::Exact(0xF0)),
    row(CommandKey::SetLocoFunction, 0xE4, SubCommand::Exact(0xF8)),
    row(CommandKey::SetLocoDrive, 0xE4, SubCommand::Masked { mask: 0xF0, value: 0x10 }),
    row(CommandKey::LocoInfo, 0xEF, SubCommand::None),
    row(CommandKey::GetFirmwareVersion, 0xF1, SubCommand::Exact(0x0A)),
    row(CommandKey::FirmwareVersion, 0xF3, SubCommand::Exact(0x0A)),
];

static GET_TURNOUT_INFO: CommandSpec =
    row(CommandKey::GetTurnoutInfo, X_TURNOUT_INFO, SubCommand::None);
static TURNOUT_INFO: CommandSpec = row(CommandKey::TurnoutInfo, X_TURNOUT_INFO, SubCommand::None);

/// Resolves an X-BUS message to its table row.
///
/// `data` is everything after `xHeader`, checksum excluded.
pub fn lookup(x_header: u8, data: &[u8]) -> Option<&'static CommandSpec> {
    if x_header == X_TURNOUT_INFO {
        // Query: 43 MSB LSB.  Answer: 43 MSB LSB ZZ.
        return Some(if data.len() <= 2 { &GET_TURNOUT_INFO } else { &TURNOUT_INFO });
    }
    COMMANDS.iter().find(|spec| spec.matches(x_header, data))
}

/// Resolves an X-BUS message to a [`CommandKey`], or [`CommandKey::Unknown`].
///
/// # Examples
///
/// ```rust
/// use z21_core::protocol::commands::{resolve_command, CommandKey};
///
/// assert_eq!(resolve_command(0x61, &[0x01]), CommandKey::BcTrackPowerOn);
/// assert_eq!(resolve_command(0x61, &[0x55]), CommandKey::Unknown);
/// ```
pub fn resolve_command(x_header: u8, data: &[u8]) -> CommandKey {
    lookup(x_header, data).map_or(CommandKey::Unknown, |spec| spec.key)
}

/// Table row for `key`, used by the encoders.
pub fn spec_for(key: CommandKey) -> Option<&'static CommandSpec> {
    match key {
        CommandKey::GetTurnoutInfo => Some(&GET_TURNOUT_INFO),
        CommandKey::TurnoutInfo => Some(&TURNOUT_INFO),
        _ => COMMANDS.iter().find(|spec| spec.key == key),
    }
}

/// Strips the sub-command byte (if the row has one) from `data`.
pub fn command_args(x_header: u8, data: &[u8]) -> &[u8] {
    let skip = lookup(x_header, data).map_or(0, CommandSpec::sub_command_len);
    &data[skip.min(data.len())..]
}
