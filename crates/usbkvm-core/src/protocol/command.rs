//! Command and reply types passed through the dispatcher queue.
//!
//! A [`Command`] is an immutable request with its payload already copied out
//! of the live input buffers.  Every command that reaches the dispatcher
//! produces exactly one [`CommandReply`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::indicator::IndicatorReport;
use crate::domain::keyboard::KeyboardSnapshot;
use crate::domain::mouse::MouseSnapshot;

/// Which held inputs a release command lets go of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseTarget {
    Keyboard,
    Mouse,
    All,
    /// Same effect as [`ReleaseTarget::All`]; kept as a distinct name for
    /// callers that do not care which device is affected.
    Any,
}

impl ReleaseTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseTarget::Keyboard => "keyboard",
            ReleaseTarget::Mouse => "mouse",
            ReleaseTarget::All => "all",
            ReleaseTarget::Any => "any",
        }
    }

    pub fn includes_keyboard(self) -> bool {
        !matches!(self, ReleaseTarget::Mouse)
    }

    pub fn includes_mouse(self) -> bool {
        !matches!(self, ReleaseTarget::Keyboard)
    }
}

impl fmt::Display for ReleaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown release target: {0:?} (expected keyboard, mouse, all or any)")]
pub struct ParseReleaseTargetError(pub String);

impl FromStr for ReleaseTarget {
    type Err = ParseReleaseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyboard" => Ok(ReleaseTarget::Keyboard),
            "mouse" => Ok(ReleaseTarget::Mouse),
            "all" => Ok(ReleaseTarget::All),
            "any" => Ok(ReleaseTarget::Any),
            _ => Err(ParseReleaseTargetError(s.to_string())),
        }
    }
}

/// How mouse reports position the remote pointer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerMode {
    #[default]
    Absolute,
    Relative,
}

impl PointerMode {
    /// Builds the write command matching this mode.
    pub fn write_command(self, snapshot: MouseSnapshot) -> Command {
        match self {
            PointerMode::Absolute => Command::MouseAbsoluteWrite(snapshot),
            PointerMode::Relative => Command::MouseRelativeWrite(snapshot),
        }
    }
}

/// The closed set of command names, plus a sentinel for anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandName {
    DeviceOpen,
    DeviceClose,
    DeviceCheck,
    DeviceRelease,
    DeviceReset,
    DeviceInfo,
    KeyboardRead,
    KeyboardWrite,
    MouseAbsoluteWrite,
    MouseRelativeWrite,
    Unknown,
}

impl CommandName {
    pub const ALL: [CommandName; 10] = [
        CommandName::DeviceOpen,
        CommandName::DeviceClose,
        CommandName::DeviceCheck,
        CommandName::DeviceRelease,
        CommandName::DeviceReset,
        CommandName::DeviceInfo,
        CommandName::KeyboardRead,
        CommandName::KeyboardWrite,
        CommandName::MouseAbsoluteWrite,
        CommandName::MouseRelativeWrite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::DeviceOpen => "device_open",
            CommandName::DeviceClose => "device_close",
            CommandName::DeviceCheck => "device_check",
            CommandName::DeviceRelease => "device_release",
            CommandName::DeviceReset => "device_reset",
            CommandName::DeviceInfo => "device_info",
            CommandName::KeyboardRead => "keyboard_read",
            CommandName::KeyboardWrite => "keyboard_write",
            CommandName::MouseAbsoluteWrite => "mouse_absolute_write",
            CommandName::MouseRelativeWrite => "mouse_relative_write",
            CommandName::Unknown => "unknown",
        }
    }

    /// Looks up a wire name; unrecognized names yield [`CommandName::Unknown`].
    pub fn parse(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == name)
            .unwrap_or(CommandName::Unknown)
    }

    /// Commands that need a live connection to do anything.  Open, close and
    /// the health check run regardless.
    pub fn requires_connection(self) -> bool {
        !matches!(
            self,
            CommandName::DeviceOpen
                | CommandName::DeviceClose
                | CommandName::DeviceCheck
                | CommandName::Unknown
        )
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request for the dispatcher, payload included.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    DeviceOpen,
    DeviceClose,
    DeviceCheck,
    DeviceRelease(ReleaseTarget),
    DeviceReset,
    DeviceInfo,
    KeyboardRead,
    KeyboardWrite(KeyboardSnapshot),
    MouseAbsoluteWrite(MouseSnapshot),
    MouseRelativeWrite(MouseSnapshot),
    /// A raw submission whose name did not match any known command.
    Unrecognized(String),
}

impl Command {
    pub fn name(&self) -> CommandName {
        match self {
            Command::DeviceOpen => CommandName::DeviceOpen,
            Command::DeviceClose => CommandName::DeviceClose,
            Command::DeviceCheck => CommandName::DeviceCheck,
            Command::DeviceRelease(_) => CommandName::DeviceRelease,
            Command::DeviceReset => CommandName::DeviceReset,
            Command::DeviceInfo => CommandName::DeviceInfo,
            Command::KeyboardRead => CommandName::KeyboardRead,
            Command::KeyboardWrite(_) => CommandName::KeyboardWrite,
            Command::MouseAbsoluteWrite(_) => CommandName::MouseAbsoluteWrite,
            Command::MouseRelativeWrite(_) => CommandName::MouseRelativeWrite,
            Command::Unrecognized(_) => CommandName::Unknown,
        }
    }

    /// Builds a command from its wire name and an optional text argument.
    ///
    /// `device_release` reads its target from `arg` (default `all`); a bad
    /// target turns the whole command into [`Command::Unrecognized`].  The
    /// write commands carry an all-released snapshot, which lets go of every
    /// key or button on the chip.
    pub fn from_raw(name: &str, arg: Option<&str>) -> Command {
        match CommandName::parse(name) {
            CommandName::DeviceOpen => Command::DeviceOpen,
            CommandName::DeviceClose => Command::DeviceClose,
            CommandName::DeviceCheck => Command::DeviceCheck,
            CommandName::DeviceRelease => {
                let target = arg
                    .map(str::parse::<ReleaseTarget>)
                    .unwrap_or(Ok(ReleaseTarget::All));
                match target {
                    Ok(target) => Command::DeviceRelease(target),
                    Err(_) => Command::Unrecognized(format!("{name} {}", arg.unwrap_or_default())),
                }
            }
            CommandName::DeviceReset => Command::DeviceReset,
            CommandName::DeviceInfo => Command::DeviceInfo,
            CommandName::KeyboardRead => Command::KeyboardRead,
            CommandName::KeyboardWrite => Command::KeyboardWrite(KeyboardSnapshot::empty()),
            CommandName::MouseAbsoluteWrite => {
                Command::MouseAbsoluteWrite(MouseSnapshot::released())
            }
            CommandName::MouseRelativeWrite => {
                Command::MouseRelativeWrite(MouseSnapshot::released())
            }
            CommandName::Unknown => Command::Unrecognized(name.to_string()),
        }
    }
}

/// Outcome class of a command, with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Success,
    Failure,
    Unavailable,
    UnknownCommand,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Failure => 1,
            Status::Unavailable => 2,
            Status::UnknownCommand => 3,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

/// Command-specific reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplyData {
    None,
    Flag(bool),
    Indicators(IndicatorReport),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub command: CommandName,
    pub status: Status,
    pub data: ReplyData,
}

impl CommandReply {
    pub fn new(command: CommandName, status: Status, data: ReplyData) -> Self {
        Self {
            command,
            status,
            data,
        }
    }

    pub fn success(command: CommandName, data: ReplyData) -> Self {
        Self::new(command, Status::Success, data)
    }

    pub fn failure(command: CommandName, data: ReplyData) -> Self {
        Self::new(command, Status::Failure, data)
    }

    pub fn unavailable(command: CommandName) -> Self {
        Self::new(command, Status::Unavailable, ReplyData::None)
    }

    pub fn unknown_command() -> Self {
        Self::new(CommandName::Unknown, Status::UnknownCommand, ReplyData::None)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The boolean carried by `Flag` replies, `false` for anything else.
    pub fn flag(&self) -> bool {
        matches!(self.data, ReplyData::Flag(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_round_trip() {
        for name in CommandName::ALL {
            assert_eq!(CommandName::parse(name.as_str()), name);
        }
        assert_eq!(CommandName::parse("device_explode"), CommandName::Unknown);
    }

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::Failure.code(), 1);
        assert_eq!(Status::Unavailable.code(), 2);
        assert_eq!(Status::UnknownCommand.code(), 3);
    }

    #[test]
    fn test_release_target_parses_case_insensitively() {
        assert_eq!("Keyboard".parse::<ReleaseTarget>(), Ok(ReleaseTarget::Keyboard));
        assert_eq!(" any ".parse::<ReleaseTarget>(), Ok(ReleaseTarget::Any));
        assert!("printer".parse::<ReleaseTarget>().is_err());
    }

    #[test]
    fn test_release_target_coverage() {
        assert!(ReleaseTarget::Keyboard.includes_keyboard());
        assert!(!ReleaseTarget::Keyboard.includes_mouse());
        assert!(!ReleaseTarget::Mouse.includes_keyboard());
        assert!(ReleaseTarget::All.includes_mouse() && ReleaseTarget::All.includes_keyboard());
        assert!(ReleaseTarget::Any.includes_mouse() && ReleaseTarget::Any.includes_keyboard());
    }

    #[test]
    fn test_from_raw_builds_release_with_target() {
        assert_eq!(
            Command::from_raw("device_release", Some("mouse")),
            Command::DeviceRelease(ReleaseTarget::Mouse)
        );
        assert_eq!(
            Command::from_raw("device_release", None),
            Command::DeviceRelease(ReleaseTarget::All)
        );
        assert_eq!(
            Command::from_raw("device_release", Some("nope")).name(),
            CommandName::Unknown
        );
    }

    #[test]
    fn test_from_raw_unknown_name_is_unrecognized() {
        let command = Command::from_raw("warp_drive", None);
        assert_eq!(command, Command::Unrecognized("warp_drive".to_string()));
        assert_eq!(command.name(), CommandName::Unknown);
    }

    #[test]
    fn test_pointer_mode_selects_write_command() {
        let snapshot = MouseSnapshot::released();
        assert_eq!(
            PointerMode::Absolute.write_command(snapshot).name(),
            CommandName::MouseAbsoluteWrite
        );
        assert_eq!(
            PointerMode::Relative.write_command(snapshot).name(),
            CommandName::MouseRelativeWrite
        );
    }

    #[test]
    fn test_requires_connection() {
        assert!(!CommandName::DeviceOpen.requires_connection());
        assert!(!CommandName::DeviceClose.requires_connection());
        assert!(!CommandName::DeviceCheck.requires_connection());
        assert!(CommandName::KeyboardWrite.requires_connection());
        assert!(CommandName::DeviceReset.requires_connection());
    }
}
