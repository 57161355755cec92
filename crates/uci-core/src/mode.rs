//! Working mode of the process.
//!
//! Exactly one mode is active for the life of the process. It is recorded
//! once at startup with [`set_working_mode`]; workers also receive it as an
//! argument.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UciError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Single process: receives, queues and runs checks itself.
    Local,
    /// Receives and queues checks for workers.
    Server,
    /// Pulls checks from a server and runs them.
    Worker,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Local, Mode::Server, Mode::Worker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Local => "local",
            Mode::Server => "server",
            Mode::Worker => "worker",
        }
    }

    /// Local and Server own a message queue; Worker does not.
    pub fn uses_message_queue(&self) -> bool {
        matches!(self, Mode::Local | Mode::Server)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UciError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Mode::Local),
            "server" => Ok(Mode::Server),
            "worker" => Ok(Mode::Worker),
            other => Err(UciError::UnknownMode(other.to_string())),
        }
    }
}

static WORKING_MODE: OnceLock<Mode> = OnceLock::new();

/// Record the process-wide mode. Fails if a mode was already recorded.
pub fn set_working_mode(mode: Mode) -> Result<()> {
    WORKING_MODE
        .set(mode)
        .map_err(|_| UciError::ModeAlreadySet(*WORKING_MODE.get().unwrap_or(&mode)))
}

/// The process-wide mode, if startup recorded one.
pub fn working_mode() -> Option<Mode> {
    WORKING_MODE.get().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!("local".parse::<Mode>().unwrap(), Mode::Local);
        assert_eq!("server".parse::<Mode>().unwrap(), Mode::Server);
        assert_eq!("worker".parse::<Mode>().unwrap(), Mode::Worker);
    }

    #[test]
    fn test_unknown_token_rejected() {
        for bad in ["", "Local", "cluster", "local "] {
            let err = bad.parse::<Mode>().unwrap_err();
            assert!(matches!(err, UciError::UnknownMode(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_display_round_trips() {
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_queue_ownership() {
        assert!(Mode::Local.uses_message_queue());
        assert!(Mode::Server.uses_message_queue());
        assert!(!Mode::Worker.uses_message_queue());
    }

    #[test]
    fn test_working_mode_is_write_once() {
        set_working_mode(Mode::Server).unwrap();
        assert_eq!(working_mode(), Some(Mode::Server));
        let err = set_working_mode(Mode::Local).unwrap_err();
        assert!(matches!(err, UciError::ModeAlreadySet(Mode::Server)));
        assert_eq!(working_mode(), Some(Mode::Server));
    }
}
