//! Log severity levels.

use serde::{ Deserialize, Serialize };

/// Log severity, ordered from most to least verbose.
///
/// `Off` disables all output when used as a filter threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
    Off = 6,
}

impl Level {
    /// Full name, e.g. `"info"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Critical => "critical",
            Level::Off => "off",
        }
    }

    /// Fixed-width 4-character name used by the default formatter.
    pub const fn short_str(self) -> &'static str {
        match self {
            Level::Trace => "TRAC",
            Level::Debug => "DEBG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERRO",
            Level::Critical => "CRIT",
            Level::Off => "OFF ",
        }
    }

    /// Decode from the wire representation; unknown bytes map to `Info`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            5 => Level::Critical,
            6 => Level::Off,
            _ => Level::Info,
        }
    }

    /// Whether a record at this level passes a filter threshold.
    pub const fn enabled_at(self, threshold: Level) -> bool {
        (self as u8) >= (threshold as u8) && !matches!(self, Level::Off)
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Info
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
