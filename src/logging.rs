//! Logging setup
//!
//! Library code logs through the `log` facade. Binaries call [`init_logging`]
//! once to route those records to stderr through `env_logger`.

use env_logger::Target;
use log::LevelFilter;

/// Log levels, ordered from silent to everything
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Nothing = 0,
    User = 1,
    Error = 2,
    Warning = 3,
    Info = 4,
    Debug = 5,
    All = 6,
}

impl LogLevel {
    /// Create a LogLevel from an integer
    pub fn from_i32(level: i32) -> Self {
        match level {
            0 => LogLevel::Nothing,
            1 => LogLevel::User,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            6 => LogLevel::All,
            _ => LogLevel::Info,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Parse a level name such as "warn" or "debug" (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "nothing" | "off" | "none" => Some(LogLevel::Nothing),
            "user" => Some(LogLevel::User),
            "error" => Some(LogLevel::Error),
            "warning" | "warn" => Some(LogLevel::Warning),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "all" | "trace" => Some(LogLevel::All),
            _ => None,
        }
    }

    /// The `log` crate filter this level enables
    ///
    /// `User` messages are fatal-class and go out at error level.
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Nothing => LevelFilter::Off,
            LogLevel::User | LogLevel::Error => LevelFilter::Error,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::All => LevelFilter::Trace,
        }
    }
}

/// Install the stderr logger at `level`
///
/// Returns `false` if a logger was installed first. In that case only the
/// global maximum level changes.
pub fn init_logging(level: LogLevel) -> bool {
    let installed = env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .target(Target::Stderr)
        .format_timestamp(None)
        .try_init()
        .is_ok();
    log::set_max_level(level.to_level_filter());
    installed
}
