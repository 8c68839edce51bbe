//! Process logger
//!
//! Routes the `log` facade to stderr and, optionally, to a log file.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{LevelFilter, Metadata, Record};
use parking_lot::Mutex;

/// Log levels, numbered as on the command line
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Nothing = 0,
    User = 1,
    Error = 2,
    Warning = 3,
    #[default]
    Info = 4,
    Debug = 5,
    All = 6,
}

impl LogLevel {
    /// Create a LogLevel from an integer
    pub fn from_i32(level: i32) -> Self {
        match level {
            i32::MIN..=0 => LogLevel::Nothing,
            1 => LogLevel::User,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            _ => LogLevel::All,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Parse a level name or number
    pub fn parse(s: &str) -> Result<Self> {
        if let Ok(n) = s.trim().parse::<i32>() {
            return Ok(Self::from_i32(n));
        }
        match s.trim().to_lowercase().as_str() {
            "nothing" | "off" => Ok(LogLevel::Nothing),
            "user" => Ok(LogLevel::User),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "all" | "trace" => Ok(LogLevel::All),
            _ => anyhow::bail!(
                "Invalid log level: {}. Valid options: nothing, user, error, warning, info, debug, all or 0-6",
                s
            ),
        }
    }

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

/// `log::Log` implementation writing to stderr and an optional file
pub struct StreamLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl StreamLogger {
    pub fn new(level: LogLevel, file: Option<File>) -> Self {
        StreamLogger {
            level: level.to_level_filter(),
            file: file.map(Mutex::new),
        }
    }

    fn format(record: &Record) -> String {
        format!("[{}] {}: {}", record.level(), record.target(), record.args())
    }
}

impl log::Log for StreamLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        eprintln!("{}", line);
        if let Some(file) = &self.file {
            let mut file = file.lock();
            let _ = writeln!(file, "{}", line);
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Install the process logger
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<()> {
    let file = log_file
        .map(|path| {
            File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))
        })
        .transpose()?;

    let logger = StreamLogger::new(level, file);
    log::set_boxed_logger(Box::new(logger)).context("Logger already installed")?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log};

    #[test]
    fn test_log_level_from_i32() {
        assert_eq!(LogLevel::from_i32(0), LogLevel::Nothing);
        assert_eq!(LogLevel::from_i32(3), LogLevel::Warning);
        assert_eq!(LogLevel::from_i32(42), LogLevel::All);
        assert_eq!(LogLevel::from_i32(-1), LogLevel::Nothing);
        assert_eq!(LogLevel::Debug.as_i32(), 5);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::parse("WARN").unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::parse("2").unwrap(), LogLevel::Error);
        assert!(LogLevel::parse("loud").is_err());
    }

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(LogLevel::Nothing.to_level_filter(), LevelFilter::Off);
        assert_eq!(LogLevel::User.to_level_filter(), LevelFilter::Error);
        assert_eq!(LogLevel::All.to_level_filter(), LevelFilter::Trace);
    }

    #[test]
    fn test_logger_writes_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let logger = StreamLogger::new(LogLevel::Warning, Some(file.reopen().unwrap()));

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("sndstream::test")
                .args(format_args!("underrun"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("hidden"))
                .build(),
        );
        logger.flush();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "[WARN] sndstream::test: underrun\n");
    }
}
