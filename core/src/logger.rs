use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[90m",
            LogLevel::Info => "\x1b[37m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
        }
    }
}

/// Logger backends selectable from the `logger` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoggerKind {
    Stdout,
    Null,
}

impl LoggerKind {
    pub fn name(&self) -> &'static str {
        match self {
            LoggerKind::Stdout => "stdout",
            LoggerKind::Null => "null",
        }
    }
}

impl FromStr for LoggerKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdout" | "logger" | "console" => Ok(LoggerKind::Stdout),
            "null" | "nulllogger" | "none" | "quiet" => Ok(LoggerKind::Null),
            other => Err(BuildError::Config(format!("unknown logger '{}'", other))),
        }
    }
}

impl TryFrom<String> for LoggerKind {
    type Error = BuildError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoggerKind> for String {
    fn from(kind: LoggerKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for LoggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Line-oriented log sink shared by every step of a build.
///
/// `Buffer` keeps the formatted lines in memory so callers can inspect what
/// a build reported.
#[derive(Debug, Clone)]
pub enum Logger {
    Stdout { use_colors: bool },
    Null,
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl Logger {
    pub fn new() -> Self {
        Logger::Stdout {
            use_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn null() -> Self {
        Logger::Null
    }

    pub fn buffer() -> Self {
        Logger::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn from_kind(kind: LoggerKind) -> Self {
        match kind {
            LoggerKind::Stdout => Self::new(),
            LoggerKind::Null => Self::null(),
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        match self {
            Logger::Stdout { use_colors } => {
                let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
                let line = stdout_line(level, message, &timestamp, *use_colors);
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
                let _ = stdout.flush();
            }
            Logger::Null => {}
            Logger::Buffer(lines) => {
                let line = format!("{} {}", level.to_str(), message);
                match lines.lock() {
                    Ok(mut lines) => lines.push(line),
                    Err(poisoned) => poisoned.into_inner().push(line),
                }
            }
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Lines captured by a `Buffer` logger; empty for the other sinks.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Logger::Buffer(lines) => match lines.lock() {
                Ok(lines) => lines.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            },
            _ => Vec::new(),
        }
    }
}

/// Without colors the level is spelled out, so redirected logs keep it.
fn stdout_line(level: LogLevel, message: &str, timestamp: &str, use_colors: bool) -> String {
    if use_colors {
        format!(
            "\x1b[90m[{}]\x1b[0m {}{}\x1b[0m",
            timestamp,
            level.color(),
            message
        )
    } else {
        format!("[{}] {} {}", timestamp, level.to_str(), message)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::null()
    }
}
