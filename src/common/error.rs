//! Error types for the gateway
//!
//! Every failure inside a command is reported back to the IDE as a DBGP
//! error envelope, so each variant maps onto one of the fixed protocol
//! error codes through [`ProtocolError`].

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum Error {
    // === Protocol Errors ===
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Unimplemented command: {0}")]
    Unimplemented(String),

    #[error("Invalid value '{value}' for flag -{flag}: {reason}")]
    InvalidFlag {
        flag: char,
        value: String,
        reason: String,
    },

    // === Framing Errors ===
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("XML encoding error: {0}")]
    Xml(String),

    // === Connection Errors ===
    #[error("Failed to connect to IDE at {addr}: {error}")]
    ConnectFailed { addr: String, error: String },

    // === Console Errors ===
    #[error("Debugger '{name}' not found. Searched: {searched}")]
    DebuggerNotFound { name: String, searched: String },

    #[error("Debugger console failed to start: {0}")]
    ConsoleStartFailed(String),

    #[error("Debugger console closed its input")]
    ConsoleClosed,

    #[error("Unexpected output from '{command}': {output}")]
    ConsoleOutput { command: String, output: String },

    #[error("No output produced by '{0}'")]
    NoOutput(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },
}

impl Error {
    /// Create a console output mismatch error
    pub fn console_output<S: AsRef<str>>(command: &str, lines: &[S]) -> Self {
        Self::ConsoleOutput {
            command: command.to_string(),
            output: lines
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// Create an invalid flag error
    pub fn invalid_flag(flag: char, value: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidFlag {
            flag,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The DBGP error code this error is reported with
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Parse(_) => ErrorCode::ParseError,
            Error::InvalidOptions(_) => ErrorCode::InvalidOptions,
            Error::Unimplemented(_) => ErrorCode::Unimplemented,
            _ => ErrorCode::Internal,
        }
    }
}

/// Fixed vocabulary of DBGP error codes spoken by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidOptions,
    Unimplemented,
    Internal,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::ParseError => 1,
            Self::InvalidOptions => 3,
            Self::Unimplemented => 4,
            Self::Internal => 999,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Error payload rendered inside a DBGP error envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&Error> for ProtocolError {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}
