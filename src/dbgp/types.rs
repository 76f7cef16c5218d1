//! DBGP protocol types
//!
//! Entities exchanged between the dispatcher and a backend. They are
//! rendered to XML by [`super::response`].

use std::fmt;

/// Session identity sent once in the init handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitResponse {
    pub app_id: String,
    pub ide_key: String,
    pub session: String,
    pub thread: String,
    pub parent: String,
    pub language: String,
    pub file_uri: String,
}

/// Debugger run state as reported by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebuggerState {
    #[default]
    Starting,
    Running,
    Break,
    Stopping,
}

impl fmt::Display for DebuggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Break => write!(f, "break"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Why execution stopped after a continuation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Ok,
    Error,
    Aborted,
    Exception,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
            Self::Aborted => write!(f, "aborted"),
            Self::Exception => write!(f, "exception"),
        }
    }
}

/// Kind of a stack frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    File,
    Eval,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Eval => write!(f, "eval"),
        }
    }
}

/// One call frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    pub level: u32,
    pub frame_type: FrameType,
    /// Absolute `file://` URI
    pub filename: String,
    /// 1-based line number
    pub line: u32,
    /// Current function, if known
    pub r#where: Option<String>,
}

/// A named variable scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub name: String,
    pub id: u32,
}

/// A variable and its value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub full_name: String,
    pub class_name: Option<String>,
    /// Language specific type name
    pub data_type: String,
    pub address: Option<String>,
    /// Whether the value is composite (struct, array)
    pub children: bool,
    pub num_children: Option<u32>,
    pub value: Option<String>,
}

/// A breakpoint accepted by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub state: BreakpointState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointState {
    Enabled,
    Disabled,
}

impl fmt::Display for BreakpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Capabilities advertised to the IDE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Features {
    pub supports_async: bool,
    pub language_name: String,
}

/// Feature names answered by `feature_get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    SupportsAsync,
    LanguageName,
    ProtocolVersion,
}

impl Feature {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "supports_async" => Some(Self::SupportsAsync),
            "language_name" => Some(Self::LanguageName),
            "protocol_version" => Some(Self::ProtocolVersion),
            _ => None,
        }
    }

    /// Value of this feature, as sent to the IDE
    pub fn value(self, features: &Features) -> String {
        match self {
            Self::SupportsAsync => u8::from(features.supports_async).to_string(),
            Self::LanguageName => features.language_name.clone(),
            Self::ProtocolVersion => super::response::PROTOCOL_VERSION.to_string(),
        }
    }
}
