//! Debugger backends
//!
//! The dispatcher only ever talks to a [`Backend`]; each kind of debugging
//! engine provides one implementation.

pub mod gdb;

use async_trait::async_trait;

use crate::common::Result;
use crate::dbgp::types::{
    Breakpoint, Context, DebuggerState, Features, InitResponse, Property, Stack, StopReason,
};

pub use gdb::GdbAdapter;

/// Identity values a backend echoes in the init handshake
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity {
    pub app_id: String,
    /// IDE key (`DBGP_IDEKEY`)
    pub ide_key: String,
    /// Session cookie (`DBGP_COOKIE`)
    pub session: String,
}

/// Capabilities a debugging engine provides to the DBGP dispatcher
///
/// Calls are made one at a time from a single connection loop.
#[async_trait]
pub trait Backend: Send {
    /// Perform the backend handshake and return the session identity.
    /// Called once, before any other method.
    async fn init(&mut self) -> Result<InitResponse>;

    /// Current run state
    fn status(&self) -> DebuggerState;

    /// Advertised features, valid after `init`
    fn features(&self) -> Features;

    async fn step_into(&mut self) -> Result<(DebuggerState, StopReason)>;

    async fn step_over(&mut self) -> Result<(DebuggerState, StopReason)>;

    /// Number of frames on the call stack
    async fn stack_depth(&mut self) -> Result<u32>;

    /// Frames of the call stack; only the frame at `depth` when one is given
    async fn stack_get(&mut self, depth: Option<u32>) -> Result<Vec<Stack>>;

    async fn context_names(&mut self, depth: u32) -> Result<Vec<Context>>;

    /// Variables visible in `context` of the frame at `depth`
    async fn context_get(&mut self, depth: u32, context: u32) -> Result<Vec<Property>>;

    /// Value of a single variable
    async fn property_get(&mut self, depth: u32, context: u32, name: &str) -> Result<String>;

    /// Register a breakpoint of `kind` at `file:line`
    async fn breakpoint_set(&mut self, kind: &str, file: &str, line: u32) -> Result<Breakpoint>;
}
