//! DBGP gateway
//!
//! Lets a DBGP speaking IDE debug native programs by translating its
//! commands into gdb console commands and the console output back into
//! DBGP responses.

pub mod backend;
pub mod cli;
pub mod common;
pub mod dbgp;

// Re-export commonly used types for tests
pub use common::{Error, Result};
