//! Common utilities shared by the protocol engine and the backends

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, ErrorCode, ProtocolError, Result};
