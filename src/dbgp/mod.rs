//! DBGP protocol engine
//!
//! Framing, command parsing, response encoding and the connection loop that
//! binds each DBGP command to a [`crate::backend::Backend`] call.

pub mod codec;
pub mod command;
pub mod conn;
pub mod response;
pub mod types;

pub use command::Command;
pub use conn::Connection;
pub use types::*;

const FILE_SCHEME: &str = "file://";

/// Local path named by a `file://` URI
pub fn path_from_uri(uri: &str) -> &str {
    uri.strip_prefix(FILE_SCHEME).unwrap_or(uri)
}

/// `file://` URI for a local path
pub fn uri_from_path(path: &str) -> String {
    if path.starts_with(FILE_SCHEME) {
        path.to_string()
    } else {
        format!("{}{}", FILE_SCHEME, path)
    }
}
