//! Server error types

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// A startup check found the port taken
    #[error("{listener} port {port} is already in use: {source}")]
    PortInUse {
        listener: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("port {port} is assigned to both the {first} and {second} listeners")]
    PortConflict {
        port: u16,
        first: String,
        second: String,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The listener stopped accepting connections
    #[error("HTTP listener failed: {0}")]
    Serve(#[source] io::Error),

    #[error("in-flight requests did not drain within {0:?}")]
    DrainTimeout(Duration),

    #[error("HTTP listener task panicked: {0}")]
    ListenerPanicked(String),
}
