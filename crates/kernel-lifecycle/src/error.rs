//! Error types carried through the action stream.
//!
//! Every variant is `Clone` so failures can ride inside broadcast actions.

use std::time::Duration;

use serde::Serialize;

/// Failure on a kernel's message channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Kernel channel is disconnected")]
    Disconnected,

    #[error("Kernel channel closed before a reply arrived")]
    Closed,

    #[error("Kernel transport error: {0}")]
    Transport(String),
}

/// Why a restart did not reach the ready state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RestartError {
    #[error("Kernel did not become ready within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Replacement kernel failed to launch: {0}")]
    Launch(String),

    #[error("Action stream closed while waiting for the kernel")]
    EventStreamClosed,
}

/// Why a content fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("fetch content needs a path")]
    MissingPath,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid notebook JSON: {0}")]
    Parse(String),

    #[error("Unsupported filetype at {0}")]
    Unsupported(String),

    #[error("Timed out reading content after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Io(e.to_string())
    }
}
