//! Error taxonomy for the bridge core.
//!
//! Gateway errors surface to callers; the polling loop and the command
//! dispatcher both terminate them at their own boundary (degraded state and
//! result codes respectively), so neither ever propagates one upstream.

use thiserror::Error;

/// Failure raised by the server gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection, timeout or non-2xx response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Protocol(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// Failure inside command handling. Never crosses the dispatcher boundary;
/// converted to an [`ExecStatus`](crate::entity::dispatch::ExecStatus).
#[derive(Debug, Error)]
pub enum CommandError {
    /// A required parameter is missing or malformed.
    #[error("invalid command parameter: {0}")]
    Validation(String),

    /// A referenced favorite index or sync target cannot be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// The command identifier is not part of the supported surface.
    #[error("unsupported command: {0}")]
    Unsupported(String),

    /// The gateway call for an otherwise-valid command failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
