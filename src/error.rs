//! Error types for telnet sessions, the command catalog and fleet dispatch.
//!
//! Every device-level failure is represented here. The fleet layer decides
//! which of them are isolated to one device and which reach the caller.

use thiserror::Error;

/// Errors that can occur while talking to a device or managing the fleet.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The TCP connection could not be established within the response timeout.
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    /// The TCP connection was refused or the address could not be resolved.
    #[error("connect to {0} failed: {1}")]
    ConnectFailed(String, String),

    /// Bad credentials or an unexpected login prompt sequence.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Disabling pagination or line wrap after login failed.
    #[error("session setup failed: {0}")]
    SetupFailed(String),

    /// The command prompt did not reappear before the timeout.
    ///
    /// The error contains the partial output received before the timeout.
    #[error("response timeout: {0}")]
    ResponseTimeout(String),

    /// The device closed the connection.
    #[error("stream closed")]
    StreamClosed,

    /// Every reconnect-and-retry attempt for a command failed.
    #[error("command '{command}' failed after {attempts} attempts")]
    RetriesExhausted { command: String, attempts: usize },

    /// An operation name that the catalog does not know.
    #[error("unknown operation {0}")]
    UnknownOperation(String),

    /// The persisted discovery state could not be read or decoded.
    #[error("malformed persisted state: {0}")]
    MalformedPersistedState(String),

    /// A VLAN value was used numerically but is not a decimal integer.
    #[error("invalid vlan '{0}'")]
    InvalidVlan(String),

    /// A replayed session has no recorded output for the requested command.
    #[error("replay mismatch: {0}")]
    ReplayMismatchError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    InternalServerError(String),
}

impl ConnectError {
    /// Returns true for mid-command failures that warrant a reconnect and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::StreamClosed | ConnectError::ResponseTimeout(_) | ConnectError::Io(_)
        )
    }
}
