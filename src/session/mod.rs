//! Telnet line sessions and command execution.
//!
//! A [`LineSession`] owns one cleartext telnet connection to one device. It
//! performs the username/password login handshake, switches pagination and
//! line wrap off, and frames every response by waiting for the device's
//! command prompt. Mid-command failures reconnect and retry a bounded number
//! of times.
//!
//! # Main Components
//!
//! - [`LineSession`] - Per-device connection state machine
//! - [`CommandShell`] - The interface catalog operations run against
//! - [`SessionRecorder`] / [`SessionReplayer`] - Recording live sessions and
//!   replaying them offline

use async_trait::async_trait;
use log::{debug, trace, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{self, Credentials, SessionOptions};
use crate::error::ConnectError;

use transport::TelnetTransport;

pub use recording::{
    NormalizeOptions, ReplayContext, SessionEvent, SessionRecordEntry, SessionRecordLevel,
    SessionRecorder, SessionReplayer, initial_context,
};

/// Lifecycle of a [`LineSession`].
///
/// `Failed` is absorbing for the current connection; a retry starts over at
/// `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Executing,
    Closed,
    Failed,
}

/// Something that runs CLI commands on one device.
///
/// Implemented by live telnet sessions and by offline replayers so the
/// command catalog can be exercised without a network.
#[async_trait]
pub trait CommandShell: Send {
    /// Identifier of the device this shell is bound to.
    fn hostname(&self) -> &str;

    /// Runs `command` and returns the response without the trailing prompt.
    ///
    /// `None` uses the shell's default response timeout.
    async fn execute(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ConnectError>;

    /// Ends the session. Shells without a connection do nothing.
    async fn close(&mut self) -> Result<(), ConnectError> {
        Ok(())
    }
}

/// A telnet session bound to one device for its whole lifetime.
pub struct LineSession {
    host: String,
    port: u16,
    credentials: Credentials,
    /// Prompt every response is framed by, e.g. `sw1#` for `sw1.example.com`.
    prompt: String,
    options: SessionOptions,
    state: SessionState,
    transport: Option<TelnetTransport>,

    /// Optional session recorder bound to this connection.
    recorder: Option<SessionRecorder>,
}

/// Derives the command prompt from a device identifier.
///
/// The short name is everything before the first `.`; identifiers without a
/// dot are used whole.
pub fn derive_prompt(host: &str) -> String {
    let short = host.split_once('.').map_or(host, |(short, _)| short);
    format!("{short}#")
}

mod client;
mod recording;
mod transport;
