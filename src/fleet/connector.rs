use std::collections::HashMap;

use async_trait::async_trait;

use super::*;
use crate::config::{Credentials, SessionOptions};
use crate::session::{LineSession, SessionReplayer};

/// Source of per-device shells for dispatch workers.
///
/// Every call returns a fresh shell; workers never share sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Shell: CommandShell + 'static;

    async fn connect(&self, device: &str) -> Result<Self::Shell, ConnectError>;
}

/// Connects to devices over telnet with one set of credentials.
#[derive(Debug, Clone)]
pub struct TelnetConnector {
    port: u16,
    credentials: Credentials,
    options: SessionOptions,
}

impl TelnetConnector {
    pub fn new(port: u16, credentials: Credentials, options: SessionOptions) -> Self {
        Self {
            port,
            credentials,
            options,
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::new(config.port, config.credentials.clone(), config.session.clone())
    }
}

#[async_trait]
impl Connector for TelnetConnector {
    type Shell = LineSession;

    async fn connect(&self, device: &str) -> Result<LineSession, ConnectError> {
        LineSession::open(
            device,
            self.port,
            self.credentials.clone(),
            self.options.clone(),
        )
        .await
    }
}

/// Serves recorded transcripts instead of live devices.
///
/// Each connect hands out a fresh copy of the device's transcript. Devices
/// without one behave like unreachable hosts.
#[derive(Debug, Clone, Default)]
pub struct ReplayConnector {
    devices: HashMap<String, SessionReplayer>,
}

impl ReplayConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the transcript served for `device`.
    ///
    /// The replayer's records are stamped with `device`.
    pub fn with_device(mut self, device: impl Into<String>, replayer: SessionReplayer) -> Self {
        let device = device.into();
        let replayer = replayer.with_hostname(device.clone());
        self.devices.insert(device, replayer);
        self
    }
}

#[async_trait]
impl Connector for ReplayConnector {
    type Shell = SessionReplayer;

    async fn connect(&self, device: &str) -> Result<SessionReplayer, ConnectError> {
        self.devices
            .get(device)
            .cloned()
            .ok_or_else(|| ConnectError::ConnectTimeout(device.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_connector_stamps_device_name() {
        let connector = ReplayConnector::new().with_device(
            "sw1",
            SessionReplayer::from_transcript("recorded", [("show version", "IOS")]),
        );

        let mut shell = connector.connect("sw1").await.unwrap();
        assert_eq!(shell.hostname(), "sw1");
        assert_eq!(shell.execute("show version", None).await.unwrap(), "IOS");
    }

    #[tokio::test]
    async fn each_connect_starts_a_fresh_transcript() {
        let connector = ReplayConnector::new().with_device(
            "sw1",
            SessionReplayer::from_transcript("sw1", [("show version", "IOS")]),
        );

        for _ in 0..2 {
            let mut shell = connector.connect("sw1").await.unwrap();
            assert_eq!(shell.remaining(), 1);
            shell.execute("show version", None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_devices_are_unreachable() {
        let connector = ReplayConnector::new();
        assert!(matches!(
            connector.connect("sw9").await,
            Err(ConnectError::ConnectTimeout(device)) if device == "sw9"
        ));
    }
}
