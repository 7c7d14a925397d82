use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::parser::{self, MatchScope};
use super::patterns;
use super::record::{HOSTNAME, Record};
use crate::config::{NEWLINE, TRANSFER_TIMEOUT};
use crate::error::ConnectError;
use crate::session::CommandShell;

/// How the response of a [`CommandSpec`] becomes records.
#[derive(Debug, Clone, Copy)]
pub enum Extraction {
    /// One record per match of the pattern.
    Pattern(&'static Regex, MatchScope),
    /// One record of `key: value` pairs.
    KeyValue,
    /// One record holding the raw response under `output`.
    Raw,
    /// One record holding the first `bytes` match, or `-1`.
    TransferredBytes,
}

/// A literal command and how to read its response.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub command: String,
    pub extraction: Extraction,
    /// Overrides the session's response timeout.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    fn pattern(
        name: &'static str,
        command: &str,
        pattern: &'static Regex,
        scope: MatchScope,
    ) -> Self {
        Self {
            name,
            command: command.to_string(),
            extraction: Extraction::Pattern(pattern, scope),
            timeout: None,
        }
    }

    fn raw(name: &'static str, command: String) -> Self {
        Self {
            name,
            command,
            extraction: Extraction::Raw,
            timeout: None,
        }
    }

    /// Runs the command on `shell` and extracts its records.
    pub async fn execute<S>(&self, shell: &mut S) -> Result<Vec<Record>, ConnectError>
    where
        S: CommandShell + ?Sized,
    {
        let output = shell.execute(&self.command, self.timeout).await?;
        let records = self.extract(shell.hostname(), &output);
        debug!(
            "{} {} yielded {} records",
            shell.hostname(),
            self.name,
            records.len()
        );
        Ok(records)
    }

    /// Extracts records from a response produced by this command.
    pub fn extract(&self, hostname: &str, output: &str) -> Vec<Record> {
        match self.extraction {
            Extraction::Pattern(pattern, scope) => {
                parser::filter_output(hostname, output, pattern, scope)
            }
            Extraction::KeyValue => vec![parser::parse_key_values(hostname, output)],
            Extraction::Raw => {
                let mut record = Record::new();
                record.insert("output", output);
                record.insert(HOSTNAME, hostname);
                vec![record]
            }
            Extraction::TransferredBytes => {
                let bytes = parser::filter_output(
                    hostname,
                    output,
                    &patterns::TRANSFER,
                    MatchScope::Block,
                )
                .into_iter()
                .next()
                .and_then(|record| record.get("bytes").map(str::to_string))
                .unwrap_or_else(|| "-1".to_string());
                let mut record = Record::new();
                record.insert("bytes", bytes);
                record.insert(HOSTNAME, hostname);
                vec![record]
            }
        }
    }
}

/// Every operation the catalog can run against a device.
///
/// Read operations parse tabular output into records. Write operations
/// return a single record holding the device's raw response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    ShowMacAddressTable,
    ShowVlan,
    /// CDP adjacency listing; drives discovery.
    ShowNeighbors,
    ShowLldpNeighbors,
    ShowLldpNeighborDetail {
        neighbor: String,
    },
    ShowHealth,
    /// Ports carrying a patch identifier, with their live VLAN.
    ShowInterfaceVlan,
    ShowArp,
    /// Configured access VLAN per interface.
    InterfaceVlanSetting,
    /// [`Operation::ShowInterfaceVlan`] joined with [`Operation::InterfaceVlanSetting`].
    InterfaceStatusAndSetting,
    ShowSpan,
    SetInterfaceVlan {
        interface: String,
        vlan: String,
    },
    SetInterfaceVlanVoiceVlan {
        interface: String,
        vlan: String,
        voice_vlan: Option<String>,
    },
    SetInterfaceTrunk {
        interface: String,
    },
    SetInterfaceDescription {
        interface: String,
        description: String,
    },
    SetInterfacesDescriptions {
        descriptions: Vec<(String, String)>,
    },
    /// Copies the running configuration to non-volatile storage.
    SaveConfig,
    AddUser {
        username: String,
        password: String,
        privilege: u8,
    },
    EnableTelnetLogin,
    ClearRemoteSpan {
        session: u32,
    },
    RemoteSpan {
        session: u32,
        /// Prefixed with `interface` or `remote vlan`.
        source: String,
        destination: String,
    },
    UploadFileTftp {
        /// `HOSTNAME` is replaced by the device identifier.
        source: String,
        host: String,
        destination: String,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ShowMacAddressTable => "show_mac_address_table",
            Operation::ShowVlan => "show_vlan",
            Operation::ShowNeighbors => "show_neighbors",
            Operation::ShowLldpNeighbors => "show_lldp_neighbors",
            Operation::ShowLldpNeighborDetail { .. } => "show_lldp_neighbor_detail",
            Operation::ShowHealth => "show_health",
            Operation::ShowInterfaceVlan => "show_interface_vlan",
            Operation::ShowArp => "show_arp",
            Operation::InterfaceVlanSetting => "interface_vlan_setting",
            Operation::InterfaceStatusAndSetting => "interface_status_and_setting",
            Operation::ShowSpan => "show_span",
            Operation::SetInterfaceVlan { .. } => "set_interface_vlan",
            Operation::SetInterfaceVlanVoiceVlan { .. } => "set_interface_vlan_voice_vlan",
            Operation::SetInterfaceTrunk { .. } => "set_interface_trunk",
            Operation::SetInterfaceDescription { .. } => "set_interface_description",
            Operation::SetInterfacesDescriptions { .. } => "set_interfaces_descriptions",
            Operation::SaveConfig => "save_config",
            Operation::AddUser { .. } => "add_user",
            Operation::EnableTelnetLogin => "enable_telnet_login",
            Operation::ClearRemoteSpan { .. } => "clear_remote_span",
            Operation::RemoteSpan { .. } => "remote_span",
            Operation::UploadFileTftp { .. } => "upload_file_tftp",
        }
    }

    /// Whether the operation changes device configuration.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::SetInterfaceVlan { .. }
                | Operation::SetInterfaceVlanVoiceVlan { .. }
                | Operation::SetInterfaceTrunk { .. }
                | Operation::SetInterfaceDescription { .. }
                | Operation::SetInterfacesDescriptions { .. }
                | Operation::SaveConfig
                | Operation::AddUser { .. }
                | Operation::EnableTelnetLogin
                | Operation::ClearRemoteSpan { .. }
                | Operation::RemoteSpan { .. }
                | Operation::UploadFileTftp { .. }
        )
    }

    /// Commands this operation sends to the device identified by `hostname`.
    ///
    /// Every operation sends exactly one command except
    /// [`Operation::InterfaceStatusAndSetting`], which sends the status
    /// listing followed by the configuration listing.
    pub fn commands(&self, hostname: &str) -> Vec<CommandSpec> {
        let name = self.name();
        let spec = match self {
            Operation::ShowMacAddressTable => CommandSpec::pattern(
                name,
                "show mac address-table",
                &patterns::MAC_ADDRESS_TABLE,
                MatchScope::Line,
            ),
            Operation::ShowVlan => CommandSpec::pattern(
                name,
                "show vlan brief",
                &patterns::VLAN_BRIEF,
                MatchScope::Line,
            ),
            Operation::ShowNeighbors => CommandSpec::pattern(
                name,
                "show cdp neighbors",
                &patterns::CDP_NEIGHBORS,
                MatchScope::Line,
            ),
            Operation::ShowLldpNeighbors => CommandSpec::pattern(
                name,
                "show lldp neighbors",
                &patterns::LLDP_NEIGHBORS,
                MatchScope::Line,
            ),
            Operation::ShowLldpNeighborDetail { neighbor } => CommandSpec {
                name,
                command: format!("show lldp neighbor {neighbor} detail"),
                extraction: Extraction::KeyValue,
                timeout: None,
            },
            Operation::ShowHealth => CommandSpec::pattern(
                name,
                "show env all",
                &patterns::ENVIRONMENT,
                MatchScope::Block,
            ),
            Operation::ShowInterfaceVlan => CommandSpec::pattern(
                name,
                "show interface status",
                &patterns::INTERFACE_STATUS,
                MatchScope::Line,
            ),
            Operation::ShowArp => {
                CommandSpec::pattern(name, "show arp", &patterns::ARP, MatchScope::Line)
            }
            Operation::InterfaceVlanSetting => CommandSpec::pattern(
                name,
                "show run | inc (interface)|switchport access vlan",
                &patterns::INTERFACE_VLAN_CONFIG,
                MatchScope::Block,
            ),
            Operation::InterfaceStatusAndSetting => {
                let mut specs = Operation::ShowInterfaceVlan.commands(hostname);
                specs.extend(Operation::InterfaceVlanSetting.commands(hostname));
                return specs;
            }
            Operation::ShowSpan => CommandSpec::pattern(
                name,
                "show run | inc monitor session",
                &patterns::MONITOR_SESSIONS,
                MatchScope::Line,
            ),
            Operation::SetInterfaceVlan { interface, vlan } => {
                CommandSpec::raw(name, config_block(&[access_vlan_lines(interface, vlan)]))
            }
            Operation::SetInterfaceVlanVoiceVlan {
                interface,
                vlan,
                voice_vlan,
            } => CommandSpec::raw(
                name,
                config_block(&[
                    access_vlan_lines(interface, vlan),
                    voice_vlan_lines(interface, voice_vlan.as_deref()),
                ]),
            ),
            Operation::SetInterfaceTrunk { interface } => CommandSpec::raw(
                name,
                config_block(&[interface_lines(
                    interface,
                    &[
                        "shutdown",
                        "switchport trunk encap dot1q",
                        "switchport mode trunk",
                        "no shutdown",
                    ],
                )]),
            ),
            Operation::SetInterfaceDescription {
                interface,
                description,
            } => CommandSpec::raw(
                name,
                config_block(&[description_lines(interface, description)]),
            ),
            Operation::SetInterfacesDescriptions { descriptions } => CommandSpec::raw(
                name,
                config_block(
                    &descriptions
                        .iter()
                        .map(|(interface, description)| description_lines(interface, description))
                        .collect::<Vec<_>>(),
                ),
            ),
            // The second newline confirms the destination file name.
            Operation::SaveConfig => CommandSpec::raw(name, format!("copy run start{NEWLINE}")),
            Operation::AddUser {
                username,
                password,
                privilege,
            } => CommandSpec::raw(
                name,
                config_block(&[vec![
                    format!("no username {username}"),
                    format!("username {username} privilege {privilege} secret {password}"),
                ]]),
            ),
            Operation::EnableTelnetLogin => CommandSpec::raw(
                name,
                config_block(&[vec!["line vty 0 4".to_string(), "login local".to_string()]]),
            ),
            Operation::ClearRemoteSpan { session } => CommandSpec::raw(
                name,
                config_block(&[vec![format!("no monitor session {session}")]]),
            ),
            Operation::RemoteSpan {
                session,
                source,
                destination,
            } => CommandSpec::raw(
                name,
                config_block(&[vec![
                    format!("monitor session {session} source {source}"),
                    format!("monitor session {session} destination {destination}"),
                ]]),
            ),
            // Two newlines accept the suggested remote host and file name.
            Operation::UploadFileTftp {
                source,
                host,
                destination,
            } => CommandSpec {
                name,
                command: format!(
                    "copy {} tftp://{host}/{destination}{NEWLINE}{NEWLINE}",
                    source.replace("HOSTNAME", hostname)
                ),
                extraction: Extraction::TransferredBytes,
                timeout: Some(TRANSFER_TIMEOUT),
            },
        };
        vec![spec]
    }

    /// Runs the operation on `shell` and returns its records in output order.
    pub async fn run<S>(&self, shell: &mut S) -> Result<Vec<Record>, ConnectError>
    where
        S: CommandShell + ?Sized,
    {
        let hostname = shell.hostname().to_string();
        let mut results = Vec::new();
        for spec in self.commands(&hostname) {
            results.push(spec.execute(shell).await?);
        }

        if *self == Operation::InterfaceStatusAndSetting {
            let mut results = results.into_iter();
            let status = results.next().unwrap_or_default();
            let settings = results.next().unwrap_or_default();
            return Ok(parser::join_vlan_settings(status, &settings));
        }
        Ok(results.into_iter().flatten().collect())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses the name of an operation that takes no arguments.
impl FromStr for Operation {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operation = match s {
            "show_mac_address_table" => Operation::ShowMacAddressTable,
            "show_vlan" => Operation::ShowVlan,
            "show_neighbors" => Operation::ShowNeighbors,
            "show_lldp_neighbors" => Operation::ShowLldpNeighbors,
            "show_health" => Operation::ShowHealth,
            "show_interface_vlan" => Operation::ShowInterfaceVlan,
            "show_arp" => Operation::ShowArp,
            "interface_vlan_setting" => Operation::InterfaceVlanSetting,
            "interface_status_and_setting" => Operation::InterfaceStatusAndSetting,
            "show_span" => Operation::ShowSpan,
            "save_config" => Operation::SaveConfig,
            "enable_telnet_login" => Operation::EnableTelnetLogin,
            _ => return Err(ConnectError::UnknownOperation(s.to_string())),
        };
        Ok(operation)
    }
}

fn config_block(sections: &[Vec<String>]) -> String {
    let mut lines = vec!["config t".to_string()];
    lines.extend(sections.iter().flatten().cloned());
    lines.push("end".to_string());
    lines.join(NEWLINE)
}

fn interface_lines(interface: &str, body: &[&str]) -> Vec<String> {
    let mut lines = vec![format!("interface {interface}")];
    lines.extend(body.iter().map(|line| line.to_string()));
    lines.push("exit".to_string());
    lines
}

fn access_vlan_lines(interface: &str, vlan: &str) -> Vec<String> {
    let access = format!("switchport access vlan {vlan}");
    interface_lines(
        interface,
        &["shutdown", "switchport mode access", &access, "no shutdown"],
    )
}

fn voice_vlan_lines(interface: &str, voice_vlan: Option<&str>) -> Vec<String> {
    let voice = match voice_vlan {
        Some(vlan) => format!("switchport voice vlan {vlan}"),
        None => "no switchport voice vlan".to_string(),
    };
    interface_lines(
        interface,
        &["shutdown", "switchport mode access", &voice, "no shutdown"],
    )
}

fn description_lines(interface: &str, description: &str) -> Vec<String> {
    let description = format!("description {description}");
    interface_lines(interface, &[&description])
}
