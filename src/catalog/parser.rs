//! Turning raw command output into records.

use regex::Regex;

use super::record::{HOSTNAME, Record};

/// How an extraction pattern is applied to command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Against each line separately; rows of tabular output.
    Line,
    /// Against the whole response; for patterns spanning several lines.
    Block,
}

/// Emits one record per pattern match, stamped with `hostname`.
///
/// Lines that do not match (banners, headers, the echoed command) are
/// skipped. Optional groups that did not participate are left out.
pub fn filter_output(
    hostname: &str,
    output: &str,
    pattern: &Regex,
    scope: MatchScope,
) -> Vec<Record> {
    match scope {
        MatchScope::Line => output
            .lines()
            .flat_map(|line| captures_to_records(hostname, line.trim_end_matches('\r'), pattern))
            .collect(),
        MatchScope::Block => captures_to_records(hostname, output, pattern),
    }
}

fn captures_to_records(hostname: &str, text: &str, pattern: &Regex) -> Vec<Record> {
    pattern
        .captures_iter(text)
        .map(|caps| {
            let mut record = Record::new();
            for name in pattern.capture_names().flatten() {
                if let Some(value) = caps.name(name) {
                    record.insert(name, value.as_str());
                }
            }
            record.insert(HOSTNAME, hostname);
            record
        })
        .collect()
}

/// Parses block-style `key: value` detail output into one record.
///
/// Each line is split at its first `": "`; lines without one are skipped.
/// Keys lose leading whitespace, values lose trailing whitespace.
pub fn parse_key_values(hostname: &str, output: &str) -> Record {
    let mut record = Record::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        record.insert(key.trim_start(), value.trim_end());
    }
    record.insert(HOSTNAME, hostname);
    record
}

/// Collapses long interface names to the short form used by status tables.
pub fn normalize_interface(name: &str) -> String {
    name.replace("TenGigabitEthernet", "Te")
        .replace("GigabitEthernet", "Gi")
        .replace("FastEthernet", "Fa")
}

/// Adds `vlanconfig` from `settings` to each matching `status` record.
///
/// Records match on hostname and normalized interface name. The first
/// matching setting wins; statuses without one are left unchanged.
pub fn join_vlan_settings(mut status: Vec<Record>, settings: &[Record]) -> Vec<Record> {
    for port in &mut status {
        let (Some(hostname), Some(interface)) = (port.hostname(), port.get("interface")) else {
            continue;
        };
        let interface = normalize_interface(interface);
        let setting = settings.iter().find(|setting| {
            setting.hostname() == Some(hostname)
                && setting
                    .get("interface")
                    .is_some_and(|name| normalize_interface(name) == interface)
        });
        if let Some(vlan) = setting.and_then(|setting| setting.get("vlanconfig")) {
            port.insert("vlanconfig", vlan);
        }
    }
    status
}
