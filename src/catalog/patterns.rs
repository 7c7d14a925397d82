//! Shared sub-patterns and the extraction patterns composed from them.
//!
//! Every capture group name becomes a field name in the produced records.

use once_cell::sync::Lazy;
use regex::Regex;

pub const WHITESPACE: &str = r"\s+";
pub const OPTIONAL_WHITESPACE: &str = r"\s*";
/// Whitespace or end of line, for columns that may end a row.
pub const COLUMN_END: &str = r"(?:\s+|$)";

pub const PROTOCOL: &str = r"(?P<protocol>Internet)";
pub const IP: &str = r"(?P<ip>[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})";
pub const AGE: &str = r"(?P<age>[0-9-]+)";
pub const ARP_TYPE: &str = r"(?P<arptype>ARPA)";
pub const VLAN_ID: &str = r"(?P<vlanid>(?:[0-9]+|unassigned|trunk|dynamic))";
pub const VLAN_NAME: &str = r"(?P<vlanname>[a-zA-Z][0-9a-zA-Z_-]*)";
pub const VLAN_STATUS: &str = r"(?P<vlanstatus>[a-z/]+)";
pub const MAC_ADDRESS: &str = r"(?P<macaddress>[0-9a-f.]+)";
pub const MAC_ADDRESS_TYPE: &str = r"(?P<macaddress_type>(?:STATIC|DYNAMIC))";
pub const PORT: &str = r"(?P<port>[a-zA-Z0-9/]+)";
pub const DEVICE_ID: &str = r"(?P<deviceid>[.0-9A-Za-z-]+)";
/// LLDP truncates system names to 20 characters.
pub const LLDP_DEVICE_ID: &str = r"(?P<deviceid>[.0-9A-Za-z-]{1,20})";
pub const INTERFACE: &str =
    r"(?P<interface>(?:(?:Gi|Fa|Te)[a-zA-Z]*\s*[0-9]/[0-9](?:/[0-9]{1,2})?)|vlan [0-9]+)";
pub const HOLD_TIME: &str = r"(?P<holdtime>[0-9]+)";
pub const CAPABILITIES: &str = r"(?P<capabilities>(?:[RTBSHIrP],?\s?)+)";
pub const PLATFORM: &str = r"(?P<platform>[0-9a-zA-Z-]+)";
pub const WORD: &str = r"[0-9a-zA-Z]+";
pub const PATCH_ID: &str = r"(?P<patchid>[a-z0-9_]+[-.][a-z0-9]+[-.][0-9]+[a-z]?)";
pub const MONITOR_SESSION: &str = r"monitor session (?P<monitor_session>[0-9]+) ";
pub const MONITOR_SOURCE_DESTINATION: &str =
    r"(?P<src_dst>(?:source|destination))\s*(?:remote|interface)\s*";
pub const FAN: &str = r"FAN is (?P<FAN>[A-Z]+)";
pub const TEMPERATURE: &str = r"TEMPERATURE is (?P<TEMPSTATUS>[A-Z]+)";
pub const TEMPERATURE_VALUE: &str = r"(?:Temperature Value: (?P<TEMP>[0-9]+) Degree Celsius)?";
pub const TEMPERATURE_STATE: &str = r"(?:Temperature State: (?P<TEMPCOLOR>[A-Z]+))?";
pub const TRANSFERRED_BYTES: &str = r"(?P<bytes>[0-9]+)\sbytes\s";

/// Renames the capture group `from` inside `pattern` to `to`.
pub fn renamed(pattern: &str, from: &str, to: &str) -> String {
    pattern.replace(&format!("(?P<{from}>"), &format!("(?P<{to}>"))
}

fn compile(name: &str, parts: &[&str]) -> Regex {
    match Regex::new(&parts.concat()) {
        Ok(re) => re,
        Err(err) => panic!("invalid {name} pattern: {err}"),
    }
}

pub static MAC_ADDRESS_TABLE: Lazy<Regex> = Lazy::new(|| {
    compile(
        "mac address table",
        &[
            OPTIONAL_WHITESPACE,
            VLAN_ID,
            WHITESPACE,
            MAC_ADDRESS,
            WHITESPACE,
            MAC_ADDRESS_TYPE,
            WHITESPACE,
            PORT,
        ],
    )
});

pub static VLAN_BRIEF: Lazy<Regex> = Lazy::new(|| {
    compile(
        "vlan brief",
        &[
            VLAN_ID,
            WHITESPACE,
            VLAN_NAME,
            WHITESPACE,
            VLAN_STATUS,
            COLUMN_END,
        ],
    )
});

pub static CDP_NEIGHBORS: Lazy<Regex> = Lazy::new(|| {
    let portid = renamed(INTERFACE, "interface", "portid");
    compile(
        "cdp neighbors",
        &[
            DEVICE_ID,
            WHITESPACE,
            INTERFACE,
            WHITESPACE,
            HOLD_TIME,
            WHITESPACE,
            CAPABILITIES,
            WHITESPACE,
            PLATFORM,
            OPTIONAL_WHITESPACE,
            &portid,
        ],
    )
});

pub static LLDP_NEIGHBORS: Lazy<Regex> = Lazy::new(|| {
    let portid = renamed(INTERFACE, "interface", "portid");
    compile(
        "lldp neighbors",
        &[
            LLDP_DEVICE_ID,
            WHITESPACE,
            INTERFACE,
            WHITESPACE,
            HOLD_TIME,
            WHITESPACE,
            CAPABILITIES,
            WHITESPACE,
            &portid,
        ],
    )
});

pub static ENVIRONMENT: Lazy<Regex> = Lazy::new(|| {
    compile(
        "environment",
        &[
            FAN,
            WHITESPACE,
            TEMPERATURE,
            WHITESPACE,
            TEMPERATURE_VALUE,
            OPTIONAL_WHITESPACE,
            TEMPERATURE_STATE,
        ],
    )
});

pub static INTERFACE_STATUS: Lazy<Regex> = Lazy::new(|| {
    compile(
        "interface status",
        &[
            INTERFACE, WHITESPACE, PATCH_ID, WHITESPACE, WORD, WHITESPACE, VLAN_ID,
        ],
    )
});

pub static ARP: Lazy<Regex> = Lazy::new(|| {
    compile(
        "arp",
        &[
            PROTOCOL,
            WHITESPACE,
            IP,
            WHITESPACE,
            AGE,
            WHITESPACE,
            MAC_ADDRESS,
            WHITESPACE,
            ARP_TYPE,
            WHITESPACE,
            VLAN_NAME,
        ],
    )
});

pub static INTERFACE_VLAN_CONFIG: Lazy<Regex> = Lazy::new(|| {
    let vlanconfig = format!(
        "switchport access vlan {}",
        renamed(VLAN_ID, "vlanid", "vlanconfig")
    );
    compile(
        "interface vlan config",
        &["interface ", INTERFACE, WHITESPACE, &vlanconfig],
    )
});

pub static MONITOR_SESSIONS: Lazy<Regex> = Lazy::new(|| {
    compile(
        "monitor sessions",
        &[MONITOR_SESSION, MONITOR_SOURCE_DESTINATION, INTERFACE],
    )
});

pub static TRANSFER: Lazy<Regex> = Lazy::new(|| compile("transfer", &[TRANSFERRED_BYTES]));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_composed_patterns_compile() {
        for re in [
            &MAC_ADDRESS_TABLE,
            &VLAN_BRIEF,
            &CDP_NEIGHBORS,
            &LLDP_NEIGHBORS,
            &ENVIRONMENT,
            &INTERFACE_STATUS,
            &ARP,
            &INTERFACE_VLAN_CONFIG,
            &MONITOR_SESSIONS,
            &TRANSFER,
        ] {
            assert!(re.captures_len() > 1);
        }
    }

    #[test]
    fn renamed_only_touches_the_group_name() {
        assert_eq!(
            renamed(VLAN_ID, "vlanid", "vlanconfig"),
            r"(?P<vlanconfig>(?:[0-9]+|unassigned|trunk|dynamic))"
        );
    }

    #[test]
    fn interface_accepts_long_short_and_vlan_forms() {
        let re = Regex::new(&format!("^{INTERFACE}$")).unwrap();
        for name in ["Gi1/0/5", "GigabitEthernet1/0/48", "Fa0/1", "Gig 1/0/1", "vlan 901"] {
            assert!(re.is_match(name), "{name} should match");
        }
        assert!(!re.is_match("Po1"));
    }
}
