use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context;

use super::*;
use crate::config::DISCOVER_FILE_PREFIX;

/// Devices known to a fleet, grown monotonically from the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    known: BTreeSet<String>,
    blacklist: HashSet<String>,
}

impl Topology {
    pub fn new<I, S>(seed: &str, blacklist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: BTreeSet::from([seed.to_string()]),
            blacklist: blacklist.into_iter().map(Into::into).collect(),
        }
    }

    pub fn known(&self) -> &BTreeSet<String> {
        &self.known
    }

    pub fn contains(&self, device: &str) -> bool {
        self.known.contains(device)
    }

    pub fn is_blacklisted(&self, device: &str) -> bool {
        self.blacklist.contains(device)
    }

    /// Adds devices and returns how many were new. Empty names are ignored.
    pub fn extend<I, S>(&mut self, devices: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.known.len();
        self.known.extend(
            devices
                .into_iter()
                .map(Into::into)
                .filter(|device| !device.is_empty()),
        );
        self.known.len() - before
    }

    /// Known devices that may be contacted.
    pub fn targets(&self) -> Vec<String> {
        self.known
            .iter()
            .filter(|device| !self.blacklist.contains(*device))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// File name holding the persisted topology grown from `seed`.
pub fn state_file_name(seed: &str) -> String {
    let seed = seed.replace(['/', '\\'], "_");
    format!("{DISCOVER_FILE_PREFIX}{seed}.json")
}

/// Reads a persisted device list. A missing file is an empty list.
pub fn load_known(path: &Path) -> Result<BTreeSet<String>, ConnectError> {
    read_state(path)
        .map(|devices| devices.unwrap_or_default().into_iter().collect())
        .map_err(|err| ConnectError::MalformedPersistedState(format!("{err:#}")))
}

fn read_state(path: &Path) -> anyhow::Result<Option<Vec<String>>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let devices = serde_json::from_str(&contents)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(Some(devices))
}

/// Writes `known` as a JSON array, replacing any previous content.
pub fn save_known(path: &Path, known: &BTreeSet<String>) -> Result<(), ConnectError> {
    let json = serde_json::to_string(known).map_err(|err| {
        ConnectError::InternalServerError(format!("failed to encode topology: {err}"))
    })?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, json)?;
    fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_always_known() {
        let topology = Topology::new("sw1", Vec::<String>::new());
        assert!(topology.contains("sw1"));
        assert_eq!(topology.targets(), vec!["sw1".to_string()]);
    }

    #[test]
    fn extend_counts_only_new_devices() {
        let mut topology = Topology::new("sw1", Vec::<String>::new());
        assert_eq!(topology.extend(["sw1", "sw2", "sw2", ""]), 1);
        assert_eq!(topology.extend(["sw2"]), 0);
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn blacklisted_devices_are_known_but_not_targets() {
        let mut topology = Topology::new("sw1", ["sw3"]);
        topology.extend(["sw2", "sw3"]);

        assert!(topology.contains("sw3"));
        assert!(topology.is_blacklisted("sw3"));
        assert_eq!(topology.targets(), vec!["sw1".to_string(), "sw2".to_string()]);
    }

    #[test]
    fn state_file_is_named_after_seed() {
        assert_eq!(state_file_name("sw1"), "discover-sw1.json");
        assert_eq!(state_file_name("a/b"), "discover-a_b.json");
    }

    #[test]
    fn save_then_load_preserves_devices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(state_file_name("sw1"));
        let known = BTreeSet::from(["sw1".to_string(), "sw2".to_string()]);

        save_known(&path, &known).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"["sw1","sw2"]"#
        );
        assert_eq!(load_known(&path).unwrap(), known);
    }

    #[test]
    fn missing_state_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let known = load_known(&dir.path().join("discover-none.json")).unwrap();
        assert!(known.is_empty());
    }

    #[test]
    fn corrupt_state_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discover-sw1.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            load_known(&path),
            Err(ConnectError::MalformedPersistedState(_))
        ));
    }
}
