//! Fleet discovery and parallel dispatch.
//!
//! A [`Fleet`] is the explicit context every fleet-wide call goes through. It
//! owns the known-device [`Topology`] grown from one seed device, runs
//! catalog operations on every known device through a bounded worker pool,
//! and persists the topology so later runs can start from it.
//!
//! # Main Components
//!
//! - [`Fleet`] - Discovery/dispatch context
//! - [`Topology`] - Known devices plus the never-contact blacklist
//! - [`Connector`] - How a worker obtains a shell for one device

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::catalog::{Operation, Record};
use crate::config::FleetConfig;
use crate::error::ConnectError;
use crate::session::CommandShell;

pub use connector::{Connector, ReplayConnector, TelnetConnector};
pub use patch::normalize_patch_id;
pub use topology::{Topology, load_known, save_known, state_file_name};

/// Discovery/dispatch context for the devices reachable from one seed.
pub struct Fleet<C: Connector = TelnetConnector> {
    seed: String,
    config: FleetConfig,
    topology: Topology,
    connector: Arc<C>,
}

/// One device's contribution to a failed dispatch.
#[derive(Debug)]
pub struct DeviceFailure {
    pub device: String,
    pub error: ConnectError,
}

/// Aggregate result of running one operation on the whole fleet.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Records of every successful device, in completion order.
    pub records: Vec<Record>,
    pub failures: Vec<DeviceFailure>,
}

/// Result of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Adjacency rounds run, including the final one that found nothing new.
    pub iterations: usize,
    pub known: BTreeSet<String>,
    /// Whether the final set was written to the state file.
    pub persisted: bool,
}

impl Fleet<TelnetConnector> {
    /// Creates a context that reaches devices over telnet.
    pub fn new(seed: impl Into<String>, config: FleetConfig) -> Self {
        let connector = TelnetConnector::from_config(&config);
        Self::with_connector(seed, config, connector)
    }
}

impl<C: Connector> Fleet<C> {
    pub fn with_connector(seed: impl Into<String>, config: FleetConfig, connector: C) -> Self {
        let seed = seed.into();
        let topology = Topology::new(&seed, config.blacklist.iter().cloned());
        Self {
            seed,
            config,
            topology,
            connector: Arc::new(connector),
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn known(&self) -> &BTreeSet<String> {
        self.topology.known()
    }

    /// Path of the persisted topology for this seed.
    pub fn state_path(&self) -> PathBuf {
        self.config.state_dir.join(state_file_name(&self.seed))
    }

    /// Merges a previously persisted topology into the known set.
    ///
    /// Missing or corrupt state is ignored. Returns the number of devices added.
    pub fn bootstrap(&mut self) -> usize {
        let path = self.state_path();
        match load_known(&path) {
            Ok(known) => {
                let added = self.topology.extend(known);
                debug!(
                    "Bootstrapped {} devices from {}",
                    added,
                    path.display()
                );
                added
            }
            Err(err) => {
                debug!("Ignoring persisted state: {}", err);
                0
            }
        }
    }

    /// Writes the known set to the state file.
    pub fn save(&self) -> Result<(), ConnectError> {
        save_known(&self.state_path(), self.topology.known())
    }

    /// Runs `operation` on every known, non-blacklisted device concurrently.
    ///
    /// At most `pool_width` devices are contacted at once. Each worker opens
    /// its own shell. Per-device failures are logged and collected, never
    /// raised.
    pub async fn dispatch(&self, operation: &Operation) -> DispatchOutcome {
        let targets = self.topology.targets();
        debug!(
            "Dispatching {} to {} devices (pool width {})",
            operation,
            targets.len(),
            self.config.pool_width
        );

        let semaphore = Arc::new(Semaphore::new(self.config.pool_width.max(1)));
        let mut tasks = JoinSet::new();
        for device in targets {
            let semaphore = semaphore.clone();
            let connector = self.connector.clone();
            let operation = operation.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_on_device(connector.as_ref(), &device, &operation).await,
                    Err(err) => Err(ConnectError::InternalServerError(format!(
                        "worker pool closed: {err}"
                    ))),
                };
                (device, result)
            });
        }

        let mut outcome = DispatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device, Ok(mut records))) => {
                    debug!("{}: {} returned {} records", device, operation, records.len());
                    outcome.records.append(&mut records);
                }
                Ok((device, Err(error))) => {
                    warn!("{}: {} failed: {}", device, operation, error);
                    outcome.failures.push(DeviceFailure { device, error });
                }
                Err(err) => error!("Dispatch worker for {} ended abnormally: {}", operation, err),
            }
        }
        outcome
    }

    /// Like [`Fleet::dispatch`], keeping only the records.
    pub async fn execute_on_all(&self, operation: &Operation) -> Vec<Record> {
        self.dispatch(operation).await.records
    }

    /// Runs `operation` on one device and returns its result to the caller.
    ///
    /// The blacklist is not consulted; the caller named the device.
    pub async fn execute_on_device(
        &self,
        device: &str,
        operation: &Operation,
    ) -> Result<Vec<Record>, ConnectError> {
        run_on_device(self.connector.as_ref(), device, operation).await
    }

    /// Computes the transitive closure of the adjacency relation.
    ///
    /// Each round lists neighbors on every known device and adds them to the
    /// known set; the loop stops at the first round that adds nothing.
    /// Returns the number of rounds.
    pub async fn expand(&mut self) -> usize {
        let mut iterations = 0;
        loop {
            iterations += 1;
            let neighbors = self.execute_on_all(&Operation::ShowNeighbors).await;
            let added = self
                .topology
                .extend(neighbors.iter().filter_map(|record| record.get("deviceid")));
            info!(
                "Discovery round {}: {} known devices (+{})",
                iterations,
                self.topology.len(),
                added
            );
            if added == 0 {
                return iterations;
            }
        }
    }

    /// Bootstraps from persisted state, expands to a fixpoint and persists.
    pub async fn discover(&mut self) -> DiscoveryReport {
        self.bootstrap();
        let iterations = self.expand().await;
        let persisted = match self.save() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Failed to persist topology to {}: {}",
                    self.state_path().display(),
                    err
                );
                false
            }
        };
        DiscoveryReport {
            iterations,
            known: self.topology.known().clone(),
            persisted,
        }
    }

    /// Observed adjacencies as `(device, neighbor)` pairs.
    pub async fn neighbor_edges(&self) -> Vec<(String, String)> {
        self.execute_on_all(&Operation::ShowNeighbors)
            .await
            .into_iter()
            .filter_map(|record| {
                Some((
                    record.hostname()?.to_string(),
                    record.get("deviceid")?.to_string(),
                ))
            })
            .collect()
    }
}

async fn run_on_device<C: Connector>(
    connector: &C,
    device: &str,
    operation: &Operation,
) -> Result<Vec<Record>, ConnectError> {
    let mut shell = connector.connect(device).await?;
    let result = operation.run(&mut shell).await;
    if let Err(err) = shell.close().await {
        debug!("{}: close failed: {}", device, err);
    }
    result
}

mod connector;
mod patch;
mod span;
mod topology;
