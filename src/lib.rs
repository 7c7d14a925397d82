//! # netfleet - Telnet Automation for Switch Fleets
//!
//! `netfleet` drives Cisco-style switches over their telnet CLI. It logs in,
//! runs show and configuration commands, parses the tabular output into
//! records, and discovers every switch reachable from a seed device by
//! following neighbor advertisements.
//!
//! ## Features
//!
//! - **Line Sessions**: Prompt-framed command execution with bounded reconnect-and-retry
//! - **Command Catalog**: Named show/config operations with regex-based record extraction
//! - **Discovery**: Fixpoint expansion over neighbor tables, persisted between runs
//! - **Parallel Dispatch**: One operation on every known device through a bounded worker pool
//! - **Recording/Replay**: JSONL session transcripts for offline tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netfleet::catalog::Operation;
//! use netfleet::config::{Credentials, FleetConfig};
//! use netfleet::fleet::Fleet;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = FleetConfig::new(Credentials::new("admin", "secret"))
//!         .with_pool_width(25)
//!         .with_blacklist(["core-router"]);
//!
//!     let mut fleet = Fleet::new("sw1.example.net", config);
//!     let report = fleet.discover().await;
//!     println!("{} devices after {} rounds", report.known.len(), report.iterations);
//!
//!     for record in fleet.execute_on_all(&Operation::ShowMacAddressTable).await {
//!         println!("{:?}", record);
//!     }
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::LineSession`] - Telnet login, prompt framing and retry
//! - [`catalog::Operation`] - Command catalog and output parsing
//! - [`fleet::Fleet`] - Discovery, persistence and parallel dispatch
//! - [`error::ConnectError`] - Error types for sessions, catalog and fleet
//! - [`config`] - Protocol constants and tunable options

pub mod catalog;
pub mod config;
pub mod error;
pub mod fleet;
pub mod session;
