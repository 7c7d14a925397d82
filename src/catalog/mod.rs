//! Command catalog and output parser.
//!
//! Each [`Operation`] pairs literal CLI text with an extraction pattern built
//! from the shared sub-patterns in [`patterns`]. Running an operation against
//! a [`CommandShell`](crate::session::CommandShell) yields [`Record`]s in the
//! order the device printed them, each stamped with the device's hostname.

pub mod parser;
pub mod patterns;

mod operations;
mod record;
mod span;

pub use operations::{CommandSpec, Extraction, Operation};
pub use parser::{MatchScope, normalize_interface};
pub use record::{HOSTNAME, Record};
pub use span::{remote_span_plan, span_session_from_vlan};
