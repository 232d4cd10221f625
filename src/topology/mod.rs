//! Topology data model.
//!
//! # Data Flow
//! ```text
//! durable JSON bytes
//!     → document.rs (lenient parse, per-entry validation, dedup by ip)
//!     → TopologyDocument (strongly typed, hosts unique by ip)
//!     → store (owned copy, snapshots handed out by value)
//!
//! probe results
//!     → types.rs (Status + latency fields on Host / Connection)
//! ```
//!
//! # Design Decisions
//! - Malformed hosts, connections and timestamps are dropped at the boundary and counted
//! - Duplicate hosts collapse to the last occurrence, kept at the first position
//! - Display fields the monitor does not interpret are carried through untouched

pub mod document;
pub mod types;

pub use document::{DocumentError, NormalizeReport, PriorityReport, TopologyDocument};
pub use types::{Connection, Host, Status};
