//! Live network topology monitor.
//!
//! Keeps a durable topology document (hosts and their connections) whose
//! liveness and latency are re-measured by periodic ICMP sweeps, while
//! staying editable by other processes.

pub mod config;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod store;
pub mod topology;

pub use config::schema::MonitorConfig;
pub use lifecycle::{Shutdown, Supervisor};
pub use store::SharedStateStore;
pub use topology::TopologyDocument;
