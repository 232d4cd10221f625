//! Liveness probing subsystem.
//!
//! # Data Flow
//! ```text
//! Sweep (scheduler.rs):
//!     store.snapshot()
//!     → unique host + connection addresses
//!     → chunks of `chunk_size`, at most `worker_count` chunks in flight
//!     → Prober::check per address (prober.rs, icmp.rs)
//!     → ip → outcome map
//!     → store.update(merge.rs) against the current document
//!     → sleep max(base, elapsed × 1.5)
//!
//! Out-of-band (ProbeTrigger):
//!     notify_host_mutated(ip) → single probe → same merge
//! ```
//!
//! # Design Decisions
//! - Probing is total: every failure reads as offline, never as an error
//! - Priority addresses get more attempts with shorter timeouts
//! - Only liveness fields are written back; all other edits are preserved

pub mod icmp;
pub mod merge;
pub mod prober;
pub mod scheduler;

pub use icmp::IcmpProber;
pub use merge::{merge_results, MergeStats, ProbeResults};
pub use prober::{ProbeOutcome, ProbePolicy, Prober};
pub use scheduler::{ProbeScheduler, ProbeTrigger, SweepError, SweepReport};
