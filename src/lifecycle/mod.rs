//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Open store → Spawn store loops → Spawn probe scheduler
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Cancel tokens → Await tasks (deadline) → Final flush
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: store first, then the scheduler that reads it
//! - Cancellation reaches every loop and every in-flight probe batch
//! - Shutdown has a deadline; the store is flushed even if a task lingers

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::Supervisor;
