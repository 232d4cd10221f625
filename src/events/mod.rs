//! Change notification fan-out.
//!
//! # Data Flow
//! ```text
//! store commit / reload
//!     → ChangeNotifier::publish(Arc<TopologyDocument>)
//!     → BroadcastNotifier (tokio broadcast)
//!     → subscribers (push transport, tests)
//! ```
//!
//! # Design Decisions
//! - Publishing never blocks the writer; slow subscribers lag and skip
//! - Published documents are shared immutably; subscribers clone to mutate

pub mod notifier;

pub use notifier::{BroadcastNotifier, ChangeNotifier};
