//! Shared state store subsystem.
//!
//! # Data Flow
//! ```text
//! snapshot():  read lock → clone document → caller owns the copy
//!
//! apply(doc):  dedup hosts → write lock → equal? no-op
//!              → replace → write file (temp + rename) → publish
//!
//! Background (tasks.rs), each on its own interval:
//!     flush loop       → rewrite if dirty (failed write, expiry, repair)
//!     external loop    → fingerprint both files → reload on mismatch (reconcile.rs)
//!     expiry loop      → drop priority markers past their TTL
//! ```
//!
//! # Design Decisions
//! - One tokio RwLock guards the document and the durable write together
//! - The store is an explicitly constructed `Arc`, never a global
//! - Every failure is logged and retried; none stops the process

pub mod persistence;
pub mod reconcile;
pub mod shared;
pub mod tasks;

pub use persistence::{fingerprint, DocumentFile};
pub use reconcile::ExternalChanges;
pub use shared::{ApplyOutcome, SharedStateStore, StoreError};
