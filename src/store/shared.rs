//! The shared state store.
//!
//! # Responsibilities
//! - Own the canonical topology document
//! - Hand out isolated snapshots to any number of readers
//! - Serialize writers, persist each commit, then publish it
//!
//! # Design Decisions
//! - The writer section covers the durable write, so commits are linearized
//!   with their on-disk form
//! - Committing a value equal to the current document is a no-op
//! - A failed write leaves the store dirty; the flush loop retries it

use chrono::Utc;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::StoreConfig;
use crate::events::ChangeNotifier;
use crate::observability::metrics;
use crate::store::persistence::{fingerprint, DocumentFile};
use crate::topology::{DocumentError, PriorityReport, TopologyDocument};

/// Errors surfaced by store I/O. None of them are fatal to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("malformed trusted hostname list {path}: {source}")]
    TrustedList {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of [`SharedStateStore::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The candidate equals the current document; nothing was written or published.
    Unchanged,
    /// The document was replaced and published. `persisted` is false when the
    /// durable write failed and was left to the flush loop.
    Committed { persisted: bool },
}

pub(super) struct StoreState {
    pub(super) document: TopologyDocument,
    pub(super) dirty: bool,
    /// Fingerprint of the data file as last written or loaded by this process.
    pub(super) data_fingerprint: Option<String>,
    pub(super) trusted_fingerprint: Option<String>,
}

/// Owner of the topology document. Share it as `Arc<SharedStateStore>`.
pub struct SharedStateStore {
    pub(super) state: RwLock<StoreState>,
    pub(super) data_file: DocumentFile,
    pub(super) trusted_file: DocumentFile,
    pub(super) notifier: Arc<dyn ChangeNotifier>,
    pub(super) config: StoreConfig,
}

impl SharedStateStore {
    /// Load the document from disk, seeding an empty one when it is missing or unreadable.
    pub async fn open(config: StoreConfig, notifier: Arc<dyn ChangeNotifier>) -> Arc<Self> {
        let data_file = DocumentFile::new(config.data_path.clone());
        let trusted_file = DocumentFile::new(config.trusted_path());

        let (trusted_hostnames, trusted_fingerprint) = load_trusted(&trusted_file).await;

        let mut dirty = false;
        let mut seeded = false;
        let mut data_fingerprint = None;
        let mut document = match data_file.read().await {
            Ok(Some(bytes)) => match TopologyDocument::from_json(&bytes) {
                Ok((document, report)) => {
                    if !report.is_clean() {
                        tracing::warn!(?report, "Repaired topology document on load");
                        dirty = true;
                    }
                    data_fingerprint = Some(fingerprint(&bytes));
                    document
                }
                Err(e) => {
                    tracing::warn!(path = %data_file.path().display(), error = %e, "Topology document unreadable, seeding an empty one");
                    seeded = true;
                    TopologyDocument::default()
                }
            },
            Ok(None) => {
                tracing::info!(path = %data_file.path().display(), "No topology document found, seeding an empty one");
                seeded = true;
                TopologyDocument::default()
            }
            Err(e) => {
                tracing::warn!(path = %data_file.path().display(), error = %e, "Failed to read topology document, seeding an empty one");
                seeded = true;
                TopologyDocument::default()
            }
        };

        if document.trusted_hostnames.is_empty() && !trusted_hostnames.is_empty() {
            document.trusted_hostnames = trusted_hostnames;
            dirty = true;
        }

        tracing::info!(
            hosts = document.hosts.len(),
            priority = document.priority_ips.len(),
            trusted = document.trusted_hostnames.len(),
            "Topology document loaded"
        );

        let store = Arc::new(Self {
            state: RwLock::new(StoreState {
                document,
                dirty: dirty || seeded,
                data_fingerprint,
                trusted_fingerprint,
            }),
            data_file,
            trusted_file,
            notifier,
            config,
        });

        if seeded {
            if let Err(e) = store.flush().await {
                tracing::error!(error = %e, "Failed to write seed document; will retry on next flush");
            }
        }

        store
    }

    /// An independent copy of the current document.
    pub async fn snapshot(&self) -> TopologyDocument {
        self.state.read().await.document.clone()
    }

    /// Replace the document with `candidate` (hosts deduplicated by ip).
    pub async fn apply(&self, mut candidate: TopologyDocument) -> ApplyOutcome {
        let removed = candidate.dedup_hosts();
        if removed > 0 {
            tracing::warn!(removed, "Removed duplicate hosts from update");
        }

        let mut state = self.state.write().await;
        self.commit(&mut state, candidate).await
    }

    /// Read-modify-write under the writer section.
    ///
    /// `f` receives a copy of the current document; the result is committed
    /// exactly as [`apply`](Self::apply) would commit it.
    pub async fn update<R>(&self, f: impl FnOnce(&mut TopologyDocument) -> R) -> (R, ApplyOutcome) {
        let mut state = self.state.write().await;
        let mut candidate = state.document.clone();
        let result = f(&mut candidate);
        let removed = candidate.dedup_hosts();
        if removed > 0 {
            tracing::warn!(removed, "Removed duplicate hosts from update");
        }
        let outcome = self.commit(&mut state, candidate).await;
        (result, outcome)
    }

    /// Grant expedited probing to the given host addresses.
    pub async fn mark_priority(&self, ips: &[Ipv4Addr]) -> PriorityReport {
        let (report, _) = self
            .update(|document| document.mark_priority(ips, Utc::now()))
            .await;
        tracing::info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Priority markers requested"
        );
        report
    }

    /// Write the document if a previous write failed or a background
    /// mutation is pending. Returns whether a write happened.
    pub async fn flush(&self) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if !state.dirty {
            return Ok(false);
        }
        self.persist(&mut state).await?;
        Ok(true)
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.read().await.dirty
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(super) async fn commit(&self, state: &mut StoreState, candidate: TopologyDocument) -> ApplyOutcome {
        if state.document == candidate {
            tracing::trace!("Document unchanged, skipping write");
            return ApplyOutcome::Unchanged;
        }

        state.document = candidate;
        state.dirty = true;
        let persisted = match self.persist(state).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist topology document; will retry on next flush");
                false
            }
        };

        metrics::record_commit();
        self.notifier.publish(Arc::new(state.document.clone()));
        ApplyOutcome::Committed { persisted }
    }

    pub(super) async fn persist(&self, state: &mut StoreState) -> Result<(), StoreError> {
        let path = self.data_file.path();
        let bytes = state.document.to_json_pretty().map_err(|source| {
            metrics::record_persist_failure();
            StoreError::Document {
                path: path.to_path_buf(),
                source,
            }
        })?;

        if let Err(source) = self.data_file.write_atomic(&bytes).await {
            metrics::record_persist_failure();
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        state.dirty = false;
        state.data_fingerprint = Some(fingerprint(&bytes));
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Topology document written");
        Ok(())
    }
}

/// Read the trusted hostname list; a missing or malformed file yields an empty list.
async fn load_trusted(file: &DocumentFile) -> (Vec<String>, Option<String>) {
    match file.read().await {
        Ok(Some(bytes)) => {
            let names = match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!(path = %file.path().display(), error = %e, "Trusted hostname list invalid, using an empty list");
                    Vec::new()
                }
            };
            (names, Some(fingerprint(&bytes)))
        }
        Ok(None) => {
            tracing::warn!(path = %file.path().display(), "Trusted hostname list not found, using an empty list");
            (Vec::new(), None)
        }
        Err(e) => {
            tracing::warn!(path = %file.path().display(), error = %e, "Failed to read trusted hostname list, using an empty list");
            (Vec::new(), None)
        }
    }
}
