//! Reconciliation with edits made to the durable files by other processes.
//!
//! Both files are polled: a fingerprint that differs from the one this
//! process last wrote or loaded means someone else touched the file.
//!
//! In-memory commits that land between two polls can be overwritten by a
//! reload of an externally edited data file. The window is bounded by the
//! poll interval and accepted; no field-level merge is attempted.

use std::sync::Arc;

use crate::observability::metrics;
use crate::store::persistence::{fingerprint, DocumentFile};
use crate::store::shared::{ApplyOutcome, SharedStateStore, StoreError};
use crate::topology::TopologyDocument;

/// Which files a reconciliation pass reloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExternalChanges {
    pub data: bool,
    pub trusted: bool,
}

enum Tracked {
    Data,
    Trusted,
}

impl SharedStateStore {
    /// Poll both durable files once and reload whichever changed.
    ///
    /// A malformed file is logged and skipped; the in-memory document is kept.
    pub async fn check_external_changes(&self) -> ExternalChanges {
        let data = self.reconcile_data_file().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Skipping reload of externally edited topology document");
            false
        });
        let trusted = self.reconcile_trusted_file().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Skipping reload of externally edited trusted hostname list");
            false
        });
        ExternalChanges { data, trusted }
    }

    async fn reconcile_data_file(&self) -> Result<bool, StoreError> {
        if !self.changed_on_disk(&self.data_file, Tracked::Data).await? {
            return Ok(false);
        }

        let mut state = self.state.write().await;

        // Re-read under the writer section so a commit that landed after the
        // unlocked check is not mistaken for an external edit.
        let Some(bytes) = read(&self.data_file).await? else {
            return Ok(false);
        };
        let current = fingerprint(&bytes);
        if state.data_fingerprint.as_deref() == Some(current.as_str()) {
            return Ok(false);
        }
        state.data_fingerprint = Some(current);

        let (document, report) =
            TopologyDocument::from_json(&bytes).map_err(|source| StoreError::Document {
                path: self.data_file.path().to_path_buf(),
                source,
            })?;

        tracing::info!(
            path = %self.data_file.path().display(),
            hosts = document.hosts.len(),
            "External change detected in topology document"
        );
        metrics::record_reload("data");

        if !report.is_clean() {
            tracing::warn!(?report, "Repaired externally edited topology document");
            state.dirty = true;
        }

        if document == state.document {
            return Ok(false);
        }
        state.document = document;
        self.notifier.publish(Arc::new(state.document.clone()));
        Ok(true)
    }

    async fn reconcile_trusted_file(&self) -> Result<bool, StoreError> {
        if !self.changed_on_disk(&self.trusted_file, Tracked::Trusted).await? {
            return Ok(false);
        }

        let mut state = self.state.write().await;

        let Some(bytes) = read(&self.trusted_file).await? else {
            return Ok(false);
        };
        let current = fingerprint(&bytes);
        if state.trusted_fingerprint.as_deref() == Some(current.as_str()) {
            return Ok(false);
        }
        state.trusted_fingerprint = Some(current);

        let names: Vec<String> =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::TrustedList {
                path: self.trusted_file.path().to_path_buf(),
                source,
            })?;

        tracing::info!(
            path = %self.trusted_file.path().display(),
            names = names.len(),
            "External change detected in trusted hostname list"
        );
        metrics::record_reload("trusted");

        let mut candidate = state.document.clone();
        candidate.trusted_hostnames = names;
        let outcome = self.commit(&mut state, candidate).await;
        Ok(matches!(outcome, ApplyOutcome::Committed { .. }))
    }

    /// Cheap check under the read side; `false` for a missing file.
    async fn changed_on_disk(&self, file: &DocumentFile, tracked: Tracked) -> Result<bool, StoreError> {
        let Some(bytes) = read(file).await? else {
            return Ok(false);
        };
        let current = fingerprint(&bytes);
        let state = self.state.read().await;
        let last_seen = match tracked {
            Tracked::Data => state.data_fingerprint.as_deref(),
            Tracked::Trusted => state.trusted_fingerprint.as_deref(),
        };
        Ok(last_seen != Some(current.as_str()))
    }
}

async fn read(file: &DocumentFile) -> Result<Option<Vec<u8>>, StoreError> {
    file.read().await.map_err(|source| StoreError::Io {
        path: file.path().to_path_buf(),
        source,
    })
}
