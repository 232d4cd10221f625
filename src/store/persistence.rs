//! Durable document files and content fingerprints.

use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::{fs, task};

/// A JSON document on disk, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    path: PathBuf,
}

impl DocumentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file; `Ok(None)` when it does not exist.
    pub async fn read(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write through a uniquely named sibling temp file, then rename it over
    /// the target. Readers never observe a torn document, and concurrent
    /// writers (the daemon and the CLI) never share a staging file.
    pub async fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        let path = self.path.clone();
        let bytes = bytes.to_vec();
        task::spawn_blocking(move || write_staged(&path, &bytes))
            .await
            .map_err(io::Error::other)?
    }
}

fn write_staged(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut prefix = OsString::from(".");
    prefix.push(path.file_name().unwrap_or_default());
    prefix.push(".");

    let mut staging = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    staging.write_all(bytes)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Hex SHA-256 of a file's bytes, used to detect out-of-band edits.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
