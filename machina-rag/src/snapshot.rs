//! Disk persistence for [`VectorIndex`] snapshots.
//!
//! A snapshot directory holds a single `index.json` file. Writes go to
//! `index.json.tmp` first and are renamed into place, so a reader always sees
//! either the previous complete snapshot or the new one. A SHA-256 checksum of
//! the entries payload is stored alongside it and verified on load.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::index::{IndexEntry, VectorIndex};

/// File name of the snapshot inside the snapshot directory.
pub const SNAPSHOT_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    created_at: DateTime<Utc>,
    dimensions: Option<usize>,
    entry_count: usize,
    checksum: String,
    entries: Vec<IndexEntry>,
}

/// Summary of a snapshot on disk, without its entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub dimensions: Option<usize>,
    pub entry_count: usize,
}

/// Path of the snapshot file inside `dir`.
pub fn snapshot_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(SNAPSHOT_FILE)
}

/// Whether a snapshot file exists in `dir`.
pub fn exists(dir: impl AsRef<Path>) -> bool {
    snapshot_path(dir).is_file()
}

fn checksum(entries: &[IndexEntry]) -> Result<String> {
    let payload = serde_json::to_vec(entries).map_err(|e| RagError::SnapshotError {
        path: String::new(),
        message: format!("failed to serialize entries: {e}"),
    })?;
    Ok(format!("{:x}", Sha256::digest(&payload)))
}

fn snapshot_err(path: &Path, message: impl Into<String>) -> RagError {
    RagError::SnapshotError { path: path.display().to_string(), message: message.into() }
}

/// Save `index` to `dir`, replacing any existing snapshot atomically.
///
/// # Errors
///
/// Returns [`RagError::SnapshotError`] if the directory or file cannot be written.
pub async fn save(index: &VectorIndex, dir: impl AsRef<Path>) -> Result<SnapshotInfo> {
    let dir = dir.as_ref();
    let path = snapshot_path(dir);
    let tmp_path = dir.join(format!("{SNAPSHOT_FILE}.tmp"));

    let file = SnapshotFile {
        format_version: FORMAT_VERSION,
        created_at: Utc::now(),
        dimensions: index.dimensions(),
        entry_count: index.len(),
        checksum: checksum(index.entries())?,
        entries: index.entries().to_vec(),
    };
    let bytes = serde_json::to_vec(&file).map_err(|e| snapshot_err(&path, e.to_string()))?;

    tokio::fs::create_dir_all(dir).await.map_err(|e| snapshot_err(dir, e.to_string()))?;
    tokio::fs::write(&tmp_path, &bytes).await.map_err(|e| snapshot_err(&tmp_path, e.to_string()))?;
    tokio::fs::rename(&tmp_path, &path).await.map_err(|e| snapshot_err(&path, e.to_string()))?;

    info!(
        path = %path.display(),
        entry_count = file.entry_count,
        bytes = bytes.len(),
        "saved vector index snapshot"
    );
    Ok(SnapshotInfo {
        path,
        created_at: file.created_at,
        dimensions: file.dimensions,
        entry_count: file.entry_count,
    })
}

/// Load the snapshot stored in `dir`.
///
/// # Errors
///
/// Returns [`RagError::SnapshotError`] if the file is missing, unreadable,
/// from an unknown format version, or fails its checksum or dimension checks.
pub async fn load(dir: impl AsRef<Path>) -> Result<VectorIndex> {
    let path = snapshot_path(dir);
    let raw = tokio::fs::read(&path).await.map_err(|e| snapshot_err(&path, e.to_string()))?;
    let file: SnapshotFile =
        serde_json::from_slice(&raw).map_err(|e| snapshot_err(&path, e.to_string()))?;

    if file.format_version != FORMAT_VERSION {
        return Err(snapshot_err(
            &path,
            format!("unsupported format version {}", file.format_version),
        ));
    }
    if file.entry_count != file.entries.len() {
        return Err(snapshot_err(
            &path,
            format!("header lists {} entries, found {}", file.entry_count, file.entries.len()),
        ));
    }
    let computed = checksum(&file.entries)?;
    if computed != file.checksum {
        return Err(snapshot_err(
            &path,
            format!("checksum mismatch: expected {}, got {computed}", file.checksum),
        ));
    }
    debug!(checksum = %computed, "snapshot checksum verified");

    let index = VectorIndex::from_entries(file.entries)
        .map_err(|e| snapshot_err(&path, format!("snapshot validation failed: {e}")))?;
    if index.dimensions() != file.dimensions {
        return Err(snapshot_err(&path, "stored dimensions do not match entries"));
    }

    info!(path = %path.display(), entry_count = index.len(), "loaded vector index snapshot");
    Ok(index)
}
