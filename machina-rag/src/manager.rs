//! Startup index preparation: load the persisted snapshot or rebuild it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::chunking::{chunker_for, split_documents};
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::{IndexBuilder, VectorIndex};
use crate::loader::DirectoryLoader;
use crate::snapshot;

/// Name of the source-document directory inside the document store.
pub const SOURCE_DIR: &str = "PDFs";

/// Where a prepared index came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    /// Read from the existing snapshot without embedding.
    Snapshot,
    /// Built from a fresh document scan and saved.
    Rebuilt,
    /// A rebuild failed and the previous snapshot was used instead.
    FallbackSnapshot,
}

/// A ready-to-search index plus how it was obtained.
#[derive(Debug, Clone)]
pub struct PreparedIndex {
    pub index: VectorIndex,
    pub origin: IndexOrigin,
}

/// Owns the document store and decides between loading and rebuilding.
///
/// Rebuilds are serialised: at most one writes the snapshot at a time.
pub struct IndexManager {
    store_dir: PathBuf,
    source_dir: PathBuf,
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    loader: DirectoryLoader,
    rebuild_lock: Mutex<()>,
}

impl IndexManager {
    /// Manage the snapshot in `store_dir`, reading sources from `store_dir/PDFs`.
    pub fn new(
        store_dir: impl Into<PathBuf>,
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let store_dir = store_dir.into();
        let source_dir = store_dir.join(SOURCE_DIR);
        Self {
            store_dir,
            source_dir,
            config,
            embedder,
            loader: DirectoryLoader::new(),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Read sources from a different directory.
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    /// Produce a searchable index.
    ///
    /// Loads the snapshot when one exists and `force_rebuild` is false.
    /// Otherwise rebuilds from the sources; if that fails and a snapshot
    /// exists, the snapshot is used instead.
    ///
    /// # Errors
    ///
    /// Returns the rebuild error when no usable snapshot exists.
    pub async fn prepare(&self, force_rebuild: bool) -> Result<PreparedIndex> {
        let has_snapshot = snapshot::exists(&self.store_dir);

        if has_snapshot && !force_rebuild {
            match snapshot::load(&self.store_dir).await {
                Ok(index) => return Ok(PreparedIndex { index, origin: IndexOrigin::Snapshot }),
                Err(e) => warn!(error = %e, "snapshot unusable, rebuilding"),
            }
        }

        match self.rebuild().await {
            Ok(index) => Ok(PreparedIndex { index, origin: IndexOrigin::Rebuilt }),
            Err(e) if has_snapshot => {
                error!(error = %e, "rebuild failed, falling back to previous snapshot");
                let index = snapshot::load(&self.store_dir).await?;
                Ok(PreparedIndex { index, origin: IndexOrigin::FallbackSnapshot })
            }
            Err(e) => {
                error!(error = %e, "rebuild failed and no snapshot is available");
                Err(e)
            }
        }
    }

    /// Scan sources, chunk, embed and atomically replace the snapshot.
    ///
    /// The existing snapshot is untouched unless the whole rebuild succeeds.
    pub async fn rebuild(&self) -> Result<VectorIndex> {
        let _guard = self.rebuild_lock.lock().await;

        let documents = self.loader.load(&self.source_dir).await;
        let chunker = chunker_for(&self.config);
        let chunks = split_documents(&documents, chunker.as_ref());
        info!(
            document_count = documents.len(),
            chunk_count = chunks.len(),
            "split source documents"
        );

        let index = IndexBuilder::new(Arc::clone(&self.embedder))
            .batch_size(self.config.embed_batch_size)
            .concurrency(self.config.embed_concurrency)
            .build(chunks)
            .await?;

        snapshot::save(&index, &self.store_dir).await?;
        Ok(index)
    }
}
