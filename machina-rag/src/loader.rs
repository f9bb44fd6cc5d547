//! Source document discovery and loading.
//!
//! [`DirectoryLoader`] walks a directory tree and turns every supported file
//! into one or more [`Document`]s. PDFs yield one document per page; plain
//! text and markdown files yield one document each.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{Document, PAGE_KEY, SOURCE_KEY};
use crate::error::{RagError, Result};

const DEFAULT_EXTENSIONS: [&str; 4] = ["pdf", "txt", "md", "markdown"];

/// Loads documents from a directory tree.
///
/// # Example
///
/// ```rust,ignore
/// use machina_rag::DirectoryLoader;
///
/// let documents = DirectoryLoader::new().load("./docs/PDFs").await;
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    extensions: Vec<String>,
}

impl Default for DirectoryLoader {
    fn default() -> Self {
        Self { extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect() }
    }
}

impl DirectoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict loading to the given file extensions (without the dot).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(|e| e.into().to_ascii_lowercase()).collect();
        self
    }

    /// List matching files under `root`, sorted by path.
    ///
    /// A missing root yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IngestionError`] if `root` exists but is not a directory.
    pub fn discover(&self, root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let root = root.as_ref();
        if !root.exists() {
            return Ok(Vec::new());
        }
        if !root.is_dir() {
            return Err(RagError::IngestionError {
                path: root.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        let mut files = WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.matches(entry.path()))
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();

        files.sort();
        Ok(files)
    }

    /// Load every supported file under `root`.
    ///
    /// Never fails: a missing or unreadable directory, or an unreadable file,
    /// is logged and skipped.
    pub async fn load(&self, root: impl AsRef<Path>) -> Vec<Document> {
        let root = root.as_ref();
        let files = match self.discover(root) {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "skipping document directory");
                return Vec::new();
            }
        };
        if files.is_empty() {
            warn!(dir = %root.display(), "no source documents found");
        }

        let mut documents = Vec::new();
        for path in files {
            match load_file(root, &path).await {
                Ok(docs) => {
                    debug!(file = %path.display(), count = docs.len(), "loaded file");
                    documents.extend(docs);
                }
                Err(e) => warn!(error = %e, "skipping unreadable file"),
            }
        }

        info!(dir = %root.display(), document_count = documents.len(), "loaded documents");
        documents
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

async fn load_file(root: &Path, path: &Path) -> Result<Vec<Document>> {
    let relative = path.strip_prefix(root).unwrap_or(path).display().to_string();
    let source = path.display().to_string();
    let is_pdf = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        let pages = extract_pdf_pages(path).await?;
        return Ok(pages
            .into_iter()
            .map(|(page, text)| {
                Document::new(format!("{relative}#{page}"), text)
                    .with_metadata(SOURCE_KEY, source.clone())
                    .with_metadata(PAGE_KEY, page.to_string())
            })
            .collect());
    }

    let text = tokio::fs::read_to_string(path).await.map_err(|e| RagError::IngestionError {
        path: source.clone(),
        message: e.to_string(),
    })?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![Document::new(relative, text).with_metadata(SOURCE_KEY, source)])
}

#[cfg(feature = "pdf")]
async fn extract_pdf_pages(path: &Path) -> Result<Vec<(usize, String)>> {
    let source = path.display().to_string();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RagError::IngestionError { path: source.clone(), message: e.to_string() })?;

    let text = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| RagError::IngestionError { path: source.clone(), message: e.to_string() })?
    .map_err(|message| RagError::IngestionError { path: source.clone(), message })?;

    Ok(split_pages(&text))
}

#[cfg(not(feature = "pdf"))]
async fn extract_pdf_pages(path: &Path) -> Result<Vec<(usize, String)>> {
    Err(RagError::IngestionError {
        path: path.display().to_string(),
        message: "PDF support is disabled (enable the `pdf` feature)".to_string(),
    })
}

/// Split extracted PDF text into numbered pages on form feeds, dropping blank pages.
#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn split_pages(text: &str) -> Vec<(usize, String)> {
    text.split('\x0C')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| (i + 1, page.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn missing_directory_yields_no_documents() {
        let temp = tempfile::tempdir().unwrap();
        let docs = DirectoryLoader::new().load(temp.path().join("PDFs")).await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn empty_directory_yields_no_documents() {
        let temp = tempfile::tempdir().unwrap();
        assert!(DirectoryLoader::new().load(temp.path()).await.is_empty());
    }

    #[tokio::test]
    async fn loads_supported_files_in_path_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("b.txt"), "Drill feeds and speeds").unwrap();
        fs::write(root.join("a.md"), "# Endmills\nUse carbide for steel.").unwrap();
        fs::write(root.join("nested/c.txt"), "Thread milling basics").unwrap();
        fs::write(root.join("notes.csv"), "ignored,row").unwrap();
        fs::write(root.join("blank.txt"), "   \n").unwrap();

        let docs = DirectoryLoader::new().load(root).await;
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "a.md");
        assert_eq!(ids[1], "b.txt");
        assert!(ids[2].ends_with("c.txt"));
        assert!(docs[0].metadata[SOURCE_KEY].ends_with("a.md"));
    }

    #[tokio::test]
    async fn extension_filter_is_configurable() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.md"), "markdown").unwrap();
        fs::write(temp.path().join("b.txt"), "text").unwrap();

        let docs = DirectoryLoader::new().with_extensions(["TXT"]).load(temp.path()).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "b.txt");
    }

    #[test]
    fn file_root_is_an_ingestion_error() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            DirectoryLoader::new().discover(&file),
            Err(RagError::IngestionError { .. })
        ));
    }

    #[test]
    fn pages_split_on_form_feed() {
        let pages = split_pages("first page\x0C\x0C third page \x0C");
        assert_eq!(pages, vec![(1, "first page".to_string()), (3, "third page".to_string())]);
    }
}
