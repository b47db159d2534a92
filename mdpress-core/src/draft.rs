//! Draft persistence across sessions
//!
//! The draft is two strings under fixed keys in a key-value store. Nothing
//! is versioned; a missing key falls back to the built-in sample.

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::doc::{Document, DEFAULT_TITLE, SAMPLE_TEXT};

/// Key holding the draft text
pub const DRAFT_KEY: &str = "mdpress_draft";
/// Key holding the draft title
pub const TITLE_KEY: &str = "mdpress_title";

/// String key-value storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Store that lives for the process only
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single TOML file of string values
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// File name used inside the data directory
    pub const FILE_NAME: &'static str = "drafts.toml";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in `dir`, or the platform data directory when `dir` is `None`
    pub fn in_dir(dir: Option<&Path>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_dir().context("Could not determine a data directory")?,
        };
        Ok(Self::new(dir.join(Self::FILE_NAME)))
    }

    /// Platform-specific data directory
    pub fn default_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mdpress")
            .map(|proj_dirs| proj_dirs.data_dir().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Failed to parse store file: {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read store file: {}", self.path.display())),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string(&values).context("Failed to serialize store")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write store file: {}", self.path.display()))?;
        debug!("draft: wrote {key} to {}", self.path.display());
        Ok(())
    }
}

/// Saves and restores the current document
pub struct DraftStore<S> {
    store: S,
}

impl<S: KeyValueStore> DraftStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the saved draft. Each missing value falls back independently
    /// to the sample text or the default title.
    pub fn load(&self) -> Result<Document> {
        let text = self.store.get(DRAFT_KEY)?;
        let title = self.store.get(TITLE_KEY)?;
        if text.is_none() {
            info!("draft: no saved draft, starting from the sample document");
        }
        Ok(Document::new(
            text.unwrap_or_else(|| SAMPLE_TEXT.to_string()),
            title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        ))
    }

    /// Save text and title
    pub fn persist(&mut self, doc: &Document) -> Result<()> {
        self.store.set(DRAFT_KEY, &doc.text)?;
        self.store.set(TITLE_KEY, &doc.title)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_yields_sample() -> Result<()> {
        let drafts = DraftStore::new(MemoryStore::new());
        let doc = drafts.load()?;
        assert_eq!(doc, Document::sample());
        Ok(())
    }

    #[test]
    fn test_persist_then_load() -> Result<()> {
        let mut drafts = DraftStore::new(MemoryStore::new());
        let doc = Document::new("# Notes\n", "My notes");
        drafts.persist(&doc)?;
        assert_eq!(drafts.load()?, doc);
        Ok(())
    }

    #[test]
    fn test_empty_text_is_not_replaced_by_sample() -> Result<()> {
        let mut drafts = DraftStore::new(MemoryStore::new());
        drafts.persist(&Document::new("", ""))?;
        let doc = drafts.load()?;
        assert_eq!(doc.text, "");
        assert_eq!(doc.title, "");
        Ok(())
    }

    #[test]
    fn test_missing_title_falls_back_alone() -> Result<()> {
        let mut store = MemoryStore::new();
        store.set(DRAFT_KEY, "saved")?;
        let doc = DraftStore::new(store).load()?;
        assert_eq!(doc.text, "saved");
        assert_eq!(doc.title, DEFAULT_TITLE);
        Ok(())
    }

    #[test]
    fn test_file_store_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FileStore::in_dir(Some(&dir.path().join("nested")))?;
        let mut drafts = DraftStore::new(store);

        let doc = Document::new("line \"one\"\n\\(x\\)\n", "Title = with 'quotes'");
        drafts.persist(&doc)?;

        let reopened = DraftStore::new(FileStore::in_dir(Some(&dir.path().join("nested")))?);
        assert_eq!(reopened.load()?, doc);
        Ok(())
    }

    #[test]
    fn test_file_store_missing_file_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FileStore::new(dir.path().join("absent.toml"));
        assert_eq!(store.get(DRAFT_KEY)?, None);
        Ok(())
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(FileStore::FILE_NAME);
        fs::write(&path, "not [[[ toml")?;
        assert!(FileStore::new(path).get(DRAFT_KEY).is_err());
        Ok(())
    }
}
