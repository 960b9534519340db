//! Site archives.
//!
//! A site archive is a flat set of files (pages, images, sitemap, proxy
//! config) kept in memory while it is being built and stored as a tar object.
//!
//! ```text
//! SiteArchive (path -> bytes) → tar → object_store
//! ```

use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;
use futures::StreamExt;
use object_store::{ObjectStore, path::Path};
use rand::Rng;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_tar as tar;
use tracing::{debug, info};

use crate::content::IMAGES_DIR;

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Tar encoding or decoding failed.
    #[error("archive encoding error: {0}")]
    Encoding(#[from] std::io::Error),

    /// The object store rejected an operation.
    #[error("archive storage error: {0}")]
    Storage(#[from] object_store::Error),

    /// The named archive does not exist.
    #[error("archive not found: {0}")]
    NotFound(String),
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// In-memory site archive keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteArchive {
    files: BTreeMap<String, Bytes>,
}

impl SiteArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Bytes>) {
        self.files.insert(path.into(), bytes.into());
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Bytes> {
        self.files.remove(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths under the image directory.
    pub fn image_paths(&self) -> impl Iterator<Item = &str> {
        self.paths().filter(|p| p.starts_with(IMAGES_DIR))
    }

    /// Drop everything except images.
    pub fn purge_non_images(&mut self) {
        self.files.retain(|path, _| path.starts_with(IMAGES_DIR));
    }

    /// Encode as a tar archive.
    pub async fn encode(&self) -> Result<Bytes> {
        let mut builder = tar::Builder::new(Vec::new());

        for (path, bytes) in &self.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            debug!(path = %path, size = bytes.len(), "adding file to archive");
            builder.append_data(&mut header, path, bytes.as_ref()).await?;
        }

        let buffer = builder.into_inner().await?;
        Ok(Bytes::from(buffer))
    }

    /// Decode a tar archive. Directory entries are skipped.
    pub async fn decode(bytes: &[u8]) -> Result<Self> {
        let mut archive = tar::Archive::new(bytes);
        let mut entries = archive.entries()?;
        let mut files = BTreeMap::new();

        while let Some(entry) = entries.next().await {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path()?.to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).await?;
            files.insert(path, Bytes::from(content));
        }

        Ok(Self { files })
    }
}

/// Archive name for a site: `site_{hint}_{16 hex}.tar`.
#[must_use]
pub fn archive_name(hint: &str) -> String {
    let clean: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_matches('_');
    let clean = if clean.is_empty() { "site" } else { clean };
    let suffix: u64 = rand::thread_rng().r#gen();
    format!("site_{clean}_{suffix:016x}.tar")
}

/// Named site archives in an object store.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    store: Arc<dyn ObjectStore>,
}

impl ArchiveStore {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload `archive` under a fresh name and return the name.
    pub async fn upload(&self, archive: &SiteArchive, hint: &str) -> Result<String> {
        let name = archive_name(hint);
        let bytes = archive.encode().await?;
        let size = bytes.len();

        self.store.put(&Path::from(name.as_str()), bytes.into()).await?;

        info!(archive = %name, size, files = archive.len(), "archive uploaded");
        Ok(name)
    }

    pub async fn download(&self, name: &str) -> Result<SiteArchive> {
        let result = match self.store.get(&Path::from(name)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(ArchiveError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;
        SiteArchive::decode(&bytes).await
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        self.store.delete(&Path::from(name)).await?;
        debug!(archive = %name, "archive removed");
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        match self.store.head(&Path::from(name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;

    fn sample() -> SiteArchive {
        let mut archive = SiteArchive::new();
        archive.insert("index.html", "<html></html>");
        archive.insert("images/img_a.png", vec![0u8, 1, 2, 3]);
        archive.insert("nginx.conf", "server {}");
        archive
    }

    #[tokio::test]
    async fn test_encode_decode() {
        let archive = sample();
        let bytes = archive.encode().await.unwrap();

        let decoded = SiteArchive::decode(&bytes).await.unwrap();

        assert_eq!(decoded, archive);
    }

    #[test]
    fn test_purge_non_images() {
        let mut archive = sample();
        archive.purge_non_images();

        assert_eq!(archive.paths().collect::<Vec<_>>(), vec!["images/img_a.png"]);
    }

    #[test]
    fn test_archive_name() {
        let name = archive_name("My Bakery!");
        assert!(name.starts_with("site_my_bakery_"));
        assert!(name.ends_with(".tar"));
        let hex = name
            .trim_start_matches("site_my_bakery_")
            .trim_end_matches(".tar");
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        assert!(archive_name("***").starts_with("site_site_"));
        assert_ne!(archive_name("a"), archive_name("a"));
    }

    #[tokio::test]
    async fn test_store_roundtrip() {
        let store = ArchiveStore::new(Arc::new(InMemory::new()));
        let archive = sample();

        let name = store.upload(&archive, "bakery").await.unwrap();
        assert!(store.exists(&name).await.unwrap());
        assert_eq!(store.download(&name).await.unwrap(), archive);

        store.remove(&name).await.unwrap();
        assert!(!store.exists(&name).await.unwrap());
        assert!(matches!(
            store.download(&name).await,
            Err(ArchiveError::NotFound(_))
        ));
    }
}
