//! Block packages, site templates and site records.
//!
//! The pipeline only needs a handful of fetch/insert/update operations from its
//! persistence layer, expressed here as the [`BlockStore`] and
//! [`SiteRepository`] traits. [`BlockCatalog`] is an in-memory store that can
//! be loaded from a directory tree:
//!
//! ```text
//! blocks/<category>/<package>/definition.json
//! blocks/<category>/<package>/template.html
//! blocks/<category>/<package>/styles.css
//! templates/<id>.json
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use blockweave_core::{BlockPackage, CoreError, FieldSchema, SiteRecord, SiteTemplate};
use rand::seq::SliceRandom;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No active package exists for the category.
    #[error("no active block found for category: {0}")]
    BlockNotFound(String),

    /// Unknown template id.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Unknown site id.
    #[error("site not found: {0}")]
    SiteNotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed package on disk.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Read access to block packages and site templates.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Pick a random active package of the given category.
    async fn fetch_random_active_block(&self, category: &str) -> Result<BlockPackage>;

    /// Fetch a site template by id.
    async fn fetch_template(&self, id: &str) -> Result<SiteTemplate>;
}

/// Persistence of generated sites.
#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn fetch_site(&self, id: &str) -> Result<SiteRecord>;

    async fn insert_site(&self, record: &SiteRecord) -> Result<()>;

    async fn update_site(&self, record: &SiteRecord) -> Result<()>;

    async fn delete_site(&self, id: &str) -> Result<()>;
}

/// `definition.json` of a block package.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageDefinition {
    #[serde(default)]
    name: Option<String>,

    #[serde(default = "default_active")]
    is_active: bool,

    #[serde(default)]
    variables: FieldSchema,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    package: BlockPackage,
    active: bool,
}

/// In-memory block and template catalog.
#[derive(Debug, Clone, Default)]
pub struct BlockCatalog {
    blocks: BTreeMap<String, Vec<CatalogEntry>>,
    templates: BTreeMap<String, SiteTemplate>,
}

impl BlockCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active package.
    #[must_use]
    pub fn with_block(mut self, package: BlockPackage) -> Self {
        self.insert_block(package, true);
        self
    }

    /// Add a template.
    #[must_use]
    pub fn with_template(mut self, template: SiteTemplate) -> Self {
        self.insert_template(template);
        self
    }

    pub fn insert_block(&mut self, package: BlockPackage, active: bool) {
        self.blocks
            .entry(package.category.clone())
            .or_default()
            .push(CatalogEntry { package, active });
    }

    pub fn insert_template(&mut self, template: SiteTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Categories with at least one active package.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.blocks
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.active))
            .map(|(category, _)| category.as_str())
    }

    /// Every package with its active flag.
    pub fn packages(&self) -> impl Iterator<Item = (&BlockPackage, bool)> {
        self.blocks
            .values()
            .flatten()
            .map(|entry| (&entry.package, entry.active))
    }

    pub fn templates(&self) -> impl Iterator<Item = &SiteTemplate> {
        self.templates.values()
    }

    /// Number of packages, active or not.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    /// Load packages from `blocks_dir` and templates from `templates_dir`.
    ///
    /// A missing directory yields an empty section rather than an error.
    pub fn from_dirs(blocks_dir: &Path, templates_dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();

        if blocks_dir.is_dir() {
            for package_dir in package_dirs(blocks_dir) {
                let (package, active) = load_package(&package_dir)?;
                debug!(
                    id = %package.id,
                    category = %package.category,
                    active,
                    "loaded block package"
                );
                catalog.insert_block(package, active);
            }
        } else {
            warn!(dir = %blocks_dir.display(), "blocks directory does not exist");
        }

        if templates_dir.is_dir() {
            for entry in WalkDir::new(templates_dir)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            {
                let template = load_template(entry.path())?;
                catalog.insert_template(template);
            }
        }

        info!(
            blocks = catalog.block_count(),
            templates = catalog.templates.len(),
            "loaded catalog"
        );

        Ok(catalog)
    }
}

/// Directories exactly two levels below the root: `<category>/<package>`.
fn package_dirs(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

fn load_package(dir: &Path) -> Result<(BlockPackage, bool)> {
    let category = dir
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .ok_or_else(|| CoreError::invalid_package(dir, "cannot determine category"))?
        .to_string();
    let dir_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CoreError::invalid_package(dir, "invalid package directory name"))?
        .to_string();

    let read = |file: &str| -> Result<String> {
        let path = dir.join(file);
        if !path.exists() {
            return Err(CoreError::invalid_package(dir, format!("{file} is missing")).into());
        }
        Ok(std::fs::read_to_string(path)?)
    };

    let definition: PackageDefinition = serde_json::from_str(&read("definition.json")?)
        .map_err(|e| CoreError::invalid_package(dir, format!("definition.json: {e}")))?;
    let markup = read("template.html")?;
    let style = read("styles.css")?;

    if markup.trim().is_empty() {
        return Err(CoreError::invalid_package(dir, "template.html cannot be empty").into());
    }

    let id = definition.name.unwrap_or(dir_name);

    Ok((
        BlockPackage {
            id,
            category,
            markup,
            style,
            fields: definition.variables,
        },
        definition.is_active,
    ))
}

fn load_template(path: &Path) -> Result<SiteTemplate> {
    let content = std::fs::read_to_string(path)?;
    let mut template: SiteTemplate = serde_json::from_str(&content)
        .map_err(|e| CoreError::invalid_package(path, format!("template: {e}")))?;

    if template.id.is_empty() {
        template.id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }

    Ok(template)
}

#[async_trait]
impl BlockStore for BlockCatalog {
    async fn fetch_random_active_block(&self, category: &str) -> Result<BlockPackage> {
        let active: Vec<&CatalogEntry> = self
            .blocks
            .get(category)
            .map(|entries| entries.iter().filter(|e| e.active).collect())
            .unwrap_or_default();

        active
            .choose(&mut rand::thread_rng())
            .map(|entry| entry.package.clone())
            .ok_or_else(|| StoreError::BlockNotFound(category.to_string()))
    }

    async fn fetch_template(&self, id: &str) -> Result<SiteTemplate> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::TemplateNotFound(id.to_string()))
    }
}

/// Site repository backed by one JSON file per site.
#[derive(Debug, Clone)]
pub struct FsSiteRepository {
    dir: PathBuf,
}

impl FsSiteRepository {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write(&self, record: &SiteRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(self.record_path(&record.id), json).await?;
        debug!(id = %record.id, "wrote site record");
        Ok(())
    }
}

#[async_trait]
impl SiteRepository for FsSiteRepository {
    async fn fetch_site(&self, id: &str) -> Result<SiteRecord> {
        let path = self.record_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SiteNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn insert_site(&self, record: &SiteRecord) -> Result<()> {
        self.write(record).await
    }

    async fn update_site(&self, record: &SiteRecord) -> Result<()> {
        if !tokio::fs::try_exists(self.record_path(&record.id)).await? {
            return Err(StoreError::SiteNotFound(record.id.clone()));
        }
        self.write(record).await
    }

    async fn delete_site(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::SiteNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use blockweave_core::{FieldKind, SiteDetails, Usage};
    use chrono::Utc;

    use super::*;

    fn package(id: &str, category: &str) -> BlockPackage {
        BlockPackage {
            id: id.to_string(),
            category: category.to_string(),
            markup: "<section id=\"{{ _blockId }}\"></section>".to_string(),
            style: String::new(),
            fields: FieldSchema::new(),
        }
    }

    fn write_package(root: &Path, category: &str, name: &str, definition: &str) {
        let dir = root.join(category).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("definition.json"), definition).unwrap();
        fs::write(dir.join("template.html"), "<h1>{{ title.value }}</h1>").unwrap();
        fs::write(dir.join("styles.css"), "#_blockId h1 { color: red; }").unwrap();
    }

    #[tokio::test]
    async fn test_fetch_random_active_block() {
        let mut catalog = BlockCatalog::new().with_block(package("hero-a", "hero"));
        catalog.insert_block(package("hero-b", "hero"), false);

        for _ in 0..10 {
            let block = catalog.fetch_random_active_block("hero").await.unwrap();
            assert_eq!(block.id, "hero-a");
        }
    }

    #[tokio::test]
    async fn test_missing_category() {
        let catalog = BlockCatalog::new();
        let err = catalog.fetch_random_active_block("footer").await.unwrap_err();
        assert!(matches!(err, StoreError::BlockNotFound(c) if c == "footer"));
    }

    #[tokio::test]
    async fn test_load_from_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = dir.path().join("blocks");
        let templates = dir.path().join("templates");

        write_package(
            &blocks,
            "hero",
            "alpha",
            r#"{"name": "hero-alpha", "variables": {"title": {"type": "text"}}}"#,
        );
        write_package(
            &blocks,
            "footer",
            "plain",
            r#"{"isActive": false, "variables": {}}"#,
        );
        fs::create_dir_all(&templates).unwrap();
        fs::write(
            templates.join("landing.json"),
            r#"{"pages": [{"layout": [{"type": "hero"}]}]}"#,
        )
        .unwrap();

        let catalog = BlockCatalog::from_dirs(&blocks, &templates).unwrap();

        assert_eq!(catalog.block_count(), 2);
        assert_eq!(catalog.categories().collect::<Vec<_>>(), vec!["hero"]);

        let hero = catalog.fetch_random_active_block("hero").await.unwrap();
        assert_eq!(hero.id, "hero-alpha");
        assert_eq!(hero.fields.get("title").unwrap().kind, FieldKind::Text);
        assert!(hero.style.contains("#_blockId"));

        assert!(catalog.fetch_random_active_block("footer").await.is_err());

        let template = catalog.fetch_template("landing").await.unwrap();
        assert_eq!(template.id, "landing");
        assert!(matches!(
            catalog.fetch_template("other").await,
            Err(StoreError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_missing_package_file() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("hero").join("broken");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("definition.json"), "{}").unwrap();

        let err = BlockCatalog::from_dirs(dir.path(), &dir.path().join("none")).unwrap_err();
        assert!(err.to_string().contains("template.html is missing"));
    }

    fn record(id: &str) -> SiteRecord {
        SiteRecord {
            id: id.to_string(),
            name: "Cafe".to_string(),
            prompt: "a cafe".to_string(),
            country: "us".to_string(),
            language: "en".to_string(),
            domain: None,
            template_id: "landing".to_string(),
            archive: Some("site_cafe.tar".to_string()),
            details: SiteDetails::default(),
            usage: Usage::tokens(1, 1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fs_site_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsSiteRepository::new(dir.path().join("sites"));

        assert!(matches!(
            repo.update_site(&record("a")).await,
            Err(StoreError::SiteNotFound(_))
        ));

        repo.insert_site(&record("a")).await.unwrap();
        let mut loaded = repo.fetch_site("a").await.unwrap();
        assert_eq!(loaded.archive.as_deref(), Some("site_cafe.tar"));

        loaded.archive = Some("site_cafe_2.tar".to_string());
        repo.update_site(&loaded).await.unwrap();
        assert_eq!(
            repo.fetch_site("a").await.unwrap().archive.as_deref(),
            Some("site_cafe_2.tar")
        );

        repo.delete_site("a").await.unwrap();
        assert!(matches!(
            repo.fetch_site("a").await,
            Err(StoreError::SiteNotFound(_))
        ));
    }
}
