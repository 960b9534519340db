//! Archive synchronization.
//!
//! A full rebuild keeps only the images of the previous archive and writes
//! every page, the sitemap and the proxy config again. A scoped rebuild first
//! drops exactly the images owned by one block instance so that its
//! regenerated images can take their place.

use std::collections::BTreeSet;

use blockweave_core::{PageConfig, SiteDetails};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    archive::{ArchiveError, ArchiveStore, SiteArchive},
    content::IMAGES_DIR,
    document::RenderedPage,
    proxy::nginx_config,
    saga::{Compensation, Saga},
    sitemap::SitemapGenerator,
};

pub const SITEMAP_FILE: &str = "sitemap.xml";
pub const PROXY_CONFIG_FILE: &str = "nginx.conf";

/// Synchronization errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The block to regenerate is not on the page.
    #[error("block {generation_id} not found on page {page}")]
    BlockNotFound { page: String, generation_id: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Where the archive will be served.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deployment<'a> {
    pub domain: Option<&'a str>,
    pub root_dir: Option<&'a str>,
}

/// Rebuild `base` for `pages`: keep images, write pages, sitemap and proxy config.
#[must_use]
pub fn build_archive(
    mut base: SiteArchive,
    pages: &[RenderedPage],
    details: &SiteDetails,
    deployment: Deployment<'_>,
) -> SiteArchive {
    base.purge_non_images();

    for page in pages {
        base.insert(page.filename.clone(), page.html.clone());
    }

    match deployment.domain.map(SitemapGenerator::new) {
        Some(Ok(generator)) => base.insert(SITEMAP_FILE, generator.generate(&details.pages)),
        Some(Err(e)) => warn!(error = %e, "sitemap skipped"),
        None => debug!("no domain configured, sitemap skipped"),
    }

    if deployment.domain.is_some() {
        base.insert(
            PROXY_CONFIG_FILE,
            nginx_config(deployment.domain, deployment.root_dir),
        );
    }

    debug!(files = base.len(), pages = pages.len(), "archive built");
    base
}

/// Archive paths referenced by `value`: every `images/` segment of a string,
/// up to the next quote or whitespace.
#[must_use]
pub fn image_references(value: &Value) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for (start, _) in s.match_indices(IMAGES_DIR) {
                let path = s[start..]
                    .split(|c: char| c == '"' || c == '\'' || c.is_whitespace())
                    .next()
                    .unwrap_or_default();
                found.insert(path.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, found)),
        _ => {}
    }
}

/// A working copy of an archive with one block's images removed.
#[derive(Debug, Clone)]
pub struct ScopedRebuild {
    pub archive: SiteArchive,
    /// Paths that were removed.
    pub removed: Vec<String>,
}

/// Drop the images owned by block `generation_id` of `page` from a copy of `prior`.
pub fn scoped_rebuild(
    prior: &SiteArchive,
    page: &PageConfig,
    generation_id: &str,
) -> Result<ScopedRebuild> {
    let block = page
        .find_block(generation_id)
        .ok_or_else(|| SyncError::BlockNotFound {
            page: page.filename.clone(),
            generation_id: generation_id.to_string(),
        })?;

    let mut archive = prior.clone();
    let mut removed = Vec::new();
    for value in block.variables.values() {
        for path in image_references(value) {
            if archive.remove(&path).is_some() {
                removed.push(path);
            }
        }
    }
    removed.sort();
    removed.dedup();

    debug!(
        page = %page.filename,
        block = generation_id,
        removed = removed.len(),
        "scoped archive prepared"
    );

    Ok(ScopedRebuild { archive, removed })
}

/// Uploads replacement archives and retires the ones they replace.
#[derive(Debug, Clone)]
pub struct ArchiveSynchronizer {
    archives: ArchiveStore,
}

impl ArchiveSynchronizer {
    #[must_use]
    pub fn new(archives: ArchiveStore) -> Self {
        Self { archives }
    }

    #[must_use]
    pub fn archives(&self) -> &ArchiveStore {
        &self.archives
    }

    /// Load the archive named `name`, or an empty one.
    pub async fn load(&self, name: Option<&str>) -> Result<SiteArchive> {
        match name {
            Some(name) => Ok(self.archives.download(name).await?),
            None => Ok(SiteArchive::new()),
        }
    }

    /// Upload `archive` under a new name, recording its removal in `saga`.
    pub async fn upload_replacement(
        &self,
        archive: &SiteArchive,
        hint: &str,
        saga: &mut Saga,
    ) -> Result<String> {
        let name = self.archives.upload(archive, hint).await?;
        saga.record(Compensation::RemoveArchive(name.clone()));
        Ok(name)
    }

    /// Remove the archive a replacement superseded. Failures only warn.
    pub async fn retire(&self, prior: Option<&str>, replacement: &str) {
        let Some(prior) = prior.filter(|p| *p != replacement) else {
            return;
        };
        match self.archives.remove(prior).await {
            Ok(()) => info!(archive = %prior, "previous archive retired"),
            Err(e) => warn!(archive = %prior, error = %e, "failed to retire previous archive"),
        }
    }

    /// Upload `archive` and retire `prior` once the upload is stored.
    pub async fn replace_archive(
        &self,
        archive: &SiteArchive,
        hint: &str,
        prior: Option<&str>,
    ) -> Result<String> {
        let mut saga = Saga::new();
        let name = self.upload_replacement(archive, hint, &mut saga).await?;
        saga.commit();
        self.retire(prior, &name).await;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use blockweave_core::{BlockConfig, FieldSchema};
    use object_store::memory::InMemory;
    use serde_json::json;

    use super::*;

    fn rendered(filename: &str, html: &str) -> RenderedPage {
        RenderedPage {
            filename: filename.to_string(),
            path: String::new(),
            title: String::new(),
            html: html.to_string(),
            preview_html: html.to_string(),
            has_errors: false,
            render_errors: Vec::new(),
        }
    }

    fn page_with(generation_id: &str, variables: Value) -> PageConfig {
        PageConfig {
            title: "Home".to_string(),
            path: "/".to_string(),
            filename: "index.html".to_string(),
            seo: Default::default(),
            blocks: vec![BlockConfig {
                block_id: "hero-a".to_string(),
                category: "hero".to_string(),
                is_global: false,
                generation_id: generation_id.to_string(),
                definition: FieldSchema::new(),
                variables: variables.as_object().cloned().unwrap_or_default(),
                has_error: false,
                error: None,
                markup: String::new(),
                style: String::new(),
            }],
        }
    }

    #[test]
    fn test_build_archive_keeps_images_only() {
        let mut base = SiteArchive::new();
        base.insert("images/img_a.png", vec![1u8]);
        base.insert("old.html", "stale");
        base.insert(SITEMAP_FILE, "stale");

        let archive = build_archive(
            base,
            &[rendered("index.html", "<html>new</html>")],
            &SiteDetails::default(),
            Deployment::default(),
        );

        let paths: Vec<_> = archive.paths().collect();
        assert_eq!(paths, vec!["images/img_a.png", "index.html"]);
        assert_eq!(archive.get("index.html").unwrap().as_ref(), b"<html>new</html>");
    }

    #[test]
    fn test_build_archive_with_domain() {
        let details = SiteDetails {
            pages: vec![page_with("hero-0", json!({}))],
            theme: Default::default(),
        };
        let archive = build_archive(
            SiteArchive::new(),
            &[rendered("index.html", "x")],
            &details,
            Deployment {
                domain: Some("bakery.example"),
                root_dir: None,
            },
        );

        assert!(archive.contains(SITEMAP_FILE));
        let conf = String::from_utf8(archive.get(PROXY_CONFIG_FILE).unwrap().to_vec()).unwrap();
        assert!(conf.contains("server_name bakery.example;"));
    }

    #[test]
    fn test_invalid_domain_skips_sitemap_only() {
        let archive = build_archive(
            SiteArchive::new(),
            &[],
            &SiteDetails::default(),
            Deployment {
                domain: Some("http://"),
                root_dir: None,
            },
        );

        assert!(!archive.contains(SITEMAP_FILE));
        assert!(archive.contains(PROXY_CONFIG_FILE));
    }

    #[test]
    fn test_image_references() {
        let refs = image_references(&json!({
            "logo": {"href": "images/img_a.png", "href64": "https://cdn/a.png"},
            "cards": {"values": [{"icon": {"href": "./images/img_b.png"}}]},
            "text": {"value": "no images here"}
        }));

        assert_eq!(
            refs.into_iter().collect::<Vec<_>>(),
            vec!["images/img_a.png", "images/img_b.png"]
        );
    }

    #[test]
    fn test_image_references_in_markup() {
        let refs = image_references(&json!({
            "inner": {
                "htmlContent": "<div><img src=\"images/img_a.png\" alt=\"A\"><img src='images/img_b.png'></div>",
                "variables": {"photo": {"href": "images/img_c.png"}}
            }
        }));

        assert_eq!(
            refs.into_iter().collect::<Vec<_>>(),
            vec!["images/img_a.png", "images/img_b.png", "images/img_c.png"]
        );
    }

    #[test]
    fn test_scoped_rebuild_removes_owned_images() {
        let mut prior = SiteArchive::new();
        prior.insert("images/img_a.png", vec![1u8]);
        prior.insert("images/img_other.png", vec![2u8]);
        prior.insert("index.html", "x");
        let page = page_with("hero-0", json!({"photo": {"href": "images/img_a.png"}}));

        let scoped = scoped_rebuild(&prior, &page, "hero-0").unwrap();

        assert_eq!(scoped.removed, vec!["images/img_a.png"]);
        assert!(!scoped.archive.contains("images/img_a.png"));
        assert!(scoped.archive.contains("images/img_other.png"));
        assert!(prior.contains("images/img_a.png"));
    }

    #[test]
    fn test_scoped_rebuild_unknown_block() {
        let page = page_with("hero-0", json!({}));
        let result = scoped_rebuild(&SiteArchive::new(), &page, "hero-9");
        assert!(matches!(result, Err(SyncError::BlockNotFound { .. })));
    }

    #[tokio::test]
    async fn test_replace_archive_retires_prior() {
        let sync = ArchiveSynchronizer::new(ArchiveStore::new(Arc::new(InMemory::new())));
        let first = sync.replace_archive(&SiteArchive::new(), "bakery", None).await.unwrap();

        let second = sync
            .replace_archive(&SiteArchive::new(), "bakery", Some(&first))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(!sync.archives().exists(&first).await.unwrap());
        assert!(sync.archives().exists(&second).await.unwrap());
    }
}
