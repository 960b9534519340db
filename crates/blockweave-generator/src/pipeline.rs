//! Request orchestration.
//!
//! [`Pipeline`] ties the assembler, the archive synchronizer and the site
//! repository together for the three requests the system serves: generating a
//! site, regenerating a whole site and regenerating one block. Every request
//! either stores a new archive and the matching site record, or leaves both
//! untouched: an uploaded archive whose record could not be written is removed
//! again.

use std::sync::Arc;

use blockweave_core::{Config, CostReport, RedactedPage, SiteRecord, Usage};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    archive::{ArchiveError, SiteArchive},
    assemble::{AssembleError, GenerationInput, GenerationStage, SiteAssembler, render_site},
    document::RenderedPage,
    gateway::ContentGateway,
    saga::Saga,
    store::{BlockStore, SiteRepository, StoreError},
    sync::{ArchiveSynchronizer, Deployment, SyncError, build_archive, scoped_rebuild},
};

/// Errors that abort a request.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("archive upload failed: {0}")]
    Archive(#[from] ArchiveError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, GenerateError>;

/// A site generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub name: String,
    pub prompt: String,
    pub country: String,
    pub language: String,
    pub template_id: String,
    /// Existing site to replace. A new site is created when unset.
    pub site_id: Option<String>,
    /// Overrides the configured domain.
    pub domain: Option<String>,
}

/// A request to regenerate one block instance of a stored site.
#[derive(Debug, Clone)]
pub struct RegenerateBlockRequest {
    pub site_id: String,
    pub page_filename: String,
    pub generation_id: String,
    /// Whether the caller expects a global block. The stored flag wins.
    pub is_global: bool,
}

/// Preview of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePreview {
    pub filename: String,
    pub html: String,
    pub has_errors: bool,
}

impl From<&RenderedPage> for PagePreview {
    fn from(page: &RenderedPage) -> Self {
        Self {
            filename: page.filename.clone(),
            html: page.preview_html.clone(),
            has_errors: page.has_errors,
        }
    }
}

/// Response of a request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    /// The stored record, with the detailed configuration.
    pub site: SiteRecord,
    pub previews: Vec<PagePreview>,
    /// Site configuration without variables.
    pub redacted: Vec<RedactedPage>,
    /// Cost of this request alone.
    pub cost: CostReport,
}

/// The generation pipeline.
pub struct Pipeline {
    store: Arc<dyn BlockStore>,
    gateway: Arc<dyn ContentGateway>,
    sites: Arc<dyn SiteRepository>,
    sync: ArchiveSynchronizer,
    config: Config,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn BlockStore>,
        gateway: Arc<dyn ContentGateway>,
        sites: Arc<dyn SiteRepository>,
        sync: ArchiveSynchronizer,
        config: Config,
    ) -> Self {
        Self {
            store,
            gateway,
            sites,
            sync,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn synchronizer(&self) -> &ArchiveSynchronizer {
        &self.sync
    }

    fn assembler(&self) -> SiteAssembler<'_> {
        SiteAssembler::new(
            self.store.as_ref(),
            self.gateway.as_ref(),
            &self.config.generation,
        )
    }

    fn deployment<'a>(&'a self, domain: Option<&'a str>) -> Deployment<'a> {
        Deployment {
            domain: domain.or(self.config.domain()),
            root_dir: Some(self.config.site.root_dir.as_str()),
        }
    }

    /// Generate a site from a template, creating or replacing its record.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerationOutput> {
        let template = self.store.fetch_template(&request.template_id).await?;
        let existing = match &request.site_id {
            Some(id) => Some(self.sites.fetch_site(id).await?),
            None => None,
        };
        // A full rebuild of an existing site keeps the images of its archive.
        let base = self
            .sync
            .load(existing.as_ref().and_then(|s| s.archive.as_deref()))
            .await?;

        info!(
            template = %template.id,
            pages = template.pages.len(),
            existing = existing.is_some(),
            "generating site"
        );

        let input = GenerationInput {
            prompt: &request.prompt,
            country: &request.country,
            language: &request.language,
        };
        let assembled = self.assembler().generate_site(&template, input).await?;

        let domain = request
            .domain
            .clone()
            .or_else(|| existing.as_ref().and_then(|s| s.domain.clone()));
        let archive = assembled.archive(base, self.deployment(domain.as_deref()));

        let now = Utc::now();
        let record = match existing {
            Some(previous) => SiteRecord {
                name: request.name.clone(),
                prompt: request.prompt.clone(),
                country: request.country.clone(),
                language: request.language.clone(),
                domain,
                template_id: template.id.clone(),
                details: assembled.details,
                usage: previous.usage + assembled.usage,
                updated_at: now,
                ..previous
            },
            None => SiteRecord {
                id: new_site_id(),
                name: request.name.clone(),
                prompt: request.prompt.clone(),
                country: request.country.clone(),
                language: request.language.clone(),
                domain,
                template_id: template.id.clone(),
                archive: None,
                details: assembled.details,
                usage: assembled.usage,
                created_at: now,
                updated_at: now,
            },
        };
        let is_new = request.site_id.is_none();

        let site = self.commit(record, &archive, is_new).await?;
        Ok(self.output(site, &assembled.rendered, assembled.usage))
    }

    /// Regenerate every page of a stored site with its stored inputs.
    pub async fn regenerate_site(&self, site_id: &str) -> Result<GenerationOutput> {
        let site = self.sites.fetch_site(site_id).await?;
        let request = GenerateRequest {
            name: site.name,
            prompt: site.prompt,
            country: site.country,
            language: site.language,
            template_id: site.template_id,
            site_id: Some(site.id),
            domain: site.domain,
        };
        self.generate(&request).await
    }

    /// Regenerate one block instance and rewrite the archive around it.
    ///
    /// Images owned by the old instance are dropped, the new instance's images
    /// are added and every other file is carried over.
    pub async fn regenerate_block(
        &self,
        request: &RegenerateBlockRequest,
    ) -> Result<GenerationOutput> {
        let site = self.sites.fetch_site(&request.site_id).await?;
        let prior = self.sync.load(site.archive.as_deref()).await?;

        let page = site
            .details
            .page_by_filename(&request.page_filename)
            .ok_or_else(|| SyncError::BlockNotFound {
                page: request.page_filename.clone(),
                generation_id: request.generation_id.clone(),
            })?;
        let scoped = scoped_rebuild(&prior, page, &request.generation_id)?;
        if let Some(block) = page.find_block(&request.generation_id) {
            if block.is_global != request.is_global {
                warn!(
                    block = %request.generation_id,
                    stored = block.is_global,
                    requested = request.is_global,
                    "global flag mismatch, using stored flag"
                );
            }
        }

        let input = GenerationInput {
            prompt: &site.prompt,
            country: &site.country,
            language: &site.language,
        };
        let mut details = site.details.clone();
        let regenerated = self
            .assembler()
            .regenerate_block(
                &mut details,
                &request.page_filename,
                &request.generation_id,
                input,
            )
            .await?;
        let rendered = render_site(&details, input)?;

        let mut base = scoped.archive;
        for image in &regenerated.images {
            base.insert(image.path.clone(), image.bytes.clone());
        }
        let archive = build_archive(
            base,
            &rendered,
            &details,
            self.deployment(site.domain.as_deref()),
        );
        info!(
            stage = %GenerationStage::ArchiveBuilt,
            removed = scoped.removed.len(),
            added = regenerated.images.len(),
            "generation stage"
        );

        let record = SiteRecord {
            details,
            usage: site.usage + regenerated.usage,
            updated_at: Utc::now(),
            ..site
        };

        let site = self.commit(record, &archive, false).await?;
        Ok(self.output(site, &rendered, regenerated.usage))
    }

    /// Upload `archive`, write `record` pointing at it and retire the prior archive.
    async fn commit(
        &self,
        mut record: SiteRecord,
        archive: &SiteArchive,
        is_new: bool,
    ) -> Result<SiteRecord> {
        let prior = record.archive.clone();
        let mut saga = Saga::new();

        let name = match self
            .sync
            .upload_replacement(archive, &record.name, &mut saga)
            .await
        {
            Ok(name) => name,
            Err(e) => {
                warn!(stage = %GenerationStage::Aborted, error = %e, "archive upload failed");
                return Err(e.into());
            }
        };
        record.archive = Some(name.clone());

        let written = if is_new {
            self.sites.insert_site(&record).await
        } else {
            self.sites.update_site(&record).await
        };
        if let Err(e) = written {
            warn!(
                stage = %GenerationStage::Aborted,
                site = %record.id,
                error = %e,
                "site record write failed"
            );
            saga.compensate(self.sync.archives()).await;
            return Err(e.into());
        }

        saga.commit();
        self.sync.retire(prior.as_deref(), &name).await;

        info!(site = %record.id, archive = %name, "site stored");
        Ok(record)
    }

    fn output(&self, site: SiteRecord, rendered: &[RenderedPage], usage: Usage) -> GenerationOutput {
        GenerationOutput {
            previews: rendered.iter().map(PagePreview::from).collect(),
            redacted: site.details.redacted(),
            cost: usage.price(&self.config.pricing),
            site,
        }
    }
}

fn new_site_id() -> String {
    let suffix: u64 = rand::thread_rng().r#gen();
    format!("{}-{suffix:016x}", Utc::now().format("%Y%m%d%H%M%S"))
}
