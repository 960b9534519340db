//! Site assembly.
//!
//! Drives one generation run through its stages:
//!
//! ```text
//! PagesPlanned → GlobalBlocksResolved → PageBlocksResolved → ThemeResolved
//!     → PagesRendered → ArchiveBuilt
//! ```
//!
//! Any fatal error moves the run to `Aborted`. Block-level failures never do:
//! they are stored on the block instance and rendered as a fallback element.

use std::{collections::BTreeMap, fmt};

use blockweave_core::{
    BlockConfig, BlockPackage, FieldSchema, PageConfig, PlannedPage, SiteDetails, SiteTemplate,
    Usage, config::GenerationConfig, generation_id,
};
use futures::future::join_all;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    anchors::fill_anchors,
    archive::SiteArchive,
    content::{ArchiveImage, ContentRequest, FilledContent, fill_content},
    document::{Locale, RenderedPage, TemplateError, render_page},
    expand::Expansion,
    gateway::ContentGateway,
    pages::plan_pages,
    store::BlockStore,
    sync::{Deployment, build_archive},
    theme::{ThemeError, ThemeSynthesizer, default_theme, merge_theme},
};

/// Assembly errors. All of them abort the run.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Theme(#[from] ThemeError),

    #[error("page rendering failed: {0}")]
    Render(#[from] TemplateError),

    /// The block to regenerate does not exist.
    #[error("block {generation_id} not found on page {page}")]
    BlockNotFound { page: String, generation_id: String },
}

/// Result type for assembly operations.
pub type Result<T> = std::result::Result<T, AssembleError>;

/// Progress of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    PagesPlanned,
    GlobalBlocksResolved,
    PageBlocksResolved,
    ThemeResolved,
    PagesRendered,
    ArchiveBuilt,
    Aborted,
}

impl GenerationStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PagesPlanned => "pages-planned",
            Self::GlobalBlocksResolved => "global-blocks-resolved",
            Self::PageBlocksResolved => "page-blocks-resolved",
            Self::ThemeResolved => "theme-resolved",
            Self::PagesRendered => "pages-rendered",
            Self::ArchiveBuilt => "archive-built",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt and locale of a run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub prompt: &'a str,
    pub country: &'a str,
    pub language: &'a str,
}

impl<'a> GenerationInput<'a> {
    fn locale(&self) -> Locale<'a> {
        Locale {
            language: self.language,
            country: self.country,
        }
    }
}

/// One generated block, before it is bound to a slot.
#[derive(Debug, Clone)]
pub struct ResolvedBlock {
    pub category: String,
    /// `None` when no package could be fetched.
    pub package: Option<BlockPackage>,
    pub expansion: Expansion,
    pub content: FilledContent,
    pub error: Option<String>,
}

impl ResolvedBlock {
    fn failed(category: &str, package: Option<BlockPackage>, message: String) -> Self {
        Self {
            category: category.to_string(),
            package,
            expansion: Expansion::default(),
            content: FilledContent::default(),
            error: Some(message),
        }
    }

    /// Nav field of the package, if any.
    fn nav_field(&self) -> Option<&str> {
        self.package.as_ref().and_then(|p| p.fields.nav_field())
    }

    /// Bind to a slot: regroup nested values under `generation_id` and
    /// append the nested styles.
    #[must_use]
    pub fn to_config(&self, generation_id: &str, is_global: bool) -> BlockConfig {
        let Some(package) = &self.package else {
            return BlockConfig {
                block_id: String::new(),
                category: self.category.clone(),
                is_global,
                generation_id: generation_id.to_string(),
                definition: FieldSchema::new(),
                variables: Map::new(),
                has_error: true,
                error: self.error.clone(),
                markup: String::new(),
                style: String::new(),
            };
        };

        let (variables, style) = if self.error.is_some() {
            (Map::new(), package.style.clone())
        } else {
            let regrouped = self
                .expansion
                .regroup(self.content.values.clone(), generation_id);
            for error in &regrouped.errors {
                warn!(block = generation_id, error = %error, "nested block failed to render");
            }
            let style = if regrouped.style.is_empty() {
                package.style.clone()
            } else {
                format!("{}\n{}", package.style, regrouped.style)
            };
            (regrouped.variables, style)
        };

        BlockConfig {
            block_id: package.id.clone(),
            category: self.category.clone(),
            is_global,
            generation_id: generation_id.to_string(),
            definition: package.fields.clone(),
            variables,
            has_error: self.error.is_some(),
            error: self.error.clone(),
            markup: package.markup.clone(),
            style,
        }
    }
}

/// Navigation value for a nav field: one entry per page, empty for single-page sites.
#[must_use]
pub fn navigation_value(pages: &[PlannedPage], labels: Option<&[String]>) -> Value {
    let entries: Vec<Value> = if pages.len() > 1 {
        pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                let label = labels
                    .and_then(|l| l.get(index))
                    .filter(|l| !l.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| page.title.clone());
                json!({ "href": page.filename(), "label": label, "active": false })
            })
            .collect()
    } else {
        Vec::new()
    };
    json!({ "type": "nav", "value": entries })
}

/// Planned pages recovered from stored page configs, for navigation.
#[must_use]
pub fn planned_pages(details: &SiteDetails) -> Vec<PlannedPage> {
    details
        .pages
        .iter()
        .map(|page| PlannedPage {
            path: page.path.clone(),
            title: page.title.clone(),
            seo: page.seo.clone(),
            layout: Vec::new(),
        })
        .collect()
}

/// Output of a generation run.
#[derive(Debug, Clone)]
pub struct AssembledSite {
    pub details: SiteDetails,
    pub rendered: Vec<RenderedPage>,
    /// Images generated during the run, to be added to the archive.
    pub images: Vec<ArchiveImage>,
    pub usage: Usage,
}

impl AssembledSite {
    /// Archive holding `base`'s images, the generated images, pages, sitemap and proxy config.
    #[must_use]
    pub fn archive(&self, mut base: SiteArchive, deployment: Deployment<'_>) -> SiteArchive {
        for image in &self.images {
            base.insert(image.path.clone(), image.bytes.clone());
        }
        let archive = build_archive(base, &self.rendered, &self.details, deployment);
        info!(stage = %GenerationStage::ArchiveBuilt, files = archive.len(), "generation stage");
        archive
    }
}

/// Outcome of regenerating one block.
#[derive(Debug, Clone)]
pub struct RegeneratedBlock {
    pub images: Vec<ArchiveImage>,
    pub usage: Usage,
    /// Filenames of the pages whose configuration changed.
    pub pages: Vec<String>,
}

/// Assembles sites from a block store and a content gateway.
pub struct SiteAssembler<'a> {
    store: &'a dyn BlockStore,
    gateway: &'a dyn ContentGateway,
    generation: &'a GenerationConfig,
}

impl<'a> SiteAssembler<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn BlockStore,
        gateway: &'a dyn ContentGateway,
        generation: &'a GenerationConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            generation,
        }
    }

    /// Generate every page of `template`.
    pub async fn generate_site(
        &self,
        template: &SiteTemplate,
        input: GenerationInput<'_>,
    ) -> Result<AssembledSite> {
        let plan = plan_pages(
            self.gateway,
            template,
            input.prompt,
            input.country,
            input.language,
        )
        .await;
        info!(
            stage = %GenerationStage::PagesPlanned,
            pages = plan.pages.len(),
            fallback = plan.fallback,
            "generation stage"
        );

        let (theme, blocks) = tokio::join!(
            self.resolve_theme(input.prompt),
            self.resolve_pages(template, &plan.pages, input)
        );
        let (mut pages, images, block_usage) = blocks;
        let (theme, theme_usage) = match theme {
            Ok(theme) => theme,
            Err(e) => {
                warn!(stage = %GenerationStage::Aborted, error = %e, "generation aborted");
                return Err(e);
            }
        };
        info!(stage = %GenerationStage::ThemeResolved, variables = theme.len(), "generation stage");

        fill_anchors(&mut pages, None);

        let details = SiteDetails {
            pages,
            theme: merge_theme(&template.globals.css, &theme),
        };
        let rendered = render_site(&details, input)?;

        Ok(AssembledSite {
            details,
            rendered,
            images,
            usage: plan.usage + block_usage + theme_usage,
        })
    }

    async fn resolve_theme(&self, prompt: &str) -> Result<(BTreeMap<String, String>, Usage)> {
        let synthesizer =
            ThemeSynthesizer::new(self.gateway).with_attempts(self.generation.theme_attempts);
        match synthesizer.synthesize(prompt).await {
            Ok(theme) => Ok((theme.values, theme.usage)),
            Err(ThemeError::Exhausted { usage, message, .. }) if self.generation.theme_fallback => {
                warn!(error = %message, "theme generation failed, using default theme");
                Ok((default_theme(), usage))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_pages(
        &self,
        template: &SiteTemplate,
        plan: &[PlannedPage],
        input: GenerationInput<'_>,
    ) -> (Vec<PageConfig>, Vec<ArchiveImage>, Usage) {
        let globals = self.resolve_globals(template, plan, input).await;
        info!(
            stage = %GenerationStage::GlobalBlocksResolved,
            globals = globals.len(),
            "generation stage"
        );

        let mut usage: Usage = globals.values().map(|b| b.content.usage).sum();
        let mut images: Vec<ArchiveImage> = globals
            .values()
            .flat_map(|b| b.content.images.iter().cloned())
            .collect();

        let local_slots: Vec<(usize, usize, &str)> = plan
            .iter()
            .enumerate()
            .flat_map(|(page_index, page)| {
                page.layout
                    .iter()
                    .enumerate()
                    .map(move |(slot_index, slot)| (page_index, slot_index, slot.category.as_str()))
            })
            .filter(|(_, _, category)| !globals.contains_key(*category))
            .collect();

        let resolved = join_all(
            local_slots
                .iter()
                .map(|(_, _, category)| self.resolve_block(category, None, input)),
        )
        .await;

        let mut locals: BTreeMap<(usize, usize), ResolvedBlock> = BTreeMap::new();
        for ((page_index, slot_index, _), block) in local_slots.iter().zip(resolved) {
            usage += block.content.usage;
            images.extend(block.content.images.iter().cloned());
            locals.insert((*page_index, *slot_index), block);
        }
        info!(
            stage = %GenerationStage::PageBlocksResolved,
            blocks = locals.len(),
            failed = locals.values().filter(|b| b.error.is_some()).count(),
            "generation stage"
        );

        let pages = plan
            .iter()
            .enumerate()
            .map(|(page_index, page)| {
                let blocks = page
                    .layout
                    .iter()
                    .enumerate()
                    .filter_map(|(slot_index, slot)| {
                        let id = generation_id(&slot.category, slot_index);
                        if let Some(global) = globals.get(&slot.category) {
                            Some(global.to_config(&id, true))
                        } else {
                            locals
                                .get(&(page_index, slot_index))
                                .map(|local| local.to_config(&id, false))
                        }
                    })
                    .collect();
                PageConfig {
                    title: page.title.clone(),
                    path: page.path.clone(),
                    filename: page.filename(),
                    seo: page.seo.clone(),
                    blocks,
                }
            })
            .collect();

        (pages, images, usage)
    }

    async fn resolve_globals(
        &self,
        template: &SiteTemplate,
        plan: &[PlannedPage],
        input: GenerationInput<'_>,
    ) -> BTreeMap<String, ResolvedBlock> {
        let mut categories: Vec<&str> = Vec::new();
        for slot in &template.globals.blocks {
            if !categories.contains(&slot.category.as_str()) {
                categories.push(&slot.category);
            }
        }

        let packages = join_all(
            categories
                .iter()
                .map(|category| self.store.fetch_random_active_block(category)),
        )
        .await;

        let navigator = packages
            .iter()
            .position(|p| p.as_ref().is_ok_and(|p| p.fields.nav_field().is_some()));
        let navigation = (plan.len() > 1).then_some(plan);

        let resolved = join_all(categories.iter().zip(packages).enumerate().map(
            |(index, (category, package))| async move {
                match package {
                    Ok(package) => {
                        let nav = if navigator == Some(index) { navigation } else { None };
                        self.fill_package(package, nav, input).await
                    }
                    Err(e) => ResolvedBlock::failed(category, None, e.to_string()),
                }
            },
        ))
        .await;

        let labels = resolved
            .iter()
            .find_map(|b| b.content.navigation_labels.clone());
        let nav_value = navigation_value(plan, labels.as_deref());

        resolved
            .into_iter()
            .map(|mut block| {
                if block.error.is_none() {
                    if let Some(field) = block.nav_field().map(str::to_string) {
                        block.content.values.insert(field, nav_value.clone());
                    }
                }
                (block.category.clone(), block)
            })
            .collect()
    }

    /// Fetch a fresh package of `category` and fill it.
    pub async fn resolve_block(
        &self,
        category: &str,
        navigation: Option<&[PlannedPage]>,
        input: GenerationInput<'_>,
    ) -> ResolvedBlock {
        match self.store.fetch_random_active_block(category).await {
            Ok(package) => self.fill_package(package, navigation, input).await,
            Err(e) => {
                warn!(category, error = %e, "block unavailable");
                ResolvedBlock::failed(category, None, e.to_string())
            }
        }
    }

    async fn fill_package(
        &self,
        package: BlockPackage,
        navigation: Option<&[PlannedPage]>,
        input: GenerationInput<'_>,
    ) -> ResolvedBlock {
        let expansion = Expansion::expand(&package, self.store, self.generation.max_level).await;
        let schema = expansion.content_schema();
        let navigation = navigation.filter(|_| package.fields.nav_field().is_some());
        let request = ContentRequest {
            schema: &schema,
            category: &package.category,
            prompt: input.prompt,
            country: input.country,
            language: input.language,
            navigation,
        };

        match fill_content(self.gateway, &request).await {
            Ok(content) => {
                debug!(category = %package.category, package = %package.id, "block resolved");
                ResolvedBlock {
                    category: package.category.clone(),
                    package: Some(package),
                    expansion,
                    content,
                    error: None,
                }
            }
            Err(e) => {
                warn!(category = %package.category, error = %e, "block content failed");
                let category = package.category.clone();
                ResolvedBlock::failed(&category, Some(package), e.to_string())
            }
        }
    }

    /// Regenerate one block instance in `details`.
    ///
    /// A global block is replaced on every page that carries it; anchors are
    /// refilled on the affected pages only.
    pub async fn regenerate_block(
        &self,
        details: &mut SiteDetails,
        page_filename: &str,
        target_id: &str,
        input: GenerationInput<'_>,
    ) -> Result<RegeneratedBlock> {
        let not_found = || AssembleError::BlockNotFound {
            page: page_filename.to_string(),
            generation_id: target_id.to_string(),
        };
        let target = details
            .page_by_filename(page_filename)
            .and_then(|page| page.find_block(target_id))
            .ok_or_else(not_found)?;
        let category = target.category.clone();
        let is_global = target.is_global;

        let plan = planned_pages(details);
        let wants_nav = is_global && plan.len() > 1;
        let mut block = self
            .resolve_block(&category, wants_nav.then_some(plan.as_slice()), input)
            .await;

        if is_global && block.error.is_none() {
            if let Some(field) = block.nav_field().map(str::to_string) {
                let labels = block.content.navigation_labels.clone();
                block
                    .content
                    .values
                    .insert(field, navigation_value(&plan, labels.as_deref()));
            }
        }

        let mut changed = Vec::new();
        for page in &mut details.pages {
            let in_scope = if is_global {
                true
            } else {
                page.filename == page_filename
            };
            if !in_scope {
                continue;
            }
            let mut touched = false;
            for slot in &mut page.blocks {
                let matches = if is_global {
                    slot.is_global && slot.category == category
                } else {
                    slot.generation_id == target_id
                };
                if matches {
                    *slot = block.to_config(&slot.generation_id, is_global);
                    touched = true;
                }
            }
            if touched {
                changed.push(page.filename.clone());
            }
        }

        if is_global {
            for filename in &changed {
                fill_anchors(&mut details.pages, Some(filename));
            }
        } else {
            fill_anchors(&mut details.pages, Some(page_filename));
        }

        info!(
            category = %category,
            block = target_id,
            global = is_global,
            pages = changed.len(),
            failed = block.error.is_some(),
            "block regenerated"
        );

        Ok(RegeneratedBlock {
            images: block.content.images,
            usage: block.content.usage,
            pages: changed,
        })
    }
}

/// Render every page of `details` with its stored theme.
pub fn render_site(details: &SiteDetails, input: GenerationInput<'_>) -> Result<Vec<RenderedPage>> {
    let rendered = details
        .pages
        .iter()
        .map(|page| render_page(page, &details.theme, input.locale()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    info!(
        stage = %GenerationStage::PagesRendered,
        pages = rendered.len(),
        with_errors = rendered.iter().filter(|p| p.has_errors).count(),
        "generation stage"
    );
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use blockweave_core::SeoMetadata;

    use super::*;

    fn planned(path: &str, title: &str) -> PlannedPage {
        PlannedPage {
            path: path.to_string(),
            title: title.to_string(),
            seo: SeoMetadata::default(),
            layout: Vec::new(),
        }
    }

    #[test]
    fn test_navigation_value() {
        let pages = vec![planned("/", "Home"), planned("/services", "Services")];
        let labels = vec!["Accueil".to_string(), String::new()];

        let nav = navigation_value(&pages, Some(&labels));

        assert_eq!(
            nav,
            json!({"type": "nav", "value": [
                {"href": "index.html", "label": "Accueil", "active": false},
                {"href": "services.html", "label": "Services", "active": false}
            ]})
        );
    }

    #[test]
    fn test_single_page_navigation_is_empty() {
        let nav = navigation_value(&[planned("/", "Home")], None);
        assert_eq!(nav, json!({"type": "nav", "value": []}));
    }

    #[test]
    fn test_failed_block_config() {
        let block = ResolvedBlock::failed("hero", None, "no active block".to_string());
        let config = block.to_config("hero-1", false);

        assert!(config.has_error);
        assert_eq!(config.error.as_deref(), Some("no active block"));
        assert_eq!(config.generation_id, "hero-1");
        assert_eq!(config.category, "hero");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(GenerationStage::PagesPlanned.to_string(), "pages-planned");
        assert_eq!(GenerationStage::Aborted.as_str(), "aborted");
    }
}
