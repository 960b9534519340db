//! Command implementations.

pub mod check;
pub mod generate;
pub mod regenerate;
pub mod regenerate_block;

use std::{path::Path, sync::Arc, time::Duration};

use blockweave_core::{Config, SiteRecord};
use blockweave_generator::{
    ArchiveStore, ArchiveSynchronizer, BlockCatalog, FsSiteRepository, GenerationOutput, Pipeline,
};
use color_eyre::eyre::{Result, WrapErr};
use object_store::local::LocalFileSystem;

use crate::openai::OpenAiGateway;

/// Where and how a command reports its result.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions<'a> {
    /// Directory to unpack the site archive into.
    pub export: Option<&'a Path>,
    /// Print the full response as JSON instead of a summary.
    pub json: bool,
}

/// Load configuration, layering `BLOCKWEAVE__*` environment overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    Config::load_with_env(path).wrap_err("Failed to load configuration")
}

/// Wire a pipeline to the local catalog, site records and archive directory,
/// and to the HTTP content gateway.
pub fn build_pipeline(config: Config) -> Result<Pipeline> {
    let storage = config.storage.clone();

    let catalog = BlockCatalog::from_dirs(&storage.blocks_dir, &storage.templates_dir)
        .wrap_err("Failed to load block catalog")?;

    std::fs::create_dir_all(&storage.archives_dir).wrap_err_with(|| {
        format!(
            "Failed to create archive directory: {}",
            storage.archives_dir.display()
        )
    })?;
    let archives = LocalFileSystem::new_with_prefix(&storage.archives_dir)
        .wrap_err("Failed to open archive directory")?;

    let gateway =
        OpenAiGateway::from_config(&config.gateway).wrap_err("Failed to configure content gateway")?;

    Ok(Pipeline::new(
        Arc::new(catalog),
        Arc::new(gateway),
        Arc::new(FsSiteRepository::new(storage.sites_dir)),
        ArchiveSynchronizer::new(ArchiveStore::new(Arc::new(archives))),
        config,
    ))
}

/// Unpack the stored archive of `site` under `dir`. Returns the number of files written.
pub async fn export_archive(pipeline: &Pipeline, site: &SiteRecord, dir: &Path) -> Result<usize> {
    let archive = pipeline
        .synchronizer()
        .load(site.archive.as_deref())
        .await
        .wrap_err("Failed to load site archive")?;

    for path in archive.paths() {
        let Some(bytes) = archive.get(path) else {
            continue;
        };
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .wrap_err_with(|| format!("Failed to write {}", target.display()))?;
        tracing::debug!(path = %target.display(), "exported file");
    }

    Ok(archive.len())
}

/// Print the outcome of a command and export the archive when asked to.
pub async fn report(
    pipeline: &Pipeline,
    output: &GenerationOutput,
    options: OutputOptions<'_>,
    duration: Duration,
) -> Result<()> {
    let exported = match options.export {
        Some(dir) => Some(export_archive(pipeline, &output.site, dir).await?),
        None => None,
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(output)?);
        return Ok(());
    }

    let failed: Vec<_> = output
        .previews
        .iter()
        .filter(|p| p.has_errors)
        .map(|p| p.filename.as_str())
        .collect();

    println!();
    println!("  Site generated successfully!");
    println!();
    println!("  Site:       {}", output.site.id);
    println!("  Pages:      {}", output.previews.len());
    if !failed.is_empty() {
        println!("  With errors: {}", failed.join(", "));
    }
    println!(
        "  Archive:    {}",
        output.site.archive.as_deref().unwrap_or("-")
    );
    println!(
        "  Tokens:     {} ({} prompt, {} completion)",
        output.cost.usage.total_tokens,
        output.cost.usage.prompt_tokens,
        output.cost.usage.completion_tokens
    );
    println!("  Cost:       ${:.4}", output.cost.total_cost);
    println!();
    println!("  Duration:   {:.2}s", duration.as_secs_f64());
    if let (Some(dir), Some(files)) = (options.export, exported) {
        println!("  Exported:   {files} files to {}", dir.display());
    }
    println!();

    Ok(())
}
