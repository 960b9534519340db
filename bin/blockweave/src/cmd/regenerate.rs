//! Regenerate command - rebuilds every page of a stored site

use std::{path::Path, time::Instant};

use color_eyre::eyre::{Result, WrapErr};

use super::{OutputOptions, build_pipeline, load_config, report};

/// Run the regenerate command.
///
/// Generates the site again from its stored prompt, locale and template, then
/// replaces its archive.
pub async fn run(config_path: &Path, site_id: &str, options: OutputOptions<'_>) -> Result<()> {
    let start = Instant::now();
    tracing::info!(?config_path, site_id, "Starting regeneration");

    let pipeline = build_pipeline(load_config(config_path)?)?;
    let output = pipeline
        .regenerate_site(site_id)
        .await
        .wrap_err_with(|| format!("Regeneration of site {site_id} failed"))?;

    let duration = start.elapsed();
    report(&pipeline, &output, options, duration).await?;

    tracing::info!(site = site_id, ?duration, "Regeneration completed successfully");

    Ok(())
}
