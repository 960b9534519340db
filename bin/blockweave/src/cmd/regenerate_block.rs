//! Regenerate-block command - replaces one block instance of a stored site

use std::{path::Path, time::Instant};

use blockweave_generator::RegenerateBlockRequest;
use color_eyre::eyre::{Result, WrapErr};

use super::{OutputOptions, build_pipeline, load_config, report};

/// Run the regenerate-block command.
///
/// Only the targeted block (or, for a global block, its copies on every page)
/// gets new content; other pages are written back unchanged.
pub async fn run(
    config_path: &Path,
    request: &RegenerateBlockRequest,
    options: OutputOptions<'_>,
) -> Result<()> {
    let start = Instant::now();
    tracing::info!(
        ?config_path,
        site_id = %request.site_id,
        page = %request.page_filename,
        block = %request.generation_id,
        global = request.is_global,
        "Starting block regeneration"
    );

    let pipeline = build_pipeline(load_config(config_path)?)?;
    let output = pipeline.regenerate_block(request).await.wrap_err_with(|| {
        format!(
            "Regeneration of block {} on {} failed",
            request.generation_id, request.page_filename
        )
    })?;

    let duration = start.elapsed();
    report(&pipeline, &output, options, duration).await?;

    tracing::info!(site = %request.site_id, ?duration, "Block regeneration completed successfully");

    Ok(())
}
