//! Generate command - builds a new site from a template

use std::{path::Path, time::Instant};

use blockweave_generator::GenerateRequest;
use color_eyre::eyre::{Result, WrapErr};

use super::{OutputOptions, build_pipeline, load_config, report};

/// Run the generate command.
///
/// Plans, fills and renders every page of the template, stores the archive and
/// records the new site.
pub async fn run(
    config_path: &Path,
    request: &GenerateRequest,
    options: OutputOptions<'_>,
) -> Result<()> {
    let start = Instant::now();
    tracing::info!(
        ?config_path,
        template = %request.template_id,
        language = %request.language,
        country = %request.country,
        "Starting generation"
    );

    let config = load_config(config_path)?;
    tracing::debug!(?config, "Loaded configuration");

    let pipeline = build_pipeline(config)?;
    let output = pipeline
        .generate(request)
        .await
        .wrap_err("Generation failed")?;

    let duration = start.elapsed();
    report(&pipeline, &output, options, duration).await?;

    tracing::info!(site = %output.site.id, ?duration, "Generation completed successfully");

    Ok(())
}
