//! Check command - validate configuration and the block catalog

use std::{collections::BTreeSet, path::Path};

use blockweave_core::Config;
use blockweave_generator::{BlockCatalog, SitemapGenerator};
use color_eyre::eyre::{Result, bail};

/// Validation result.
#[derive(Debug, Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the check command.
///
/// Validates the configuration, the block catalog and every site template.
pub fn run(config_path: &Path, strict: bool) -> Result<()> {
    tracing::info!(?config_path, strict, "Checking configuration and catalog");

    let mut result = ValidationResult::default();

    println!("Checking configuration...");
    let config = match Config::load(config_path) {
        Ok(c) => {
            println!("  ✓ Configuration valid");
            Some(c)
        }
        Err(e) => {
            result.add_error(format!("Configuration error: {e}"));
            println!("  ✗ Configuration invalid: {e}");
            None
        }
    };

    if let Some(ref cfg) = config {
        println!("\nChecking configuration values...");
        check_config_values(cfg, &mut result);

        println!("\nChecking block catalog...");
        match BlockCatalog::from_dirs(&cfg.storage.blocks_dir, &cfg.storage.templates_dir) {
            Ok(catalog) => {
                println!(
                    "  ✓ {} block package(s), {} template(s)",
                    catalog.block_count(),
                    catalog.templates().count()
                );
                check_catalog(&catalog, &mut result);
            }
            Err(e) => {
                result.add_error(format!("Catalog error: {e}"));
                println!("  ✗ Catalog invalid: {e}");
            }
        }
    }

    println!();
    println!("Summary:");
    println!("  Errors:   {}", result.errors.len());
    println!("  Warnings: {}", result.warnings.len());

    if result.has_errors() {
        println!();
        println!("Errors:");
        for err in &result.errors {
            println!("  ✗ {err}");
        }
    }

    if result.has_warnings() {
        println!();
        println!("Warnings:");
        for warn in &result.warnings {
            println!("  ⚠ {warn}");
        }
    }

    if result.has_errors() {
        bail!("Validation failed with {} error(s)", result.errors.len());
    }

    if strict && result.has_warnings() {
        bail!(
            "Validation failed with {} warning(s) (strict mode)",
            result.warnings.len()
        );
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}

/// Check configuration values for common issues.
fn check_config_values(config: &Config, result: &mut ValidationResult) {
    match config.domain() {
        Some(domain) => {
            if let Err(e) = SitemapGenerator::new(domain) {
                result.add_warning(format!("site.domain is unusable, sitemap will be skipped: {e}"));
            }
        }
        None => result.add_warning("site.domain is not set; sitemap and nginx.conf are omitted"),
    }

    if std::env::var(&config.gateway.api_key_env).is_err() {
        result.add_warning(format!(
            "{} is not set; generation commands will fail",
            config.gateway.api_key_env
        ));
    }

    if !config.storage.blocks_dir.is_dir() {
        result.add_error(format!(
            "Blocks directory missing: {}",
            config.storage.blocks_dir.display()
        ));
    }

    if !config.storage.templates_dir.is_dir() {
        result.add_error(format!(
            "Templates directory missing: {}",
            config.storage.templates_dir.display()
        ));
    }

    println!("  ✓ Configuration values checked");
}

/// Check that every category a template or a nested block refers to has an
/// active package.
fn check_catalog(catalog: &BlockCatalog, result: &mut ValidationResult) {
    let available: BTreeSet<&str> = catalog.categories().collect();
    let before = result.errors.len() + result.warnings.len();

    for template in catalog.templates() {
        if template.pages.is_empty() {
            result.add_error(format!("Template {} has no pages", template.id));
        }

        let used: BTreeSet<&str> = template
            .pages
            .iter()
            .flat_map(|p| p.layout.iter())
            .chain(template.globals.blocks.iter())
            .map(|slot| slot.category.as_str())
            .collect();

        for category in used.difference(&available) {
            result.add_error(format!(
                "Template {} uses category '{category}' with no active block",
                template.id
            ));
        }
    }

    for (package, active) in catalog.packages() {
        if !active {
            continue;
        }
        for (field, spec) in package.fields.block_fields() {
            let Some(category) = spec.block_type() else {
                continue;
            };
            if !available.contains(category) {
                result.add_warning(format!(
                    "Block {} field '{field}' nests category '{category}' with no active block",
                    package.id
                ));
            }
        }
    }

    if result.errors.len() + result.warnings.len() == before {
        println!("  ✓ All referenced categories are available");
    } else {
        println!("  ⚠ Some referenced categories are unavailable");
    }
}
