//! Generator configuration management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Main configuration structure for blockweave.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Deployment settings for generated sites.
    #[serde(default)]
    pub site: SiteConfig,

    /// Pipeline settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Content generation service settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Token pricing used for cost reports.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Local storage locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Deployment settings applied to every generated archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public domain of the site. Drives the sitemap and the proxy config.
    #[serde(default)]
    pub domain: Option<String>,

    /// Document root written into the reverse-proxy config.
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
}

/// Generation pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum nesting depth for `block` fields.
    #[serde(default = "default_max_level")]
    pub max_level: usize,

    /// How many times theme synthesis is attempted before giving up.
    #[serde(default = "default_theme_attempts")]
    pub theme_attempts: usize,

    /// Use the built-in theme instead of aborting when synthesis is exhausted.
    #[serde(default)]
    pub theme_fallback: bool,
}

/// Content generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model used for content, theme and page planning.
    #[serde(default = "default_model")]
    pub model: String,

    /// Image model.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Flat cost charged per generated image.
    #[serde(default = "default_image_cost")]
    pub image_cost: f64,
}

/// Token pricing in currency units per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_input_price")]
    pub input_per_million: f64,

    #[serde(default = "default_output_price")]
    pub output_per_million: f64,
}

/// Local storage locations used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Block package catalog root (`<category>/<package>/`).
    #[serde(default = "default_blocks_dir")]
    pub blocks_dir: PathBuf,

    /// Site template directory (`<id>.json`).
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// Site record directory.
    #[serde(default = "default_sites_dir")]
    pub sites_dir: PathBuf,

    /// Archive object store root.
    #[serde(default = "default_archives_dir")]
    pub archives_dir: PathBuf,
}

// Default value functions
fn default_root_dir() -> String {
    "/var/www/html".to_string()
}

fn default_max_level() -> usize {
    5
}

fn default_theme_attempts() -> usize {
    2
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_image_cost() -> f64 {
    0.04
}

fn default_input_price() -> f64 {
    0.15
}

fn default_output_price() -> f64 {
    0.6
}

fn default_blocks_dir() -> PathBuf {
    PathBuf::from("blocks")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_sites_dir() -> PathBuf {
    PathBuf::from("sites")
}

fn default_archives_dir() -> PathBuf {
    PathBuf::from("archives")
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            domain: None,
            root_dir: default_root_dir(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_level: default_max_level(),
            theme_attempts: default_theme_attempts(),
            theme_fallback: false,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            image_model: default_image_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            image_cost: default_image_cost(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_million: default_input_price(),
            output_per_million: default_output_price(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blocks_dir: default_blocks_dir(),
            templates_dir: default_templates_dir(),
            sites_dir: default_sites_dir(),
            archives_dir: default_archives_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration using the config crate, layering `BLOCKWEAVE__*` variables.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("BLOCKWEAVE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.generation.max_level == 0 {
            return Err(CoreError::config("generation.max_level must be at least 1"));
        }

        if self.generation.theme_attempts == 0 {
            return Err(CoreError::config(
                "generation.theme_attempts must be at least 1",
            ));
        }

        if self.gateway.base_url.is_empty() {
            return Err(CoreError::config("gateway.base_url cannot be empty"));
        }

        if self.site.domain.as_deref().is_some_and(|d| d.trim().is_empty()) {
            tracing::warn!("site.domain is empty; sitemap and proxy config will be skipped");
        }

        Ok(())
    }

    /// The configured domain, ignoring blank values.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.site
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn create_test_config() -> String {
        r#"
[site]
domain = "example.com"
root_dir = "/srv/site"

[generation]
max_level = 3
theme_attempts = 4
theme_fallback = true

[gateway]
base_url = "http://localhost:8080/v1"
model = "local-model"
timeout_secs = 30

[pricing]
input_per_million = 1.0
output_per_million = 2.0

[storage]
blocks_dir = "catalog/blocks"
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("blockweave.toml");
        let mut file = std::fs::File::create(&config_path).expect("create file");
        file.write_all(create_test_config().as_bytes())
            .expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.domain(), Some("example.com"));
        assert_eq!(config.site.root_dir, "/srv/site");
        assert_eq!(config.generation.max_level, 3);
        assert_eq!(config.generation.theme_attempts, 4);
        assert!(config.generation.theme_fallback);
        assert_eq!(config.gateway.base_url, "http://localhost:8080/v1");
        assert_eq!(config.gateway.model, "local-model");
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.pricing.output_per_million, 2.0);
        assert_eq!(config.storage.blocks_dir, PathBuf::from("catalog/blocks"));
        assert_eq!(config.storage.sites_dir, PathBuf::from("sites"));
    }

    #[test]
    fn test_config_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("blockweave.toml");
        std::fs::write(&config_path, "").expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.domain(), None);
        assert_eq!(config.site.root_dir, "/var/www/html");
        assert_eq!(config.generation.max_level, 5);
        assert_eq!(config.generation.theme_attempts, 2);
        assert!(!config.generation.theme_fallback);
        assert_eq!(config.gateway.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_blank_domain_is_ignored() {
        let mut config = Config::default();
        config.site.domain = Some("   ".to_string());
        assert_eq!(config.domain(), None);
    }

    #[test]
    fn test_config_validation_zero_depth() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("blockweave.toml");
        std::fs::write(&config_path, "[generation]\nmax_level = 0\n").expect("write");

        let result = Config::load(&config_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_level"));
    }

    #[test]
    fn test_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/blockweave.toml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
