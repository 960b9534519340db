//! Sitemap generation.
//!
//! Generates an XML sitemap for the pages of a site, with image entries for
//! every image found in block variables.

use blockweave_core::PageConfig;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Sitemap generation errors.
#[derive(Debug, Error)]
pub enum SitemapError {
    /// The configured domain is not a usable URL.
    #[error("invalid sitemap domain {domain:?}: {message}")]
    DomainInvalid { domain: String, message: String },
}

/// Result type for sitemap operations.
pub type Result<T> = std::result::Result<T, SitemapError>;

/// Change frequency for sitemap entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Daily,
    Monthly,
}

impl ChangeFreq {
    fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

/// An image attached to a sitemap URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapImage {
    pub loc: String,
    pub caption: String,
}

/// A sitemap URL entry.
#[derive(Debug, Clone)]
pub struct SitemapUrl {
    pub loc: String,
    pub changefreq: ChangeFreq,
    pub priority: f32,
    pub images: Vec<SitemapImage>,
}

/// Sitemap generator bound to a site's base URL.
#[derive(Debug)]
pub struct SitemapGenerator {
    base: Url,
    lastmod: DateTime<Utc>,
}

impl SitemapGenerator {
    /// Create a generator for `domain`. A missing scheme defaults to `https`.
    pub fn new(domain: &str) -> Result<Self> {
        let invalid = |message: String| SitemapError::DomainInvalid {
            domain: domain.to_string(),
            message,
        };

        let domain = domain.trim();
        if domain.is_empty() {
            return Err(invalid("domain is empty".to_string()));
        }

        let raw = if domain.starts_with("http") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        let mut base = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
        if base.host_str().is_none_or(str::is_empty) {
            return Err(invalid("domain has no host".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            lastmod: Utc::now(),
        })
    }

    /// Use a fixed modification time instead of the current time.
    #[must_use]
    pub fn with_lastmod(mut self, lastmod: DateTime<Utc>) -> Self {
        self.lastmod = lastmod;
        self
    }

    /// Base URL, always ending with `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Generate sitemap XML from pages.
    #[must_use]
    pub fn generate(&self, pages: &[PageConfig]) -> String {
        debug!(count = pages.len(), "generating sitemap");

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9""#);
        xml.push('\n');
        xml.push_str(r#"        xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">"#);
        xml.push('\n');

        for page in pages {
            let url = self.page_to_url(page);
            xml.push_str(&self.url_to_xml(&url));
        }

        xml.push_str("</urlset>\n");
        xml
    }

    fn page_to_url(&self, page: &PageConfig) -> SitemapUrl {
        let path = page.path.trim_start_matches('/');
        let path = path.strip_suffix(".html").unwrap_or(path);
        let loc = format!("{}{}", self.base, path);

        let (changefreq, priority) = if page.is_home() {
            (ChangeFreq::Daily, 1.0)
        } else {
            (ChangeFreq::Monthly, 0.8)
        };

        let mut images = Vec::new();
        for block in &page.blocks {
            for value in block.variables.values() {
                collect_images(value, &mut images);
            }
        }
        for image in &mut images {
            if let Ok(resolved) = self.base.join(&image.loc) {
                image.loc = resolved.to_string();
            }
        }

        SitemapUrl {
            loc,
            changefreq,
            priority,
            images,
        }
    }

    fn url_to_xml(&self, url: &SitemapUrl) -> String {
        let mut xml = String::from("  <url>\n");

        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            self.lastmod.format("%Y-%m-%dT%H:%M:%S%:z")
        ));
        xml.push_str(&format!(
            "    <changefreq>{}</changefreq>\n",
            url.changefreq.as_str()
        ));
        xml.push_str(&format!("    <priority>{:.1}</priority>\n", url.priority));

        for image in &url.images {
            xml.push_str("    <image:image>\n");
            xml.push_str(&format!(
                "      <image:loc>{}</image:loc>\n",
                escape_xml(&image.loc)
            ));
            xml.push_str(&format!(
                "      <image:caption>{}</image:caption>\n",
                image.caption
            ));
            xml.push_str("    </image:image>\n");
        }

        xml.push_str("  </url>\n");
        xml
    }
}

/// Objects with an `href` that are typed as images or carry `alt` text.
fn collect_images(value: &Value, out: &mut Vec<SitemapImage>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_images(item, out);
            }
        }
        Value::Object(map) => {
            let href = map.get("href").and_then(Value::as_str).unwrap_or_default();
            let is_image = map.get("type").and_then(Value::as_str) == Some("image")
                || map.get("alt").is_some_and(|alt| !alt.is_null());
            if !href.is_empty() && is_image {
                let caption = ["alt", "value"]
                    .iter()
                    .filter_map(|key| map.get(*key).and_then(Value::as_str))
                    .find(|s| !s.is_empty())
                    .unwrap_or_default();
                out.push(SitemapImage {
                    loc: href.to_string(),
                    caption: strip_markup_chars(caption),
                });
            }
            for nested in map.values() {
                collect_images(nested, out);
            }
        }
        _ => {}
    }
}

fn strip_markup_chars(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '<' | '>' | '&' | '"' | '\''))
        .collect()
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
