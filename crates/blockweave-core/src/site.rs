//! Site templates, planned pages and stored site configuration.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{schema::FieldSchema, usage::Usage};

/// Path reserved for the home page.
pub const HOME_PATH: &str = "/";

/// A site template: the page layouts and the blocks shared by every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteTemplate {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub pages: Vec<TemplatePage>,

    #[serde(default)]
    pub globals: TemplateGlobals,
}

/// One page of a site template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub layout: Vec<LayoutSlot>,
}

/// A block slot, identified by its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSlot {
    #[serde(rename = "type")]
    pub category: String,
}

impl LayoutSlot {
    #[must_use]
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }
}

/// Blocks generated once per site plus hard-coded style variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateGlobals {
    #[serde(default)]
    pub blocks: Vec<LayoutSlot>,

    #[serde(default)]
    pub css: BTreeMap<String, String>,
}

impl SiteTemplate {
    /// Whether `category` is generated once per site.
    #[must_use]
    pub fn is_global(&self, category: &str) -> bool {
        self.globals.blocks.iter().any(|b| b.category == category)
    }
}

/// Localized search metadata of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub og_title: String,
    #[serde(default)]
    pub og_description: String,
}

/// A page after planning: path, title and SEO are fixed, blocks are not yet generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedPage {
    pub path: String,
    pub title: String,
    pub seo: SeoMetadata,
    pub layout: Vec<LayoutSlot>,
}

impl PlannedPage {
    #[must_use]
    pub fn filename(&self) -> String {
        page_filename(&self.path)
    }

    #[must_use]
    pub fn is_home(&self) -> bool {
        self.path == HOME_PATH
    }
}

/// Archive filename of a page path: `index.html` for `/`, else `{slug}.html`.
#[must_use]
pub fn page_filename(path: &str) -> String {
    if path == HOME_PATH {
        "index.html".to_string()
    } else {
        format!("{}.html", path.trim_start_matches('/'))
    }
}

/// Generation id of a block instance: `{category}-{ordinal}`.
#[must_use]
pub fn generation_id(category: &str, ordinal: usize) -> String {
    format!("{category}-{ordinal}")
}

/// Serializable state of one block instance, kept for later regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfig {
    /// Catalog id of the package the instance was built from.
    pub block_id: String,

    #[serde(rename = "blockType")]
    pub category: String,

    pub is_global: bool,

    /// Instance id, unique per page.
    #[serde(rename = "generationBlockId")]
    pub generation_id: String,

    /// Field schema of the package.
    pub definition: FieldSchema,

    /// Resolved values. Nested blocks are regrouped into `block` objects.
    #[serde(default)]
    pub variables: Map<String, Value>,

    #[serde(default)]
    pub has_error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Markup template source.
    #[serde(rename = "html")]
    pub markup: String,

    /// Style template source, including appended nested styles.
    #[serde(rename = "css")]
    pub style: String,
}

/// Serializable state of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub title: String,
    pub path: String,
    pub filename: String,
    #[serde(default)]
    pub seo: SeoMetadata,
    pub blocks: Vec<BlockConfig>,
}

impl PageConfig {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.blocks.iter().any(|b| b.has_error)
    }

    #[must_use]
    pub fn find_block(&self, generation_id: &str) -> Option<&BlockConfig> {
        self.blocks.iter().find(|b| b.generation_id == generation_id)
    }

    #[must_use]
    pub fn is_home(&self) -> bool {
        self.path == HOME_PATH
    }
}

/// Detailed site configuration: every page with full block variables, plus the merged theme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDetails {
    pub pages: Vec<PageConfig>,

    #[serde(rename = "generatedTheme")]
    pub theme: BTreeMap<String, String>,
}

impl SiteDetails {
    #[must_use]
    pub fn page_by_filename(&self, filename: &str) -> Option<&PageConfig> {
        self.pages.iter().find(|p| p.filename == filename)
    }

    /// The redacted view: ids, types and error flags only.
    #[must_use]
    pub fn redacted(&self) -> Vec<RedactedPage> {
        self.pages
            .iter()
            .map(|page| RedactedPage {
                title: page.title.clone(),
                path: page.path.clone(),
                filename: page.filename.clone(),
                blocks: page
                    .blocks
                    .iter()
                    .map(|b| RedactedBlock {
                        block_id: b.block_id.clone(),
                        is_global: b.is_global,
                        category: b.category.clone(),
                        generation_id: b.generation_id.clone(),
                        has_error: b.has_error,
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedPage {
    pub title: String,
    pub path: String,
    pub filename: String,
    pub blocks: Vec<RedactedBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedBlock {
    pub block_id: String,
    pub is_global: bool,
    #[serde(rename = "blockType")]
    pub category: String,
    #[serde(rename = "generationBlockId")]
    pub generation_id: String,
    pub has_error: bool,
}

/// A persisted site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub country: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub template_id: String,
    /// Object name of the current archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    pub details: SiteDetails,
    #[serde(default)]
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_page_filename() {
        assert_eq!(page_filename("/"), "index.html");
        assert_eq!(page_filename("/services"), "services.html");
        assert_eq!(page_filename("/honda-service"), "honda-service.html");
    }

    #[test]
    fn test_parse_site_template() {
        let json = r##"{
            "id": "landing",
            "pages": [
                {"title": "Home", "layout": [{"type": "header"}, {"type": "hero"}]},
                {"layout": [{"type": "header"}, {"type": "services"}]}
            ],
            "globals": {
                "blocks": [{"type": "header"}],
                "css": {"--color-primary": "#111111"}
            }
        }"##;

        let template: SiteTemplate = serde_json::from_str(json).unwrap();

        assert_eq!(template.pages.len(), 2);
        assert_eq!(template.pages[0].title.as_deref(), Some("Home"));
        assert_eq!(template.pages[1].title, None);
        assert_eq!(template.pages[1].layout[1].category, "services");
        assert!(template.is_global("header"));
        assert!(!template.is_global("hero"));
        assert_eq!(template.globals.css["--color-primary"], "#111111");
    }

    #[test]
    fn test_template_without_globals() {
        let template: SiteTemplate =
            serde_json::from_str(r#"{"pages": [{"layout": []}]}"#).unwrap();
        assert!(template.globals.blocks.is_empty());
        assert!(template.globals.css.is_empty());
    }

    fn block(generation_id: &str, has_error: bool) -> BlockConfig {
        BlockConfig {
            block_id: "pkg".to_string(),
            category: "hero".to_string(),
            is_global: false,
            generation_id: generation_id.to_string(),
            definition: FieldSchema::new(),
            variables: Map::new(),
            has_error,
            error: None,
            markup: String::new(),
            style: String::new(),
        }
    }

    #[test]
    fn test_block_config_wire_names() {
        let value = serde_json::to_value(block("hero-1", false)).unwrap();
        assert_eq!(value["blockType"], "hero");
        assert_eq!(value["generationBlockId"], "hero-1");
        assert_eq!(value["isGlobal"], json!(false));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_page_errors_and_redaction() {
        let details = SiteDetails {
            pages: vec![PageConfig {
                title: "Home".to_string(),
                path: "/".to_string(),
                filename: "index.html".to_string(),
                seo: SeoMetadata::default(),
                blocks: vec![block("hero-0", false), block("hero-1", true)],
            }],
            theme: BTreeMap::new(),
        };

        let page = details.page_by_filename("index.html").unwrap();
        assert!(page.has_errors());
        assert!(page.find_block("hero-1").is_some());
        assert!(page.find_block("hero-9").is_none());

        let redacted = details.redacted();
        assert_eq!(redacted[0].blocks.len(), 2);
        assert!(redacted[0].blocks[1].has_error);

        let value = serde_json::to_value(&redacted).unwrap();
        assert!(value[0]["blocks"][0].get("variables").is_none());
    }
}
