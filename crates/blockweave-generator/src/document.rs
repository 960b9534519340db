//! HTML page documents.
//!
//! A page document is a fixed shell with localized metadata, the theme as CSS
//! custom properties, every block's scoped style and every block's scoped
//! markup in page order. The shell uses a lightweight `{{ variable }}`
//! interpolation rather than a full template engine; block templates are the
//! only place where Tera is used.

use std::collections::{BTreeMap, HashMap};

use blockweave_core::PageConfig;
use thiserror::Error;
use tracing::debug;

use crate::render::{preview_variables, render_markup, render_style};

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("missing required variable: {0}")]
    MissingVariable(String),

    /// Invalid template syntax.
    #[error("invalid template syntax: {0}")]
    InvalidSyntax(String),
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Template context with variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: HashMap<String, String>,
}

impl TemplateContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

/// A string template with `{{ name }}` and optional `{{ name? }}` placeholders.
///
/// Substituted values are not scanned again, so a value containing `{{` is
/// emitted as is.
#[derive(Debug, Clone)]
pub struct Template {
    content: String,
}

impl Template {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn render(&self, context: &TemplateContext) -> Result<String> {
        let mut result = self.content.clone();
        let mut pos = 0;

        while let Some(start) = result[pos..].find("{{") {
            let start = pos + start;
            let end = result[start..]
                .find("}}")
                .ok_or_else(|| TemplateError::InvalidSyntax("unclosed {{ delimiter".to_string()))?;
            let end = start + end + 2;

            let name = result[start + 2..end - 2].trim();
            let (name, optional) = match name.strip_suffix('?') {
                Some(stripped) => (stripped, true),
                None => (name, false),
            };

            let value = match context.get(name) {
                Some(v) => v.to_string(),
                None if optional => String::new(),
                None => return Err(TemplateError::MissingVariable(name.to_string())),
            };

            result.replace_range(start..end, &value);
            pos = start + value.len();
        }

        Ok(result)
    }
}

/// Escape a value for use inside a double-quoted attribute or text node.
#[must_use]
pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Page shell.
pub const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{ lang }}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="robots" content="index, follow">
    <meta name="geo.region" content="{{ region }}">
    <meta name="geo.placename" content="{{ region }}">
    <meta name="content-language" content="{{ lang }}">

    <title>{{ title }}</title>
    <meta name="description" content="{{ description? }}">
    <meta name="keywords" content="{{ keywords? }}">

    <meta property="og:title" content="{{ og_title }}">
    <meta property="og:description" content="{{ og_description? }}">
    <meta property="og:type" content="website">
    <meta property="og:locale" content="{{ lang }}_{{ region }}">

    <meta name="twitter:card" content="summary_large_image">
    <meta name="twitter:title" content="{{ og_title }}">
    <meta name="twitter:description" content="{{ og_description? }}">

    <style>
        :root {
            {{ theme? }}
        }

        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: var(--font-body, sans-serif);
            color: var(--color-text, #333);
            background-color: var(--color-background, #fff);
            line-height: var(--line-height-normal, 1.6);
        }

        {{ blocks_css? }}
    </style>
</head>
<body>
    {{ blocks_html? }}
</body>
</html>"#;

/// One rendered page: the archived document and its preview twin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub filename: String,
    pub path: String,
    pub title: String,
    /// Document written to the archive.
    pub html: String,
    /// Same document with image references pointing at their preview sources.
    pub preview_html: String,
    /// Whether any block failed to generate or render.
    pub has_errors: bool,
    /// Blocks whose markup failed to render, with the error.
    pub render_errors: Vec<(String, String)>,
}

/// Locale of the rendered documents.
#[derive(Debug, Clone, Copy)]
pub struct Locale<'a> {
    pub language: &'a str,
    pub country: &'a str,
}

/// Render one page from its stored configuration.
pub fn render_page(
    page: &PageConfig,
    theme: &BTreeMap<String, String>,
    locale: Locale<'_>,
) -> Result<RenderedPage> {
    let mut styles = Vec::with_capacity(page.blocks.len());
    let mut markup = Vec::with_capacity(page.blocks.len());
    let mut preview = Vec::with_capacity(page.blocks.len());
    let mut render_errors = Vec::new();

    for block in &page.blocks {
        let id = block.generation_id.as_str();
        styles.push(render_style(&block.style, id));

        let rendered = render_markup(
            &block.markup,
            &block.category,
            id,
            &block.variables,
            block.has_error,
        );
        if let Some(error) = rendered.error {
            render_errors.push((id.to_string(), error));
        }
        markup.push(rendered.html);

        let previewed = render_markup(
            &block.markup,
            &block.category,
            id,
            &preview_variables(&block.variables),
            block.has_error,
        );
        preview.push(previewed.html);
    }

    let context = page_context(page, theme, locale).with_var("blocks_css", styles.join("\n"));
    let template = Template::new(PAGE_TEMPLATE);
    let html = template.render(&context.clone().with_var("blocks_html", markup.join("\n")))?;
    let preview_html = template.render(&context.with_var("blocks_html", preview.join("\n")))?;

    debug!(page = %page.filename, blocks = page.blocks.len(), "page rendered");

    Ok(RenderedPage {
        filename: page.filename.clone(),
        path: page.path.clone(),
        title: page.title.clone(),
        html,
        preview_html,
        has_errors: page.has_errors() || !render_errors.is_empty(),
        render_errors,
    })
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn page_context(
    page: &PageConfig,
    theme: &BTreeMap<String, String>,
    locale: Locale<'_>,
) -> TemplateContext {
    let seo = &page.seo;
    let title = first_non_empty(&[seo.title.as_str(), page.title.as_str()]);
    let og_title = first_non_empty(&[seo.og_title.as_str(), seo.title.as_str(), page.title.as_str()]);
    let og_description = first_non_empty(&[seo.og_description.as_str(), seo.description.as_str()]);

    let theme = theme
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>()
        .join("\n            ");

    TemplateContext::new()
        .with_var("lang", escape_attr(locale.language))
        .with_var("region", escape_attr(&locale.country.to_uppercase()))
        .with_var("title", escape_attr(title))
        .with_var("description", escape_attr(&seo.description))
        .with_var("keywords", escape_attr(&seo.keywords))
        .with_var("og_title", escape_attr(og_title))
        .with_var("og_description", escape_attr(og_description))
        .with_var("theme", theme)
}
