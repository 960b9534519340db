//! Per-instance template scoping.
//!
//! Every block instance is rendered against its own id: the style template has
//! its `#_blockId` selector replaced and is compiled as SCSS, the markup
//! template is rendered with `_blockId` in its context. Both outputs are
//! wrapped in trace comments keyed by the id so that a page can be taken apart
//! again.

use blockweave_core::BLOCK_ID_PLACEHOLDER;
use serde_json::{Map, Value};
use tera::{Context, Tera};
use tracing::warn;

/// CSS class of the element substituted for a block that failed to render.
pub const ERROR_CLASS: &str = "generation-block-error";

/// Markup rendering outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMarkup {
    /// Wrapped markup, either rendered or the fallback element.
    pub html: String,
    /// Render error, when the fallback was used because rendering failed.
    pub error: Option<String>,
}

/// Scope and compile a style template. Falls back to the raw template when
/// compilation fails.
#[must_use]
pub fn render_style(template: &str, instance_id: &str) -> String {
    compile_style(template, instance_id).unwrap_or_else(|| template.to_string())
}

/// Scope and compile a style template, `None` when compilation fails.
#[must_use]
pub fn compile_style(template: &str, instance_id: &str) -> Option<String> {
    let scoped = template.replace(BLOCK_ID_PLACEHOLDER, &format!("#{instance_id}"));

    match grass::from_string(scoped, &grass::Options::default()) {
        Ok(css) => Some(format!(
            "/*!CSS-BLOCK:{instance_id}:START!*/\n{}\n/*!CSS-BLOCK:{instance_id}:END!*/",
            css.trim_end()
        )),
        Err(e) => {
            warn!(id = instance_id, error = %e, "style compilation failed");
            None
        }
    }
}

/// Render a markup template against `variables` plus `_blockId`.
///
/// `failed` short-circuits to the fallback element, for instances whose
/// content could not be generated.
#[must_use]
pub fn render_markup(
    markup: &str,
    category: &str,
    instance_id: &str,
    variables: &Map<String, Value>,
    failed: bool,
) -> RenderedMarkup {
    let (body, error) = if failed {
        (fallback_markup(instance_id, category), None)
    } else {
        match render_template(markup, instance_id, variables) {
            Ok(html) => (html, None),
            Err(e) => {
                let message = render_error_chain(&e);
                warn!(id = instance_id, error = %message, "markup rendering failed");
                (fallback_markup(instance_id, category), Some(message))
            }
        }
    };

    RenderedMarkup {
        html: format!(
            "<!-- !HTML-BLOCK:{instance_id}:START! -->{body}<!-- !HTML-BLOCK:{instance_id}:END! -->"
        ),
        error,
    }
}

fn render_template(
    markup: &str,
    instance_id: &str,
    variables: &Map<String, Value>,
) -> tera::Result<String> {
    let mut context = Context::from_value(Value::Object(variables.clone()))?;
    context.insert("_blockId", instance_id);

    let mut tera = Tera::default();
    tera.add_raw_template("block.html", markup)?;
    tera.set_escape_fn(escape_text);
    tera.render("block.html", &context)
}

// Tera's default escaper also rewrites `/`, which mangles paths in attributes.
fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// Tera nests the useful message in the source chain.
fn render_error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Visible placeholder for a block that could not be rendered.
#[must_use]
pub fn fallback_markup(instance_id: &str, category: &str) -> String {
    format!(r#"<div id="{instance_id}" class="{ERROR_CLASS}">Failed to render {category}</div>"#)
}

/// Copy of `variables` where every object carrying both `href` and `href64`
/// points `href` at the preview source.
#[must_use]
pub fn preview_variables(variables: &Map<String, Value>) -> Map<String, Value> {
    variables
        .iter()
        .map(|(k, v)| (k.clone(), preview_value(v)))
        .collect()
}

fn preview_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(preview_value).collect()),
        Value::Object(map) => {
            let mut out = preview_variables(map);
            if out.contains_key("href") {
                if let Some(preview) = out.get("href64").cloned() {
                    out.insert("href".to_string(), preview);
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_render_style_scopes_and_wraps() {
        let css = render_style("#_blockId { h1 { color: red; } }", "hero-1");

        assert!(css.starts_with("/*!CSS-BLOCK:hero-1:START!*/"));
        assert!(css.ends_with("/*!CSS-BLOCK:hero-1:END!*/"));
        assert!(css.contains("#hero-1 h1"));
        assert!(!css.contains("_blockId"));
    }

    #[test]
    fn test_render_style_falls_back_to_raw() {
        let broken = "#_blockId { color: red;";
        assert_eq!(render_style(broken, "hero-1"), broken);
    }

    #[test]
    fn test_compile_style_failure() {
        assert!(compile_style("#_blockId { color: red;", "hero-1").is_none());
    }

    #[test]
    fn test_render_markup() {
        let variables = vars(json!({"title": {"value": "Fresh <bread>"}}));
        let rendered = render_markup(
            r#"<section id="{{ _blockId }}"><h1>{{ title.value }}</h1></section>"#,
            "hero",
            "hero-2",
            &variables,
            false,
        );

        assert!(rendered.error.is_none());
        assert_eq!(
            rendered.html,
            "<!-- !HTML-BLOCK:hero-2:START! --><section id=\"hero-2\"><h1>Fresh &lt;bread&gt;</h1></section><!-- !HTML-BLOCK:hero-2:END! -->"
        );
    }

    #[test]
    fn test_render_markup_failure_uses_fallback() {
        let rendered = render_markup("{{ missing.value }}", "hero", "hero-0", &Map::new(), false);

        assert!(rendered.error.is_some());
        assert!(rendered.html.contains(r#"<div id="hero-0" class="generation-block-error">"#));
        assert!(rendered.html.contains("Failed to render hero"));
        assert!(rendered.html.starts_with("<!-- !HTML-BLOCK:hero-0:START! -->"));
    }

    #[test]
    fn test_failed_instance_renders_fallback() {
        let rendered = render_markup("<p>ok</p>", "footer", "footer-3", &Map::new(), true);
        assert!(rendered.error.is_none());
        assert!(rendered.html.contains("Failed to render footer"));
        assert!(!rendered.html.contains("<p>ok</p>"));
    }

    #[test]
    fn test_preview_variables() {
        let variables = vars(json!({
            "logo": {"href": "images/img_a.png", "href64": "https://cdn/a.png", "alt": "Logo"},
            "cta": {"href": "#contact", "label": "Go"},
            "cards": {"values": [
                {"icon": {"href": "images/img_b.png", "href64": "https://cdn/b.png"}}
            ]}
        }));

        let preview = preview_variables(&variables);

        assert_eq!(preview["logo"]["href"], "https://cdn/a.png");
        assert_eq!(preview["cta"]["href"], "#contact");
        assert_eq!(preview["cards"]["values"][0]["icon"]["href"], "https://cdn/b.png");
        assert_eq!(variables["logo"]["href"], "images/img_a.png");
    }
}
