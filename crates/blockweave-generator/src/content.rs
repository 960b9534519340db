//! Content filling for one block.
//!
//! Describes the block's flattened schema to the content service, validates
//! the reply and replaces every image description with a generated image
//! stored under `images/`.

use std::fmt::Write as _;

use blockweave_core::{FieldKind, FieldSchema, PlannedPage, Usage};
use bytes::Bytes;
use futures::future::join_all;
use rand::{Rng, distributions::Alphanumeric};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::gateway::{
    CompletionRequest, ContentGateway, GatewayError, GeneratedImage, Purpose, extract_json_object,
};

/// Directory of generated images inside a site archive.
pub const IMAGES_DIR: &str = "images/";

const PLACEHOLDER_BASE: &str = "https://image.pollinations.ai/prompt/";

/// Content filling errors. All of them are block-scoped.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The content service failed.
    #[error("content generation failed: {0}")]
    Gateway(#[from] GatewayError),

    /// The reply could not be used.
    #[error("malformed content: {0}")]
    Malformed(String),
}

/// Result type for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;

/// Everything needed to fill one block.
#[derive(Debug, Clone, Copy)]
pub struct ContentRequest<'a> {
    pub schema: &'a FieldSchema,
    pub category: &'a str,
    pub prompt: &'a str,
    pub country: &'a str,
    pub language: &'a str,
    /// Set when localized navigation labels should be requested for these pages.
    pub navigation: Option<&'a [PlannedPage]>,
}

/// A generated image to be written into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveImage {
    pub path: String,
    pub bytes: Bytes,
}

/// Result of a content request.
#[derive(Debug, Clone, Default)]
pub struct FilledContent {
    pub values: Map<String, Value>,
    pub navigation_labels: Option<Vec<String>>,
    pub images: Vec<ArchiveImage>,
    pub usage: Usage,
}

/// Fill `request.schema` through `gateway`.
pub async fn fill_content(
    gateway: &dyn ContentGateway,
    request: &ContentRequest<'_>,
) -> Result<FilledContent> {
    let has_fields = request.schema.iter().any(|(_, s)| !s.is_nav());
    if !has_fields && request.navigation.is_none() {
        return Ok(FilledContent::default());
    }

    let completion = gateway
        .complete(&CompletionRequest {
            purpose: Purpose::BlockContent {
                category: request.category.to_string(),
            },
            system: system_prompt(request),
            user: if request.prompt.trim().is_empty() {
                "Create professional website content".to_string()
            } else {
                request.prompt.to_string()
            },
        })
        .await?;

    let mut values = extract_json_object(&completion.text)?;
    if values.is_empty() {
        return Err(ContentError::Malformed("reply contains no fields".to_string()));
    }

    let navigation_labels = match values.remove("navigationLabels") {
        Some(Value::Array(labels)) => Some(
            labels
                .into_iter()
                .filter_map(|l| l.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    };

    for (name, _) in request.schema.iter().filter(|(_, s)| s.is_nav()) {
        values.remove(name);
    }

    let (images, image_usage) = process_images(gateway, request.schema, &mut values).await;

    debug!(
        category = request.category,
        fields = values.len(),
        images = images.len(),
        "filled block content"
    );

    Ok(FilledContent {
        values,
        navigation_labels,
        images,
        usage: completion.usage + image_usage,
    })
}

/// One line per field: `- name (type: t)`, array items listed inline.
#[must_use]
pub fn describe_schema(schema: &FieldSchema) -> String {
    let mut out = String::new();
    for (name, spec) in schema.iter().filter(|(_, s)| !s.is_nav()) {
        match &spec.kind {
            FieldKind::Array { items } => {
                let items: Vec<String> = items
                    .iter()
                    .map(|(k, s)| format!("{k} ({})", s.kind.type_name()))
                    .collect();
                let _ = writeln!(out, "- {name} (type: array). Each item: {}", items.join(", "));
            }
            kind => {
                let _ = write!(out, "- {name} (type: {})", kind.type_name());
                if let Some(description) = &spec.description {
                    let _ = write!(out, ": {description}");
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Skeleton of the JSON object the content service should return.
#[must_use]
pub fn expected_shape(schema: &FieldSchema) -> Value {
    let mut out = Map::new();
    for (name, spec) in schema.iter().filter(|(_, s)| !s.is_nav()) {
        out.insert(name.to_string(), shape_of(&spec.kind));
    }
    Value::Object(out)
}

fn shape_of(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Image => json!({"href": "...", "alt": "..."}),
        FieldKind::Link => json!({"value": null, "href": "...", "label": "..."}),
        FieldKind::Anchor => json!({"href": "...", "label": "..."}),
        FieldKind::Anchors => json!({"value": []}),
        FieldKind::Block { block_type } => json!({"blockType": block_type}),
        FieldKind::Array { items } => {
            let item: Map<String, Value> = items
                .iter()
                .map(|(k, s)| (k.to_string(), shape_of(&s.kind)))
                .collect();
            json!({"type": "array", "values": [item.clone(), item]})
        }
        FieldKind::Text | FieldKind::Nav => json!({"value": "..."}),
    }
}

fn system_prompt(request: &ContentRequest<'_>) -> String {
    let mut prompt = format!(
        "You are a content generator for website blocks.\n\
         Language: {language}\nCountry: {country}\n\
         Generate natural, localized content for the block type: {category}.\n\
         Do not generate navigation structure or styles.\n\n\
         Fields to fill:\n{fields}\n\
         Formats:\n\
         - text: {{\"name\": {{\"value\": \"content\"}}}}\n\
         - image: {{\"name\": {{\"href\": \"image description\", \"alt\": \"alt text\"}}}}\n\
         - link / anchor: {{\"name\": {{\"href\": \"url\", \"label\": \"text\"}}}}\n\
         - anchors: {{\"name\": {{\"value\": []}}}}\n\
         - array: {{\"name\": {{\"type\": \"array\", \"values\": [...]}}}} with 3 to 5 items\n\n\
         Expected shape:\n{shape}\n",
        language = request.language,
        country = request.country,
        category = request.category,
        fields = describe_schema(request.schema),
        shape = expected_shape(request.schema),
    );

    if let Some(pages) = request.navigation {
        let _ = writeln!(
            prompt,
            "\nAlso add \"navigationLabels\": an array of short navigation labels in {}, one per page, in this order:",
            request.language
        );
        for page in pages {
            let _ = writeln!(prompt, "- \"{}\" (path: {})", page.title, page.path);
        }
    }

    prompt.push_str("\nReturn ONLY a valid JSON object. No empty strings.");
    prompt
}

/// JSON pointer token for a field name.
fn pointer_token(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

/// Pointers of every image value whose `href` is a description rather than a URL.
fn image_targets(schema: &FieldSchema, values: &Map<String, Value>) -> Vec<(String, String)> {
    let mut targets = Vec::new();

    for (name, spec) in schema.iter() {
        let Some(value) = values.get(name) else {
            continue;
        };
        let base = format!("/{}", pointer_token(name));

        match &spec.kind {
            FieldKind::Image => {
                if let Some(description) = pending_description(value) {
                    targets.push((base, description));
                }
            }
            FieldKind::Array { items } => {
                let Some(rows) = value.get("values").and_then(Value::as_array) else {
                    continue;
                };
                for (row_index, row) in rows.iter().enumerate() {
                    for (item_name, item_spec) in items.iter() {
                        if item_spec.kind != FieldKind::Image {
                            continue;
                        }
                        if let Some(description) = row.get(item_name).and_then(pending_description)
                        {
                            targets.push((
                                format!("{base}/values/{row_index}/{}", pointer_token(item_name)),
                                description,
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    targets
}

fn pending_description(value: &Value) -> Option<String> {
    value
        .get("href")
        .and_then(Value::as_str)
        .filter(|href| !href.starts_with("http"))
        .map(str::to_string)
}

/// Generate every pending image and rewrite the values in place.
async fn process_images(
    gateway: &dyn ContentGateway,
    schema: &FieldSchema,
    values: &mut Map<String, Value>,
) -> (Vec<ArchiveImage>, Usage) {
    let targets = image_targets(schema, values);
    if targets.is_empty() {
        return (Vec::new(), Usage::default());
    }

    let results = join_all(
        targets
            .iter()
            .map(|(_, description)| gateway.generate_image(description)),
    )
    .await;

    let mut images = Vec::new();
    let mut usage = Usage::default();
    let mut root = Value::Object(std::mem::take(values));

    for ((pointer, description), result) in targets.into_iter().zip(results) {
        let Some(Value::Object(target)) = root.pointer_mut(&pointer) else {
            continue;
        };
        match result {
            Ok(GeneratedImage {
                bytes,
                cost,
                source_url,
            }) => {
                let path = image_path();
                target.insert("href".to_string(), Value::String(path.clone()));
                target.insert("href64".to_string(), Value::String(source_url));
                images.push(ArchiveImage { path, bytes });
                usage += Usage::image(cost);
            }
            Err(e) => {
                warn!(error = %e, "image generation failed, using placeholder");
                target.insert(
                    "href".to_string(),
                    Value::String(placeholder_url(&description)),
                );
            }
        }
    }

    if let Value::Object(map) = root {
        *values = map;
    }

    (images, usage)
}

/// `images/img_<random>.png`
#[must_use]
pub fn image_path() -> String {
    let name: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{IMAGES_DIR}img_{name}.png")
}

/// External placeholder image for a description. Costs nothing.
#[must_use]
pub fn placeholder_url(description: &str) -> String {
    match Url::parse(PLACEHOLDER_BASE) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(description);
            }
            url.query_pairs_mut()
                .append_pair("width", "1024")
                .append_pair("height", "1024")
                .append_pair("format", "png");
            url.to_string()
        }
        Err(_) => PLACEHOLDER_BASE.to_string(),
    }
}
