//! In-page anchor targets.
//!
//! Every `anchor` field of a block on a page is pointed at another content
//! block of the same page (headers and footers are never targets). Targets are
//! taken from a pool in page order and the pool is refilled once it runs dry,
//! so repeated fills of the same page give the same result. Every `anchors`
//! field then receives the list of distinct anchors assigned on that page.

use blockweave_core::PageConfig;
use serde_json::{Map, Value, json};
use tracing::debug;

const EXCLUDED_CATEGORIES: &[&str] = &["header", "footer"];

/// Fill anchors of every page, or of the page named `target` only.
pub fn fill_anchors(pages: &mut [PageConfig], target: Option<&str>) {
    for page in pages.iter_mut() {
        if target.is_some_and(|t| t != page.filename) {
            continue;
        }
        fill_page(page);
    }
}

fn free_blocks(page: &PageConfig) -> Vec<usize> {
    page.blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| !EXCLUDED_CATEGORIES.contains(&b.category.as_str()))
        .map(|(i, _)| i)
        .collect()
}

fn fill_page(page: &mut PageConfig) {
    let all_free = free_blocks(page);
    if all_free.is_empty() {
        return;
    }

    let targets: Vec<String> = page
        .blocks
        .iter()
        .map(|b| format!("#{}", b.generation_id))
        .collect();

    let mut pool = all_free.clone();
    let mut assigned: Vec<(String, String)> = Vec::new();

    for index in 0..page.blocks.len() {
        let anchor_fields: Vec<String> = page.blocks[index]
            .definition
            .names_of("anchor")
            .map(str::to_string)
            .collect();

        for field in anchor_fields {
            let Some(Value::Object(anchor)) = page.blocks[index].variables.get_mut(&field) else {
                continue;
            };

            let only_self_left = pool.len() == 1 && pool[0] == index;
            if all_free.len() > 1 && (only_self_left || pool.is_empty()) {
                pool.clone_from(&all_free);
            }

            match pool.iter().position(|&candidate| candidate != index) {
                Some(position) => {
                    let chosen = pool.remove(position);
                    let href = targets[chosen].clone();
                    let label = anchor
                        .get("label")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    anchor.insert("href".to_string(), Value::String(href.clone()));
                    match assigned.iter_mut().find(|(h, _)| *h == href) {
                        Some(entry) => entry.1 = label,
                        None => assigned.push((href, label)),
                    }
                }
                None if all_free.len() == 1 => {
                    anchor.insert("href".to_string(), Value::String(String::new()));
                    anchor.insert("label".to_string(), Value::String(String::new()));
                }
                None => {}
            }
        }
    }

    let list: Vec<Value> = assigned
        .iter()
        .map(|(href, label)| json!({ "href": href, "label": label }))
        .collect();

    for block in &mut page.blocks {
        let fields: Vec<String> = block
            .definition
            .names_of("anchors")
            .map(str::to_string)
            .collect();
        for field in fields {
            let entry = block
                .variables
                .entry(field)
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(map) = entry {
                map.insert("value".to_string(), Value::Array(list.clone()));
            }
        }
    }

    debug!(page = %page.filename, anchors = assigned.len(), "anchors filled");
}

#[cfg(test)]
mod tests {
    use blockweave_core::{BlockConfig, FieldKind, FieldSchema, FieldSpec};

    use super::*;

    fn block(category: &str, ordinal: usize, schema: FieldSchema, variables: Value) -> BlockConfig {
        BlockConfig {
            block_id: format!("{category}-pkg"),
            category: category.to_string(),
            is_global: false,
            generation_id: format!("{category}-{ordinal}"),
            definition: schema,
            variables: match variables {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            has_error: false,
            error: None,
            markup: String::new(),
            style: String::new(),
        }
    }

    fn page(filename: &str, blocks: Vec<BlockConfig>) -> PageConfig {
        PageConfig {
            title: filename.to_string(),
            path: format!("/{filename}"),
            filename: filename.to_string(),
            seo: Default::default(),
            blocks,
        }
    }

    fn anchor_schema() -> FieldSchema {
        FieldSchema::new().with("cta", FieldSpec::new(FieldKind::Anchor))
    }

    fn anchors_schema() -> FieldSchema {
        FieldSchema::new().with("menu", FieldSpec::new(FieldKind::Anchors))
    }

    #[test]
    fn test_anchor_targets_other_block() {
        let mut pages = vec![page(
            "index.html",
            vec![
                block("header", 0, anchors_schema(), json!({})),
                block("hero", 1, anchor_schema(), json!({"cta": {"label": "See offer"}})),
                block("features", 2, FieldSchema::new(), json!({})),
                block("footer", 3, FieldSchema::new(), json!({})),
            ],
        )];

        fill_anchors(&mut pages, None);

        let blocks = &pages[0].blocks;
        assert_eq!(blocks[1].variables["cta"]["href"], "#features-2");
        assert_eq!(
            blocks[0].variables["menu"]["value"],
            json!([{"href": "#features-2", "label": "See offer"}])
        );
    }

    #[test]
    fn test_never_targets_header_or_footer() {
        let mut pages = vec![page(
            "index.html",
            vec![
                block("header", 0, anchor_schema(), json!({"cta": {"label": "a"}})),
                block("hero", 1, anchor_schema(), json!({"cta": {"label": "b"}})),
                block("about", 2, anchor_schema(), json!({"cta": {"label": "c"}})),
                block("footer", 3, anchor_schema(), json!({"cta": {"label": "d"}})),
            ],
        )];

        fill_anchors(&mut pages, None);

        for b in &pages[0].blocks {
            let href = b.variables["cta"]["href"].as_str().unwrap();
            assert!(href == "#hero-1" || href == "#about-2", "{href}");
            assert_ne!(href, format!("#{}", b.generation_id));
        }
    }

    #[test]
    fn test_single_free_block_clears_self_anchor() {
        let mut pages = vec![page(
            "index.html",
            vec![block("hero", 0, anchor_schema(), json!({"cta": {"label": "x", "href": "#old"}}))],
        )];

        fill_anchors(&mut pages, None);

        assert_eq!(pages[0].blocks[0].variables["cta"], json!({"label": "", "href": ""}));
    }

    #[test]
    fn test_fill_is_deterministic_and_targeted() {
        let make = || {
            vec![
                page(
                    "index.html",
                    vec![
                        block("hero", 0, anchor_schema(), json!({"cta": {"label": "a"}})),
                        block("about", 1, anchor_schema(), json!({"cta": {"label": "b"}})),
                    ],
                ),
                page(
                    "services.html",
                    vec![
                        block("hero", 0, anchor_schema(), json!({"cta": {"label": "c"}})),
                        block("team", 1, FieldSchema::new(), json!({})),
                    ],
                ),
            ]
        };

        let mut first = make();
        let mut second = make();
        fill_anchors(&mut first, None);
        fill_anchors(&mut second, None);
        assert_eq!(first, second);

        let mut targeted = make();
        fill_anchors(&mut targeted, Some("services.html"));
        assert!(targeted[0].blocks[0].variables["cta"].get("href").is_none());
        assert_eq!(targeted[1].blocks[0].variables["cta"]["href"], "#team-1");
    }
}
