//! Nested block expansion.
//!
//! A `block` field pulls another package into its owner. Expansion walks those
//! references and hoists the nested packages' fields into one flat namespace so
//! the whole composition can be filled by a single content request. The walk
//! is bounded by `max_level`; self-referential packages therefore terminate
//! with an unexpanded stub at the bound.
//!
//! The result is an arena: [`ExpansionNode`]s link to their parent by index and
//! own indices into the flat [`FlatEntry`] table. Flattened names stay
//! structured ([`FlatKey`]) and are encoded as `{field}{rootKey}{key}{level}`
//! only when they cross the content boundary.
//!
//! Per root slot, only the first nested `block` field of each nested package
//! is followed, so every root slot expands to a chain.

use std::fmt;

use blockweave_core::{BlockPackage, FieldSchema, FieldSpec};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::{
    render::{compile_style, render_markup},
    store::BlockStore,
};

/// Position of a nested block: the root slot it hangs off, its own field key
/// and its depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotPath {
    pub root_key: String,
    pub key: String,
    pub level: usize,
}

impl SlotPath {
    /// `{rootKey}{key}{level}`
    #[must_use]
    pub fn suffix(&self) -> String {
        format!("{}{}{}", self.root_key, self.key, self.level)
    }
}

/// A flattened variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlatKey {
    pub field: String,
    /// `None` for fields of the root definition.
    pub slot: Option<SlotPath>,
}

impl FlatKey {
    #[must_use]
    pub fn root(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            slot: None,
        }
    }

    #[must_use]
    pub fn nested(field: impl Into<String>, slot: SlotPath) -> Self {
        Self {
            field: field.into(),
            slot: Some(slot),
        }
    }

    /// Wire form of the name.
    #[must_use]
    pub fn encode(&self) -> String {
        match &self.slot {
            Some(slot) => format!("{}{}", self.field, slot.suffix()),
            None => self.field.clone(),
        }
    }
}

impl fmt::Display for FlatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatEntry {
    pub key: FlatKey,
    pub spec: FieldSpec,
}

/// One expanded nested block.
#[derive(Debug, Clone)]
pub struct ExpansionNode {
    pub record: SlotPath,
    pub parent: Option<usize>,
    pub package_id: String,
    pub category: String,
    pub markup: String,
    pub style: String,
    /// Indices into [`Expansion::entries`].
    pub entries: Vec<usize>,
    /// First nested `block` field of this package, as `(key, category)`.
    pub nested: Option<(String, String)>,
}

/// Flattened view of a package and its nested blocks.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub entries: Vec<FlatEntry>,
    pub nodes: Vec<ExpansionNode>,
}

/// Flat values folded back into nested `block` objects.
#[derive(Debug, Clone, Default)]
pub struct Regrouped {
    pub variables: Map<String, Value>,
    /// Scoped styles of the nested blocks, to append to the owner's style.
    pub style: String,
    /// Render errors of nested blocks.
    pub errors: Vec<String>,
}

impl Expansion {
    /// Expand every `block` field of `definition`, fetching nested packages from `store`.
    ///
    /// Missing nested packages are skipped with a warning.
    pub async fn expand(
        definition: &BlockPackage,
        store: &dyn BlockStore,
        max_level: usize,
    ) -> Self {
        let mut expansion = Self {
            entries: definition
                .fields
                .iter()
                .map(|(name, spec)| FlatEntry {
                    key: FlatKey::root(name),
                    spec: spec.clone(),
                })
                .collect(),
            nodes: Vec::new(),
        };

        for (root_key, spec) in definition.fields.block_fields() {
            let Some(category) = spec.block_type() else {
                continue;
            };
            expansion
                .expand_chain(store, root_key, category, max_level)
                .await;
        }

        debug!(
            package = %definition.id,
            nested = expansion.nodes.len(),
            flat = expansion.entries.len(),
            "expanded block definition"
        );

        expansion
    }

    async fn expand_chain(
        &mut self,
        store: &dyn BlockStore,
        root_key: &str,
        root_category: &str,
        max_level: usize,
    ) {
        let mut key = root_key.to_string();
        let mut category = root_category.to_string();
        let mut parent = None;
        let mut level = 0;

        while level < max_level {
            let package = match store.fetch_random_active_block(&category).await {
                Ok(package) => package,
                Err(e) => {
                    warn!(category = %category, error = %e, "nested block unavailable, skipping");
                    return;
                }
            };

            let record = SlotPath {
                root_key: root_key.to_string(),
                key: key.clone(),
                level,
            };

            let mut entries = Vec::new();
            for (field, spec) in package.fields.iter().filter(|(_, s)| !s.is_block()) {
                entries.push(self.entries.len());
                self.entries.push(FlatEntry {
                    key: FlatKey::nested(field, record.clone()),
                    spec: spec.clone(),
                });
            }

            let nested = package
                .fields
                .block_fields()
                .find_map(|(k, s)| s.block_type().map(|c| (k.to_string(), c.to_string())));

            let index = self.nodes.len();
            self.nodes.push(ExpansionNode {
                record,
                parent,
                package_id: package.id,
                category: package.category,
                markup: package.markup,
                style: package.style,
                entries,
                nested: nested.clone(),
            });

            match nested {
                Some((next_key, next_category)) => {
                    key = next_key;
                    category = next_category;
                    parent = Some(index);
                    level += 1;
                }
                None => return,
            }
        }

        debug!(root = root_key, max_level, "expansion bound reached");
    }

    /// Expansion records in discovery order.
    pub fn records(&self) -> impl Iterator<Item = &SlotPath> {
        self.nodes.iter().map(|n| &n.record)
    }

    /// Number of expanded levels below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.record.level + 1)
            .max()
            .unwrap_or(0)
    }

    /// The schema sent for content generation: every flat field except
    /// `block` and `nav` fields, under its encoded name.
    #[must_use]
    pub fn content_schema(&self) -> FieldSchema {
        self.entries
            .iter()
            .filter(|e| !e.spec.is_block() && !e.spec.is_nav())
            .map(|e| (e.key.encode(), e.spec.clone()))
            .collect()
    }

    /// Fold generated flat `values` back into nested `block` objects.
    ///
    /// Nested blocks are rendered deepest first so that each parent receives
    /// its child's `htmlContent`. Nested instance ids derive from `owner_id`.
    #[must_use]
    pub fn regroup(&self, mut values: Map<String, Value>, owner_id: &str) -> Regrouped {
        let mut node_vars: Vec<Map<String, Value>> = self
            .nodes
            .iter()
            .map(|node| {
                let mut vars = Map::new();
                for &idx in &node.entries {
                    let entry = &self.entries[idx];
                    if let Some(value) = values.remove(&entry.key.encode()) {
                        vars.insert(entry.key.field.clone(), value);
                    }
                }
                if let Some((key, category)) = &node.nested {
                    vars.insert(key.clone(), block_stub(category));
                }
                vars
            })
            .collect();

        let mut order: Vec<usize> = (0..self.nodes.len()).collect();
        order.sort_by(|a, b| self.nodes[*b].record.level.cmp(&self.nodes[*a].record.level));

        let mut styles = vec![String::new(); self.nodes.len()];
        let mut root_objects = Map::new();
        let mut errors = Vec::new();

        for index in order {
            let node = &self.nodes[index];
            let nested_id = format!(
                "{owner_id}--{}-{}{}",
                node.record.root_key, node.record.key, node.record.level
            );
            let vars = std::mem::take(&mut node_vars[index]);

            let rendered = render_markup(&node.markup, &node.category, &nested_id, &vars, false);
            if let Some(error) = rendered.error {
                errors.push(format!("{}: {error}", node.category));
            }
            // A nested style that does not compile is dropped: appended raw, its
            // placeholder would be scoped to the owner.
            if !node.style.trim().is_empty() {
                styles[index] = compile_style(&node.style, &nested_id).unwrap_or_default();
            }

            let object = json!({
                "type": "block",
                "blockType": node.category,
                "htmlContent": rendered.html,
                "variables": vars,
            });

            match node.parent {
                Some(parent) => {
                    node_vars[parent].insert(node.record.key.clone(), object);
                }
                None => {
                    root_objects.insert(node.record.root_key.clone(), object);
                }
            }
        }

        let mut variables = Map::new();
        for entry in self.entries.iter().filter(|e| e.key.slot.is_none()) {
            let name = &entry.key.field;
            if let Some(category) = entry.spec.block_type() {
                let object = root_objects
                    .remove(name)
                    .unwrap_or_else(|| block_stub(category));
                values.remove(name);
                variables.insert(name.clone(), object);
            } else if let Some(value) = values.remove(name) {
                variables.insert(name.clone(), value);
            }
        }
        // Anything else the content service returned stays at the root.
        variables.extend(values);

        let style = styles
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Regrouped {
            variables,
            style,
            errors,
        }
    }
}

/// Inert placeholder for a `block` field that was not expanded.
fn block_stub(category: &str) -> Value {
    json!({
        "type": "block",
        "blockType": category,
        "htmlContent": "",
    })
}
