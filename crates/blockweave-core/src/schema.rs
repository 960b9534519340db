//! Block field schemas and block packages.
//!
//! A block package bundles a markup template, a style template and a field
//! schema. Field order is significant (nested `block` fields are expanded in
//! declaration order), so [`FieldSchema`] keeps fields in the order they were
//! declared rather than sorting them.

use std::fmt;

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};

/// The typed contract of one content variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(flatten)]
    pub kind: FieldKind,

    /// Free-form hint passed to the content service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Field variants, tagged by `type` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Image,
    Link,
    Anchor,
    Anchors,
    Array {
        #[serde(default)]
        items: FieldSchema,
    },
    Nav,
    Block {
        #[serde(rename = "blockType")]
        block_type: String,
    },
}

impl FieldKind {
    /// The `type` tag of this variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Link => "link",
            Self::Anchor => "anchor",
            Self::Anchors => "anchors",
            Self::Array { .. } => "array",
            Self::Nav => "nav",
            Self::Block { .. } => "block",
        }
    }
}

impl FieldSpec {
    /// Create a field of the given kind without a description.
    #[must_use]
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    /// Shorthand for a nested block field.
    #[must_use]
    pub fn block(block_type: impl Into<String>) -> Self {
        Self::new(FieldKind::Block {
            block_type: block_type.into(),
        })
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The referenced category if this is a `block` field.
    #[must_use]
    pub fn block_type(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Block { block_type } => Some(block_type),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self.kind, FieldKind::Block { .. })
    }

    #[must_use]
    pub fn is_nav(&self) -> bool {
        matches!(self.kind, FieldKind::Nav)
    }
}

/// Ordered map of field name to [`FieldSpec`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSchema {
    fields: Vec<(String, FieldSpec)>,
}

impl FieldSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, spec: FieldSpec) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name, spec)),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.insert(name, spec);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Fields of type `block`, in declaration order.
    pub fn block_fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.iter().filter(|(_, s)| s.is_block())
    }

    /// The first `nav` field, if any.
    #[must_use]
    pub fn nav_field(&self) -> Option<&str> {
        self.iter().find(|(_, s)| s.is_nav()).map(|(n, _)| n)
    }

    /// Names of fields with the given type tag.
    pub fn names_of<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter()
            .filter(move |(_, s)| s.kind.type_name() == type_name)
            .map(|(n, _)| n)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for FieldSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, spec) in &self.fields {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = FieldSchema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to field specs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut schema = FieldSchema::new();
                while let Some((name, spec)) = access.next_entry::<String, FieldSpec>()? {
                    schema.insert(name, spec);
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

impl FromIterator<(String, FieldSpec)> for FieldSchema {
    fn from_iter<I: IntoIterator<Item = (String, FieldSpec)>>(iter: I) -> Self {
        let mut schema = FieldSchema::new();
        for (name, spec) in iter {
            schema.insert(name, spec);
        }
        schema
    }
}

/// A reusable page section: markup template, style template and field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPackage {
    /// Catalog identifier of the package.
    pub id: String,

    /// Category the package satisfies (`header`, `hero`, ...).
    pub category: String,

    /// Markup template source.
    pub markup: String,

    /// Style template source. `#_blockId` is the scoping placeholder.
    pub style: String,

    /// Field schema.
    pub fields: FieldSchema,
}

/// Placeholder selector replaced by the concrete instance id when scoping styles.
pub const BLOCK_ID_PLACEHOLDER: &str = "#_blockId";
