//! Card data model: raw definitions and their compiled form

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::format::Format;

/// How many values a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "containsMany")]
    ContainsMany,
}

impl Cardinality {
    pub fn as_str(self) -> &'static str {
        match self {
            Cardinality::Contains => "contains",
            Cardinality::ContainsMany => "containsMany",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unresolved card definition as read from a realm
///
/// Identity is `url()`, the concatenation of `realm` and `id`. Raw cards are
/// immutable once read and replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCard {
    pub realm: String,
    pub id: String,
    /// Path (into `files`) of the schema source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopts_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deserializer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<IndexMap<String, serde_json::Value>>,
}

impl RawCard {
    pub fn new(realm: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// The card's identity
    pub fn url(&self) -> String {
        format!("{}{}", self.realm, self.id)
    }

    /// Template path declared for a format, if any
    pub fn template_path(&self, format: Format) -> Option<&str> {
        match format {
            Format::Isolated => self.isolated.as_deref(),
            Format::Embedded => self.embedded.as_deref(),
            Format::Edit => self.edit.as_deref(),
        }
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|s| s.as_str())
    }

    /// Attach a schema source under `path`
    pub fn with_schema(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        let path = path.into();
        self.files.insert(path.clone(), source.into());
        self.schema = Some(path);
        self
    }

    /// Attach a template for a format under `path`
    pub fn with_template(
        mut self,
        format: Format,
        path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let path = path.into();
        self.files.insert(path.clone(), source.into());
        let slot = match format {
            Format::Isolated => &mut self.isolated,
            Format::Embedded => &mut self.embedded,
            Format::Edit => &mut self.edit,
        };
        *slot = Some(path);
        self
    }

    pub fn adopting(mut self, parent_url: impl Into<String>) -> Self {
        self.adopts_from = Some(parent_url.into());
        self
    }

    pub fn with_data(mut self, data: IndexMap<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }
}

/// A field as declared by a card's schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub cardinality: Cardinality,
    pub target_card_url: String,
    pub computed: bool,
}

/// A declared field together with its resolved target card
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledField {
    pub name: String,
    pub cardinality: Cardinality,
    pub computed: bool,
    pub card: Arc<CompiledCard>,
}

impl CompiledField {
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::ContainsMany
    }
}

/// Per-format compilation output
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatMeta {
    /// Module specifier returned by the module emitter
    pub module_name: String,
    /// Fields referenced by the template, in first-use order
    #[serde(default)]
    pub used_fields: Vec<String>,
    /// Serializer name -> dotted field paths that need it
    #[serde(default)]
    pub serializer_map: BTreeMap<String, Vec<String>>,
}

/// A resolved card: flattened field graph plus compiled per-format modules
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledCard {
    pub url: String,
    pub adopts_from: Option<Arc<CompiledCard>>,
    /// Flattened fields, ancestors first
    pub fields: IndexMap<String, CompiledField>,
    pub schema_module: Option<String>,
    pub serializer: Option<String>,
    /// Whether the card renders as a bare value with no wrapper component
    pub inlinable: bool,
    pub isolated: Option<FormatMeta>,
    pub embedded: Option<FormatMeta>,
    pub edit: Option<FormatMeta>,
}

impl CompiledCard {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn format(&self, format: Format) -> Option<&FormatMeta> {
        match format {
            Format::Isolated => self.isolated.as_ref(),
            Format::Embedded => self.embedded.as_ref(),
            Format::Edit => self.edit.as_ref(),
        }
    }

    pub fn format_mut(&mut self, format: Format) -> &mut Option<FormatMeta> {
        match format {
            Format::Isolated => &mut self.isolated,
            Format::Embedded => &mut self.embedded,
            Format::Edit => &mut self.edit,
        }
    }

    /// Parent chain, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = &CompiledCard> {
        let mut next = self.adopts_from.as_deref();
        std::iter::from_fn(move || {
            let current = next?;
            next = current.adopts_from.as_deref();
            Some(current)
        })
    }

    /// Whether `url` is this card or one of its ancestors
    pub fn adopts(&self, url: &str) -> bool {
        self.url == url || self.ancestors().any(|a| a.url == url)
    }
}
