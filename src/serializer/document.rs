//! Wire document types
//!
//! A document carries one primary resource plus every resource it
//! references, each included once:
//!
//! ```json
//! {
//!   "data": { "type": "raw-cards", "id": "https://cards.test/person", ... },
//!   "included": [ { "type": "compiled-metas", ... }, { "type": "fields", ... } ]
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RAW_CARDS: &str = "raw-cards";
pub const COMPILED_METAS: &str = "compiled-metas";
pub const FIELDS: &str = "fields";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub data: Resource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
}

impl Document {
    /// Find an included resource
    pub fn find(&self, kind: &str, id: &str) -> Option<&Resource> {
        self.included.iter().find(|r| r.kind == kind && r.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<IndexMap<String, Relationship>>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: None,
            relationships: None,
        }
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(&self.kind, &self.id)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.as_ref()?.get(name)
    }
}

/// A `{type, id}` pointer to a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub data: RelationshipData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    One(ResourceIdentifier),
    Many(Vec<ResourceIdentifier>),
}

impl Relationship {
    pub fn one(target: ResourceIdentifier) -> Self {
        Self {
            data: RelationshipData::One(target),
        }
    }

    pub fn many(targets: Vec<ResourceIdentifier>) -> Self {
        Self {
            data: RelationshipData::Many(targets),
        }
    }
}
