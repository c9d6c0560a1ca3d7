//! Wire format for `(RawCard, CompiledCard)` pairs
//!
//! Compiled metadata forms a DAG: a parent or field target card may be
//! reachable along several paths. [`serialize`] includes every resource
//! once and points at it from everywhere else; [`deserialize`] restores one
//! shared `Arc` per compiled card.

mod decode;
pub mod document;
pub mod error;

pub use decode::deserialize;
pub use document::{
    Document, Relationship, RelationshipData, Resource, ResourceIdentifier, COMPILED_METAS,
    FIELDS, RAW_CARDS,
};
pub use error::SerializeError;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::card::{CompiledCard, CompiledField, FormatMeta, RawCard};
use crate::format::Format;

/// Serialize a raw card, and optionally its compiled form
pub fn serialize(raw: &RawCard, compiled: Option<&CompiledCard>) -> Document {
    let url = raw.url();
    let mut encoder = Encoder::default();

    let mut resource = Resource::new(RAW_CARDS, &url);
    resource.attributes = Some(raw_attributes(raw));
    if let Some(compiled) = compiled {
        let meta = encoder.include_compiled(compiled);
        resource.relationships = Some(IndexMap::from([(
            "compiledMeta".to_string(),
            Relationship::one(meta),
        )]));
    }

    debug!(card = %url, included = encoder.included.len(), "serialized card");
    Document {
        data: resource,
        included: encoder.included,
    }
}

/// Write a document as pretty-printed JSON
pub fn to_json(document: &Document) -> Result<String, SerializeError> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Read a document from JSON
pub fn from_json(json: &str) -> Result<Document, SerializeError> {
    Ok(serde_json::from_str(json)?)
}

/// Call-scoped serialization state
#[derive(Default)]
struct Encoder {
    included: Vec<Resource>,
    seen: HashSet<ResourceIdentifier>,
}

impl Encoder {
    fn include_compiled(&mut self, card: &CompiledCard) -> ResourceIdentifier {
        let identifier = ResourceIdentifier::new(COMPILED_METAS, &card.url);
        if !self.seen.insert(identifier.clone()) {
            return identifier;
        }

        let mut relationships = IndexMap::new();
        if let Some(parent) = &card.adopts_from {
            relationships.insert(
                "adoptsFrom".to_string(),
                Relationship::one(self.include_compiled(parent)),
            );
        }
        let fields = card
            .fields
            .values()
            .map(|field| self.include_field(&card.url, field))
            .collect();
        relationships.insert("fields".to_string(), Relationship::many(fields));

        let mut resource = Resource::new(COMPILED_METAS, &card.url);
        resource.attributes = Some(compiled_attributes(card));
        resource.relationships = Some(relationships);
        self.included.push(resource);
        identifier
    }

    fn include_field(&mut self, parent_url: &str, field: &CompiledField) -> ResourceIdentifier {
        let id = format!("{}/{}", parent_url.trim_end_matches('/'), field.name);
        let identifier = ResourceIdentifier::new(FIELDS, &id);
        if !self.seen.insert(identifier.clone()) {
            return identifier;
        }

        let card = self.include_compiled(&field.card);
        let mut resource = Resource::new(FIELDS, id);
        resource.attributes = Some(IndexMap::from([
            ("name".to_string(), Value::from(field.name.as_str())),
            ("fieldType".to_string(), Value::from(field.cardinality.as_str())),
            ("computed".to_string(), Value::from(field.computed)),
        ]));
        resource.relationships = Some(IndexMap::from([(
            "card".to_string(),
            Relationship::one(card),
        )]));
        self.included.push(resource);
        identifier
    }
}

fn insert_opt(attributes: &mut IndexMap<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), Value::from(value.as_str()));
    }
}

fn raw_attributes(raw: &RawCard) -> IndexMap<String, Value> {
    let mut attributes = IndexMap::new();
    attributes.insert("realm".to_string(), Value::from(raw.realm.as_str()));
    insert_opt(&mut attributes, "schema", &raw.schema);
    insert_opt(&mut attributes, "isolated", &raw.isolated);
    insert_opt(&mut attributes, "embedded", &raw.embedded);
    insert_opt(&mut attributes, "edit", &raw.edit);
    insert_opt(&mut attributes, "deserializer", &raw.deserializer);
    insert_opt(&mut attributes, "adoptsFrom", &raw.adopts_from);
    attributes.insert(
        "files".to_string(),
        Value::Object(
            raw.files
                .iter()
                .map(|(path, content)| (path.clone(), Value::from(content.as_str())))
                .collect(),
        ),
    );
    if let Some(data) = &raw.data {
        attributes.insert(
            "data".to_string(),
            Value::Object(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
    }
    attributes
}

fn compiled_attributes(card: &CompiledCard) -> IndexMap<String, Value> {
    let mut attributes = IndexMap::new();
    insert_opt(&mut attributes, "schemaModule", &card.schema_module);
    insert_opt(&mut attributes, "serializer", &card.serializer);
    attributes.insert("inlinable".to_string(), Value::from(card.inlinable));
    for format in Format::ALL {
        if let Some(meta) = card.format(format) {
            attributes.insert(format.to_string(), format_meta_value(meta));
        }
    }
    attributes
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().map(|s| Value::from(s.as_str())).collect())
}

fn format_meta_value(meta: &FormatMeta) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("moduleName".to_string(), Value::from(meta.module_name.as_str()));
    object.insert("usedFields".to_string(), string_array(&meta.used_fields));
    object.insert(
        "serializerMap".to_string(),
        Value::Object(
            meta.serializer_map
                .iter()
                .map(|(name, paths)| (name.clone(), string_array(paths)))
                .collect(),
        ),
    );
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn leaf(url: &str) -> Arc<CompiledCard> {
        let mut card = CompiledCard::new(url);
        card.inlinable = true;
        Arc::new(card)
    }

    fn field(name: &str, card: &Arc<CompiledCard>) -> (String, CompiledField) {
        (
            name.to_string(),
            CompiledField {
                name: name.to_string(),
                cardinality: crate::card::Cardinality::Contains,
                computed: false,
                card: card.clone(),
            },
        )
    }

    #[test]
    fn test_raw_only_document() {
        let raw = RawCard::new("https://cards.test/", "person")
            .with_schema("schema.card", "contains name: \"../string\"");
        let doc = serialize(&raw, None);
        assert_eq!(doc.data.kind, RAW_CARDS);
        assert_eq!(doc.data.id, "https://cards.test/person");
        assert!(doc.data.relationships.is_none());
        assert!(doc.included.is_empty());
        let attributes = doc.data.attributes.expect("Should have attributes");
        assert_eq!(attributes["schema"], Value::from("schema.card"));
        assert!(!attributes.contains_key("adoptsFrom"));
    }

    #[test]
    fn test_shared_card_included_once() {
        let string = leaf("https://cards.test/string");
        let mut person = CompiledCard::new("https://cards.test/person");
        person.fields = [field("first", &string), field("last", &string)]
            .into_iter()
            .collect();

        let raw = RawCard::new("https://cards.test/", "person");
        let doc = serialize(&raw, Some(&person));

        let metas: Vec<_> = doc
            .included
            .iter()
            .filter(|r| r.kind == COMPILED_METAS)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(metas, vec!["https://cards.test/string", "https://cards.test/person"]);
        assert!(doc.find(FIELDS, "https://cards.test/person/first").is_some());
        assert!(doc.find(FIELDS, "https://cards.test/person/last").is_some());
    }

    #[test]
    fn test_json_helpers() {
        let raw = RawCard::new("https://cards.test/", "person");
        let doc = serialize(&raw, None);
        let json = to_json(&doc).expect("Should write");
        assert!(json.contains("\"type\": \"raw-cards\""));
        assert_eq!(from_json(&json).expect("Should read"), doc);
    }
}
