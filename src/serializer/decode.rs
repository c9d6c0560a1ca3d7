//! Reading documents back into cards

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::card::{Cardinality, CompiledCard, CompiledField, FormatMeta, RawCard};

use super::document::{
    Document, RelationshipData, Resource, ResourceIdentifier, COMPILED_METAS, FIELDS, RAW_CARDS,
};
use super::error::SerializeError;

/// Attributes of a `compiled-metas` resource
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompiledMetaAttributes {
    #[serde(default)]
    schema_module: Option<String>,
    #[serde(default)]
    serializer: Option<String>,
    #[serde(default)]
    inlinable: bool,
    #[serde(default)]
    isolated: Option<FormatMeta>,
    #[serde(default)]
    embedded: Option<FormatMeta>,
    #[serde(default)]
    edit: Option<FormatMeta>,
}

/// Attributes of a `fields` resource
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldAttributes {
    name: String,
    field_type: Cardinality,
    #[serde(default)]
    computed: bool,
}

/// Rebuild a raw card and its compiled form from a document
///
/// A compiled card reachable along several relationship paths becomes a
/// single shared `Arc`.
pub fn deserialize(
    document: &Document,
) -> Result<(RawCard, Option<Arc<CompiledCard>>), SerializeError> {
    let data = &document.data;
    if data.kind != RAW_CARDS {
        return Err(SerializeError::UnknownResourceType {
            kind: data.kind.clone(),
            id: data.id.clone(),
        });
    }

    let raw = raw_card(data)?;
    let mut decoder = Decoder::new(document);
    let compiled = match data.relationship("compiledMeta") {
        Some(relationship) => {
            let target = single(data, "compiledMeta", &relationship.data)?;
            Some(decoder.compiled(target)?)
        }
        None => None,
    };

    debug!(card = %data.id, compiled = decoder.cache.len(), "deserialized card");
    Ok((raw, compiled))
}

fn raw_card(resource: &Resource) -> Result<RawCard, SerializeError> {
    let mut attributes = attributes_of(resource)?.clone();
    let realm = attributes
        .get("realm")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            SerializeError::invalid_attribute(
                &resource.kind,
                &resource.id,
                "missing string attribute 'realm'",
            )
        })?
        .to_string();
    let id = resource.id.strip_prefix(realm.as_str()).ok_or_else(|| {
        SerializeError::invalid_attribute(
            &resource.kind,
            &resource.id,
            format!("id is not inside realm '{}'", realm),
        )
    })?;
    attributes.insert("id".to_string(), Value::from(id));
    parse_attributes(resource, attributes)
}

fn attributes_of(resource: &Resource) -> Result<&IndexMap<String, Value>, SerializeError> {
    resource
        .attributes
        .as_ref()
        .ok_or_else(|| SerializeError::missing_attributes(&resource.kind, &resource.id))
}

fn parse_attributes<T: DeserializeOwned>(
    resource: &Resource,
    attributes: IndexMap<String, Value>,
) -> Result<T, SerializeError> {
    serde_json::from_value(Value::Object(attributes.into_iter().collect()))
        .map_err(|e| SerializeError::invalid_attribute(&resource.kind, &resource.id, e))
}

fn single<'d>(
    resource: &Resource,
    name: &str,
    data: &'d RelationshipData,
) -> Result<&'d ResourceIdentifier, SerializeError> {
    match data {
        RelationshipData::One(target) => Ok(target),
        RelationshipData::Many(_) => Err(SerializeError::invalid_relationship(
            &resource.kind,
            &resource.id,
            name,
            "expected a single resource",
        )),
    }
}

/// Call-scoped deserialization state
struct Decoder<'d> {
    index: HashMap<(&'d str, &'d str), &'d Resource>,
    cache: HashMap<String, Arc<CompiledCard>>,
    in_progress: Vec<String>,
}

impl<'d> Decoder<'d> {
    fn new(document: &'d Document) -> Self {
        let mut index = HashMap::new();
        for resource in &document.included {
            index
                .entry((resource.kind.as_str(), resource.id.as_str()))
                .or_insert(resource);
        }
        Self {
            index,
            cache: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    fn lookup(&self, target: &ResourceIdentifier, expected: &str) -> Result<&'d Resource, SerializeError> {
        if target.kind != expected {
            return Err(SerializeError::UnknownResourceType {
                kind: target.kind.clone(),
                id: target.id.clone(),
            });
        }
        self.index
            .get(&(target.kind.as_str(), target.id.as_str()))
            .copied()
            .ok_or_else(|| SerializeError::DanglingRelationship {
                kind: target.kind.clone(),
                id: target.id.clone(),
            })
    }

    fn compiled(&mut self, target: &ResourceIdentifier) -> Result<Arc<CompiledCard>, SerializeError> {
        if let Some(card) = self.cache.get(&target.id) {
            trace!(card = %target.id, "identity cache hit");
            return Ok(card.clone());
        }
        if self.in_progress.contains(&target.id) {
            return Err(SerializeError::CyclicRelationship {
                id: target.id.clone(),
            });
        }
        let resource = self.lookup(target, COMPILED_METAS)?;

        self.in_progress.push(target.id.clone());
        let result = self.build_compiled(resource);
        self.in_progress.pop();

        let card = Arc::new(result?);
        self.cache.insert(target.id.clone(), card.clone());
        Ok(card)
    }

    fn build_compiled(&mut self, resource: &'d Resource) -> Result<CompiledCard, SerializeError> {
        let attributes: CompiledMetaAttributes =
            parse_attributes(resource, attributes_of(resource)?.clone())?;

        let mut card = CompiledCard::new(&resource.id);
        card.schema_module = attributes.schema_module;
        card.serializer = attributes.serializer;
        card.inlinable = attributes.inlinable;
        card.isolated = attributes.isolated;
        card.embedded = attributes.embedded;
        card.edit = attributes.edit;

        if let Some(relationship) = resource.relationship("adoptsFrom") {
            let parent = single(resource, "adoptsFrom", &relationship.data)?;
            card.adopts_from = Some(self.compiled(parent)?);
        }

        if let Some(relationship) = resource.relationship("fields") {
            let RelationshipData::Many(targets) = &relationship.data else {
                return Err(SerializeError::invalid_relationship(
                    &resource.kind,
                    &resource.id,
                    "fields",
                    "expected a list of resources",
                ));
            };
            for target in targets {
                let field = self.field(target)?;
                card.fields.insert(field.name.clone(), field);
            }
        }
        Ok(card)
    }

    fn field(&mut self, target: &ResourceIdentifier) -> Result<CompiledField, SerializeError> {
        let resource = self.lookup(target, FIELDS)?;
        let attributes: FieldAttributes =
            parse_attributes(resource, attributes_of(resource)?.clone())?;

        let relationship = resource.relationship("card").ok_or_else(|| {
            SerializeError::invalid_relationship(
                &resource.kind,
                &resource.id,
                "card",
                "missing field target card",
            )
        })?;
        let card = self.compiled(single(resource, "card", &relationship.data)?)?;

        Ok(CompiledField {
            name: attributes.name,
            cardinality: attributes.field_type,
            computed: attributes.computed,
            card,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{serialize, Relationship};

    fn document(included: Vec<Resource>) -> Document {
        let mut data = Resource::new(RAW_CARDS, "https://cards.test/person");
        data.attributes = Some(IndexMap::from([(
            "realm".to_string(),
            Value::from("https://cards.test/"),
        )]));
        data.relationships = Some(IndexMap::from([(
            "compiledMeta".to_string(),
            Relationship::one(ResourceIdentifier::new(COMPILED_METAS, "https://cards.test/person")),
        )]));
        Document { data, included }
    }

    fn meta(id: &str, relationships: Vec<(&str, Relationship)>) -> Resource {
        let mut resource = Resource::new(COMPILED_METAS, id);
        resource.attributes = Some(IndexMap::new());
        resource.relationships = Some(
            relationships
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        );
        resource
    }

    #[test]
    fn test_raw_card_without_compiled() {
        let raw = RawCard::new("https://cards.test/", "person")
            .with_schema("schema.card", "contains name: \"../string\"");
        let (decoded, compiled) = deserialize(&serialize(&raw, None)).expect("Should decode");
        assert_eq!(decoded, raw);
        assert!(compiled.is_none());
    }

    #[test]
    fn test_dangling_relationship() {
        let err = deserialize(&document(vec![])).unwrap_err();
        assert!(matches!(err, SerializeError::DanglingRelationship { .. }));
    }

    #[test]
    fn test_raw_card_requires_realm() {
        let mut doc = document(vec![]);
        doc.data.attributes = Some(IndexMap::from([(
            "files".to_string(),
            Value::Object(Default::default()),
        )]));
        let err = deserialize(&doc).unwrap_err();
        match err {
            SerializeError::InvalidAttribute { id, message, .. } => {
                assert_eq!(id, "https://cards.test/person");
                assert!(message.contains("realm"));
            }
            other => panic!("Expected InvalidAttribute, got {:?}", other),
        }
    }

    #[test]
    fn test_field_with_missing_card_is_dangling() {
        let mut field = Resource::new(FIELDS, "https://cards.test/person/name");
        field.attributes = Some(IndexMap::from([
            ("name".to_string(), Value::from("name")),
            ("fieldType".to_string(), Value::from("contains")),
            ("computed".to_string(), Value::from(false)),
        ]));
        field.relationships = Some(IndexMap::from([(
            "card".to_string(),
            Relationship::one(ResourceIdentifier::new(
                COMPILED_METAS,
                "https://cardstack.com/base/string",
            )),
        )]));
        let err = deserialize(&document(vec![
            meta(
                "https://cards.test/person",
                vec![("fields", Relationship::many(vec![field.identifier()]))],
            ),
            field,
        ]))
        .unwrap_err();
        match err {
            SerializeError::DanglingRelationship { kind, id } => {
                assert_eq!(kind, COMPILED_METAS);
                assert_eq!(id, "https://cardstack.com/base/string");
            }
            other => panic!("Expected DanglingRelationship, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_attributes() {
        let mut resource = meta("https://cards.test/person", vec![]);
        resource.attributes = None;
        let err = deserialize(&document(vec![resource])).unwrap_err();
        assert!(matches!(err, SerializeError::MissingAttributes { .. }));
    }

    #[test]
    fn test_unknown_primary_type() {
        let mut doc = document(vec![]);
        doc.data.kind = "pictures".to_string();
        let err = deserialize(&doc).unwrap_err();
        assert!(matches!(err, SerializeError::UnknownResourceType { .. }));
    }

    #[test]
    fn test_cyclic_adoption_is_rejected() {
        let parent = ResourceIdentifier::new(COMPILED_METAS, "https://cards.test/base");
        let child = ResourceIdentifier::new(COMPILED_METAS, "https://cards.test/person");
        let err = deserialize(&document(vec![
            meta("https://cards.test/person", vec![("adoptsFrom", Relationship::one(parent))]),
            meta("https://cards.test/base", vec![("adoptsFrom", Relationship::one(child))]),
        ]))
        .unwrap_err();
        assert!(matches!(err, SerializeError::CyclicRelationship { .. }));
    }

    #[test]
    fn test_invalid_field_type() {
        let mut field = Resource::new(FIELDS, "https://cards.test/person/name");
        field.attributes = Some(IndexMap::from([
            ("name".to_string(), Value::from("name")),
            ("fieldType".to_string(), Value::from("containsSome")),
        ]));
        let err = deserialize(&document(vec![
            meta(
                "https://cards.test/person",
                vec![("fields", Relationship::many(vec![field.identifier()]))],
            ),
            field,
        ]))
        .unwrap_err();
        assert!(matches!(err, SerializeError::InvalidAttribute { .. }));
    }
}
