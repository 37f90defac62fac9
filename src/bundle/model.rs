//! # Bundle Model
//!
//! In-memory form of a graphman bundle: entities grouped by section (for example
//! `clusterProperties`, `secrets`, `keys`) and keyed by identity, plus explicit
//! delete mappings.
//!
//! Sections and identities are ordered maps, so the serialized form and the
//! fingerprint never depend on input order.

use crate::crd::EntityRef;
use crate::error::SyncError;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha224};
use std::collections::{BTreeMap, BTreeSet};

/// Section holding bundle metadata such as mappings
const PROPERTIES_SECTION: &str = "properties";

/// A graphman bundle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    entities: BTreeMap<String, BTreeMap<String, Value>>,
    deletes: BTreeMap<String, BTreeSet<String>>,
}

/// Identity of an entity: `name`, else `alias`, else `goid`
pub fn entity_identity(entity: &Value) -> Option<String> {
    ["name", "alias", "goid"].iter().find_map(|field| {
        entity
            .get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

/// Lowercase hex SHA-224 of `bytes`
pub fn sha224_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha224::digest(bytes))
}

/// Serialize `value` with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, &Value> = map.iter().collect();
                out.push('{');
                for (i, (key, value)) in sorted.into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String(key.clone()).to_string());
                    out.push(':');
                    write(value, out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            scalar => out.push_str(&scalar.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a graphman bundle document.
    ///
    /// Every top-level array is a section. `properties.mappings` entries with
    /// action `DELETE` become deletes.
    pub fn from_json(document: &Value) -> Result<Self, SyncError> {
        let object = document
            .as_object()
            .ok_or_else(|| SyncError::configuration("bundle document is not a JSON object"))?;

        let mut bundle = Self::new();
        for (section, items) in object {
            if section == PROPERTIES_SECTION {
                bundle.read_mappings(items);
                continue;
            }
            let Some(items) = items.as_array() else {
                continue;
            };
            for item in items {
                bundle.upsert(section, item.clone())?;
            }
        }

        // A deleted entity also appears in its section; keep it only as a delete
        for (section, names) in &bundle.deletes {
            if let Some(entities) = bundle.entities.get_mut(section) {
                entities.retain(|identity, _| !names.contains(identity));
            }
        }
        bundle.entities.retain(|_, entities| !entities.is_empty());
        Ok(bundle)
    }

    fn read_mappings(&mut self, properties: &Value) {
        let Some(mappings) = properties.get("mappings").and_then(Value::as_object) else {
            return;
        };
        for (section, entries) in mappings {
            for entry in entries.as_array().into_iter().flatten() {
                let is_delete = entry.get("action").and_then(Value::as_str) == Some("DELETE");
                let source = entry.get("source").and_then(entity_identity);
                if let (true, Some(name)) = (is_delete, source) {
                    self.tombstone(section, name);
                }
            }
        }
    }

    /// Insert or replace an entity. Fails when the entity has no identity.
    pub fn upsert(&mut self, section: &str, entity: Value) -> Result<(), SyncError> {
        let identity = entity_identity(&entity).ok_or_else(|| {
            SyncError::configuration(format!(
                "entity in section '{section}' has no name, alias or goid"
            ))
        })?;
        self.entities
            .entry(section.to_string())
            .or_default()
            .insert(identity, entity);
        Ok(())
    }

    /// Insert an entity under a known identity
    pub(crate) fn insert(&mut self, section: &str, identity: String, entity: Value) {
        self.entities
            .entry(section.to_string())
            .or_default()
            .insert(identity, entity);
    }

    /// Remove an entity, dropping its section when it becomes empty
    pub fn remove(&mut self, section: &str, identity: &str) -> Option<Value> {
        let entities = self.entities.get_mut(section)?;
        let removed = entities.remove(identity);
        if entities.is_empty() {
            self.entities.remove(section);
        }
        removed
    }

    /// Record an explicit delete for `name` in `section`
    pub fn tombstone(&mut self, section: &str, name: impl Into<String>) {
        self.deletes
            .entry(section.to_string())
            .or_default()
            .insert(name.into());
    }

    /// Add a delete for every entry of `previous` that this bundle no longer contains
    pub fn tombstone_missing(&mut self, previous: &[EntityRef]) {
        for entity in previous {
            let present = self
                .entities
                .get(&entity.kind)
                .is_some_and(|section| section.contains_key(&entity.name));
            if !present {
                self.tombstone(&entity.kind, entity.name.clone());
            }
        }
    }

    /// Merge `other` into this bundle. Entities in `other` win on identity clashes.
    pub fn merge(&mut self, other: Bundle) {
        for (section, entities) in other.entities {
            self.entities.entry(section).or_default().extend(entities);
        }
        for (section, names) in other.deletes {
            self.deletes.entry(section).or_default().extend(names);
        }
    }

    /// Bundle that deletes every entity of this one
    pub fn to_delete_bundle(&self) -> Bundle {
        let mut bundle = Bundle::new();
        for entity in self.entity_refs() {
            bundle.tombstone(&entity.kind, entity.name);
        }
        bundle
    }

    pub fn get(&self, section: &str, identity: &str) -> Option<&Value> {
        self.entities.get(section)?.get(identity)
    }

    pub fn section(&self, section: &str) -> impl Iterator<Item = (&String, &Value)> {
        self.entities.get(section).into_iter().flatten()
    }

    pub fn sections(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, Value>)> {
        self.entities.iter()
    }

    pub fn deletes(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.deletes
    }

    pub fn has_deletes(&self) -> bool {
        self.deletes.values().any(|names| !names.is_empty())
    }

    /// No entities and no deletes
    pub fn is_empty(&self) -> bool {
        self.entities.values().all(BTreeMap::is_empty) && !self.has_deletes()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    /// Identities of all desired entities, sorted
    pub fn entity_refs(&self) -> Vec<EntityRef> {
        self.entities
            .iter()
            .flat_map(|(section, entities)| {
                entities.keys().map(move |name| EntityRef {
                    kind: section.clone(),
                    name: name.clone(),
                })
            })
            .collect()
    }

    /// Drop all deletes, keeping only desired entities
    pub fn without_deletes(&self) -> Bundle {
        Bundle {
            entities: self.entities.clone(),
            deletes: BTreeMap::new(),
        }
    }

    /// Desired entities only, as a canonical JSON document
    fn desired_document(&self) -> Value {
        let mut document = Map::new();
        for (section, entities) in &self.entities {
            if entities.is_empty() {
                continue;
            }
            document.insert(
                section.clone(),
                Value::Array(entities.values().cloned().collect()),
            );
        }
        Value::Object(document)
    }

    /// Fingerprint of the desired state. Deletes are not part of it.
    pub fn fingerprint(&self) -> String {
        sha224_hex(canonical_json(&self.desired_document()).as_bytes())
    }

    /// Graphman wire document, including delete mappings
    pub fn to_json(&self) -> Value {
        let mut document = match self.desired_document() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if !self.has_deletes() {
            return Value::Object(document);
        }

        let mut mappings = Map::new();
        for (section, names) in &self.deletes {
            if names.is_empty() {
                continue;
            }
            let entries = document
                .entry(section.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entries {
                items.extend(names.iter().map(|name| json!({ "name": name })));
            }
            mappings.insert(
                section.clone(),
                Value::Array(
                    names
                        .iter()
                        .map(|name| json!({ "action": "DELETE", "source": { "name": name } }))
                        .collect(),
                ),
            );
        }
        document.insert(
            PROPERTIES_SECTION.to_string(),
            json!({ "mappings": mappings }),
        );
        Value::Object(document)
    }
}
