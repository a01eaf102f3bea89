//! Serialization-aware document schemas and the type registry.
//!
//! A [`Schema`] describes the serialization shape of a value at one position
//! in a document tree: a document with named members, an array with a known
//! item shape, a scalar leaf, or no information at all. Field resolution
//! walks schemas recursively along dotted paths; value serialization renames
//! member keys to their wire names.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker trait linking a Rust document type to its registry name.
pub trait DocumentType {
    const NAME: &'static str;
}

/// Serialization shape of a value at one position in a document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Schema {
    /// No shape information. Member lookups fail softly and values pass
    /// through untouched. This is the schema of a plain/dynamic document.
    Dynamic,
    /// A scalar leaf (string, number, boolean, ...).
    Scalar,
    /// A document with known members.
    Document(DocumentSchema),
    /// An array whose items share one schema.
    Array(Box<Schema>),
}

impl Schema {
    /// Start building a document schema.
    pub fn document() -> DocumentSchemaBuilder {
        DocumentSchemaBuilder {
            members: IndexMap::new(),
        }
    }

    /// An array schema with the given item schema.
    pub fn array(item: Schema) -> Self {
        Schema::Array(Box::new(item))
    }

    /// Look up a member by its declared name. Only document schemas have
    /// members.
    pub fn member(&self, name: &str) -> Option<&Member> {
        match self {
            Schema::Document(doc) => doc.member(name),
            _ => None,
        }
    }

    /// The item schema, when this schema describes an array.
    pub fn item(&self) -> Option<&Schema> {
        match self {
            Schema::Array(item) => Some(item),
            _ => None,
        }
    }

    /// Serialize a value at this schema position.
    ///
    /// Document members are renamed to their wire names recursively, array
    /// items are serialized with the item schema, and everything else passes
    /// through unchanged. Keys with no matching member are kept as written.
    pub fn serialize_value(&self, value: &Value) -> Value {
        match (self, value) {
            (Schema::Document(doc), Value::Object(map)) => {
                let mut out = serde_json::Map::new();
                for (key, val) in map {
                    match doc.member(key) {
                        Some(member) => {
                            out.insert(
                                member.wire_name.clone(),
                                member.schema.serialize_value(val),
                            );
                        }
                        None => {
                            out.insert(key.clone(), val.clone());
                        }
                    }
                }
                Value::Object(out)
            }
            (Schema::Array(item), Value::Array(values)) => {
                Value::Array(values.iter().map(|v| item.serialize_value(v)).collect())
            }
            _ => value.clone(),
        }
    }
}

/// A member of a document schema: the wire name it serializes under and the
/// schema of its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub wire_name: String,
    pub schema: Schema,
}

/// Schema for a document type with named members.
///
/// Members are looked up by their declared (source) name; rendering
/// substitutes the wire name. Declaration order is preserved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentSchema {
    members: IndexMap<String, Member>,
}

impl DocumentSchema {
    /// Look up a member by declared name.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }
}

/// Fluent builder for [`DocumentSchema`].
pub struct DocumentSchemaBuilder {
    members: IndexMap<String, Member>,
}

impl DocumentSchemaBuilder {
    /// Declare a member whose wire name equals its declared name.
    pub fn field(self, name: &str, schema: Schema) -> Self {
        self.renamed(name, name, schema)
    }

    /// Declare a member that serializes under a different wire name.
    pub fn renamed(mut self, name: &str, wire_name: &str, schema: Schema) -> Self {
        self.members.insert(
            name.to_string(),
            Member {
                wire_name: wire_name.to_string(),
                schema,
            },
        );
        self
    }

    /// Finish building, yielding a document schema.
    pub fn build(self) -> Schema {
        Schema::Document(DocumentSchema {
            members: self.members,
        })
    }
}

const DYNAMIC: Schema = Schema::Dynamic;

/// Read-mostly lookup table of schemas by document type name.
///
/// The renderer consults the registry as a last resort when a field carries
/// no schema of its own (projection `$elemMatch`). The core never mutates a
/// registry after construction.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema for a document type.
    pub fn register<T: DocumentType>(mut self, schema: Schema) -> Self {
        self.schemas.insert(T::NAME.to_string(), schema);
        self
    }

    /// The schema registered for a document type, or [`Schema::Dynamic`].
    pub fn schema_of<T: DocumentType>(&self) -> &Schema {
        self.get(T::NAME).unwrap_or(&DYNAMIC)
    }

    /// The schema registered under a type name, if any.
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> Schema {
        Schema::document()
            .renamed("Name", "name", Schema::Scalar)
            .renamed(
                "Address",
                "addr",
                Schema::document()
                    .renamed("City", "city", Schema::Scalar)
                    .build(),
            )
            .renamed("Tags", "tags", Schema::array(Schema::Scalar))
            .build()
    }

    #[test]
    fn test_member_lookup() {
        let schema = person_schema();
        let member = schema.member("Name").unwrap();
        assert_eq!(member.wire_name, "name");
        assert_eq!(member.schema, Schema::Scalar);
        assert!(schema.member("name").is_none());
        assert!(schema.member("missing").is_none());
    }

    #[test]
    fn test_item_lookup() {
        let schema = person_schema();
        let tags = &schema.member("Tags").unwrap().schema;
        assert_eq!(tags.item(), Some(&Schema::Scalar));
        assert!(schema.item().is_none());
    }

    #[test]
    fn test_serialize_value_renames_members() {
        let schema = person_schema();
        let value = json!({"Name": "Alice", "Address": {"City": "Portland"}});
        assert_eq!(
            schema.serialize_value(&value),
            json!({"name": "Alice", "addr": {"city": "Portland"}})
        );
    }

    #[test]
    fn test_serialize_value_keeps_unknown_keys() {
        let schema = person_schema();
        let value = json!({"Name": "Alice", "extra": 1});
        assert_eq!(
            schema.serialize_value(&value),
            json!({"name": "Alice", "extra": 1})
        );
    }

    #[test]
    fn test_serialize_value_maps_array_items() {
        let schema = Schema::array(
            Schema::document()
                .renamed("Id", "_id", Schema::Scalar)
                .build(),
        );
        let value = json!([{"Id": 1}, {"Id": 2}]);
        assert_eq!(
            schema.serialize_value(&value),
            json!([{"_id": 1}, {"_id": 2}])
        );
    }

    #[test]
    fn test_serialize_value_scalar_passthrough() {
        assert_eq!(Schema::Scalar.serialize_value(&json!(42)), json!(42));
        assert_eq!(
            Schema::Dynamic.serialize_value(&json!({"a": 1})),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_registry_lookup_and_fallback() {
        struct Person;
        impl DocumentType for Person {
            const NAME: &'static str = "Person";
        }

        let registry = SchemaRegistry::new().register::<Person>(person_schema());
        assert_eq!(registry.schema_of::<Person>(), &person_schema());
        assert!(registry.get("Person").is_some());
        assert!(registry.get("Order").is_none());

        struct Order;
        impl DocumentType for Order {
            const NAME: &'static str = "Order";
        }
        assert_eq!(registry.schema_of::<Order>(), &Schema::Dynamic);
    }

    #[test]
    fn test_schema_serde_roundtrip() {
        let schema = person_schema();
        let encoded = serde_json::to_string(&schema).unwrap();
        let decoded: Schema = serde_json::from_str(&encoded).unwrap();
        assert_eq!(schema, decoded);
    }
}
