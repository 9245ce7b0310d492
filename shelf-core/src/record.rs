//! Typed records stored through the façade.
//!
//! Business logic can work with raw BSON documents, or declare a type per entity and go
//! through [`TypedEntity`](crate::entity::TypedEntity) handles that convert on the way in
//! and out.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{StoreError, StoreResult},
    schema::Schema,
};

/// A type stored as one entity of the document store.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Name of the entity (the collection) holding records of this type.
    fn entity_name() -> &'static str;

    /// Schema descriptor of the entity.
    fn schema() -> Schema;
}

/// Conversions between records and their stored representations.
pub trait RecordExt: Record {
    fn to_document(&self) -> StoreResult<Document>;

    fn from_document(document: Document) -> StoreResult<Self>;

    fn to_json(&self) -> StoreResult<Value>;

    fn from_json(value: Value) -> StoreResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_document(&self) -> StoreResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(StoreError::Serialization(format!(
                "record of entity {} must serialize to a document, got {other}",
                R::entity_name(),
            ))),
        }
    }

    fn from_document(document: Document) -> StoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> StoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> StoreResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        kind: String,
    }

    impl Record for Item {
        fn entity_name() -> &'static str {
            "items"
        }

        fn schema() -> Schema {
            Schema::new()
                .field("name", FieldSpec::new(FieldType::String).required())
                .field("kind", FieldSpec::new(FieldType::String).default_value("custom"))
        }
    }

    #[test]
    fn converts_to_and_from_documents() {
        let item = Item { name: "Dune".to_string(), kind: "book".to_string() };
        let document = item.to_document().unwrap();

        assert_eq!(document, doc! { "name": "Dune", "kind": "book" });
        assert_eq!(Item::from_document(document).unwrap(), item);
    }

    #[test]
    fn missing_fields_fail_to_deserialize() {
        assert!(matches!(
            Item::from_document(doc! { "name": "Dune" }),
            Err(StoreError::Serialization(_))
        ));
    }
}
