//! Per-entity schema descriptors.
//!
//! A [`Schema`] is an ordered mapping from field name to [`FieldSpec`]. It drives the checks
//! the façade runs before handing documents to a connector, the indexes a connector creates
//! when it first sees an entity, and the sanitization of documents before they leave the
//! system.
//!
//! ```ignore
//! use shelf_core::schema::{FieldSpec, FieldType, Schema};
//!
//! let users = Schema::new()
//!     .field("email", FieldSpec::new(FieldType::String).required().unique().index().lowercase())
//!     .field("access_token", FieldSpec::new(FieldType::String).required().unique())
//!     .field("collections", FieldSpec::new(FieldType::Array).hide())
//!     .field("last_connected", FieldSpec::new(FieldType::Date).default_now());
//! ```
//!
//! Schemas are also (de)serializable, so they can be declared in JSON or TOML with the same
//! keys (`type`, `required`, `unique`, `index`, `hide`, `lowercase`, `default`, `expires`).

use bson::{Bson, DateTime, Document};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};
use std::{fmt, time::Duration};

use crate::{
    error::{StoreError, StoreResult},
    filter::FilterList,
    patch::Patch,
};

/// Value type a field is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    /// Accepts any value.
    Any,
}

impl FieldType {
    /// Returns `true` if the value is acceptable for this type. `Null` is always accepted;
    /// presence is checked separately through [`FieldSpec::required`].
    pub fn accepts(&self, value: &Bson) -> bool {
        match (self, value) {
            (_, Bson::Null) | (FieldType::Any, _) => true,
            (FieldType::String, Bson::String(_)) => true,
            (FieldType::Number, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => true,
            (FieldType::Boolean, Bson::Boolean(_)) => true,
            (FieldType::Date, Bson::DateTime(_) | Bson::Timestamp(_)) => true,
            (FieldType::Array, Bson::Array(_)) => true,
            (FieldType::Object, Bson::Document(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Value applied to a missing field when a document is prepared for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultValue {
    /// A literal value.
    Value(Bson),
    /// The current timestamp at preparation time.
    Now,
}

impl DefaultValue {
    pub fn resolve(&self) -> Bson {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Now => Bson::DateTime(DateTime::now()),
        }
    }
}

/// Descriptor of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// The field must be present and non-null after defaults are applied.
    #[serde(default)]
    pub required: bool,
    /// No two documents of the entity may share a value for this field.
    #[serde(default)]
    pub unique: bool,
    /// The store should keep an index on this field.
    #[serde(default)]
    pub index: bool,
    /// The field never appears in sanitized output.
    #[serde(default)]
    pub hide: bool,
    /// String values are lower-cased before they are stored.
    #[serde(default)]
    pub lowercase: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Seconds after the stored date at which the document expires.
    #[serde(default, rename = "expires", skip_serializing_if = "Option::is_none")]
    pub expires_after_secs: Option<u64>,
}

impl FieldSpec {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            required: false,
            unique: false,
            index: false,
            hide: false,
            lowercase: false,
            default: None,
            expires_after_secs: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn hide(mut self) -> Self {
        self.hide = true;
        self
    }

    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    pub fn expires_after(mut self, ttl: Duration) -> Self {
        self.expires_after_secs = Some(ttl.as_secs());
        self
    }

    /// Time to live of documents, counted from the date stored in this field.
    pub fn expiry(&self) -> Option<Duration> {
        self.expires_after_secs.map(Duration::from_secs)
    }

    /// Lower-cases the value if requested and checks it against the field type.
    fn normalize(&self, field: &str, value: &mut Bson) -> StoreResult<()> {
        if self.lowercase {
            if let Bson::String(text) = value {
                *text = text.to_lowercase();
            }
        }

        if !self.kind.accepts(value) {
            return Err(StoreError::Validation(format!(
                "field {field:?} expects a value of type {}, got {value}",
                self.kind,
            )));
        }

        Ok(())
    }
}

/// Ordered mapping of field names to descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field descriptor, returning the updated schema.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();

        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, existing)) => *existing = spec,
            None => self.fields.push((name, spec)),
        }

        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spec)| spec)
    }

    /// Iterates over `(name, spec)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of the fields declared `unique`.
    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields()
            .filter(|(_, spec)| spec.unique)
            .map(|(name, _)| name)
            .collect()
    }

    /// Fields that need a store index, paired with whether the index is unique.
    pub fn indexed_fields(&self) -> Vec<(&str, bool)> {
        self.fields()
            .filter(|(_, spec)| spec.index || spec.unique)
            .map(|(name, spec)| (name, spec.unique))
            .collect()
    }

    /// The first field carrying an expiry, with its time to live.
    pub fn expiring_field(&self) -> Option<(&str, Duration)> {
        self.fields()
            .find_map(|(name, spec)| spec.expiry().map(|ttl| (name, ttl)))
    }

    /// Returns a copy of this schema where `field` is hidden.
    ///
    /// A field the schema does not declare is added as a hidden field of any type.
    pub fn with_hidden(&self, field: &str) -> Schema {
        let spec = match self.get(field) {
            Some(spec) => spec.clone().hide(),
            None => FieldSpec::new(FieldType::Any).hide(),
        };

        self.clone().field(field, spec)
    }

    /// Prepares a document for insertion.
    ///
    /// Missing fields receive their default, `lowercase` strings are lower-cased, and every
    /// declared field is checked for presence and type. Fields the schema does not declare
    /// are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] when a required field is missing or a value has
    /// the wrong type.
    pub fn prepare(&self, mut document: Document) -> StoreResult<Document> {
        for (name, spec) in self.fields() {
            let missing = matches!(document.get(name), None | Some(Bson::Null));

            if missing {
                if let Some(default) = &spec.default {
                    document.insert(name, default.resolve());
                }
            }

            match document.get_mut(name) {
                Some(value) if !matches!(value, Bson::Null) => spec.normalize(name, value)?,
                _ if spec.required => {
                    return Err(StoreError::Validation(format!("field {name:?} is required")));
                }
                _ => {}
            }
        }

        Ok(document)
    }

    /// Checks a patch against the schema.
    ///
    /// `$set` values are lower-cased and type-checked like in [`Schema::prepare`]. Unsetting
    /// or nulling a required field and pushing onto a field that is not an array are
    /// rejected.
    pub fn validate_patch(&self, patch: &mut Patch) -> StoreResult<()> {
        for (name, value) in patch.set.iter_mut() {
            let Some(spec) = self.get(name) else {
                continue;
            };

            if spec.required && matches!(value, Bson::Null) {
                return Err(StoreError::Validation(format!("field {name:?} is required")));
            }
            spec.normalize(name, value)?;
        }

        for name in &patch.unset {
            if self.get(name).is_some_and(|spec| spec.required) {
                return Err(StoreError::Validation(format!("required field {name:?} cannot be unset")));
            }
        }

        for (name, _) in patch.push.iter() {
            if let Some(spec) = self.get(name) {
                if !matches!(spec.kind, FieldType::Array | FieldType::Any) {
                    return Err(StoreError::Validation(format!("cannot push onto {} field {name:?}", spec.kind)));
                }
            }
        }

        Ok(())
    }

    /// Prepares the document an upsert creates when nothing matches.
    ///
    /// The seed of [`Patch::upsert_seed`] goes through [`Schema::prepare`], so defaults are
    /// applied and required fields checked as for an insert. Fields the patch unsets stay
    /// absent.
    pub fn prepare_upsert(&self, filter: &FilterList, patch: &Patch) -> StoreResult<Document> {
        let mut document = self.prepare(patch.upsert_seed(filter))?;

        for field in &patch.unset {
            document.remove(field);
        }

        Ok(document)
    }

    /// Removes every hidden field from a document.
    pub fn sanitize(&self, mut document: Document) -> Document {
        for (name, spec) in self.fields() {
            if spec.hide {
                document.remove(name);
            }
        }

        document
    }

    pub fn sanitize_all(&self, documents: Vec<Document>) -> Vec<Document> {
        documents
            .into_iter()
            .map(|document| self.sanitize(document))
            .collect()
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, spec) in &self.fields {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

struct SchemaVisitor;

impl<'de> Visitor<'de> for SchemaVisitor {
    type Value = Schema;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of field names to field descriptors")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schema, A::Error> {
        let mut schema = Schema::new();

        while let Some((name, spec)) = access.next_entry::<String, FieldSpec>()? {
            schema = schema.field(name, spec);
        }

        Ok(schema)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SchemaVisitor)
    }
}
