//! Update payloads.

use bson::{Bson, Document};

use crate::{
    error::{StoreError, StoreResult},
    filter::{FilterList, Operator},
};

/// Changes applied to every document matched by an `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    /// Fields overwritten with a new value.
    pub set: Document,
    /// Fields removed from the document.
    pub unset: Vec<String>,
    /// Values appended to array fields.
    pub push: Document,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    pub fn push(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.push.is_empty()
    }

    /// Renders the patch with update operators (`$set`, `$unset`, `$push`).
    pub fn to_document(&self) -> Document {
        let mut update = Document::new();

        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            let unset = self
                .unset
                .iter()
                .map(|field| (field.clone(), Bson::String(String::new())))
                .collect::<Document>();
            update.insert("$unset", unset);
        }
        if !self.push.is_empty() {
            update.insert("$push", self.push.clone());
        }

        update
    }

    /// The document an upsert creates when nothing matches: the unnegated equality
    /// conditions of a single-object filter, with the patch applied on top.
    pub fn upsert_seed(&self, filter: &FilterList) -> Document {
        let mut seed = Document::new();

        if let [object] = filter.objects() {
            for (field, conditions) in object.fields() {
                for condition in conditions {
                    if condition.op == Operator::Eq && !condition.negated {
                        seed.insert(field, condition.value.clone());
                    }
                }
            }
        }

        self.apply(&mut seed);
        seed
    }

    /// Applies the patch to a document in place.
    pub fn apply(&self, document: &mut Document) {
        for (field, value) in &self.set {
            document.insert(field.clone(), value.clone());
        }

        for field in &self.unset {
            document.remove(field);
        }

        for (field, value) in &self.push {
            match document.get_mut(field) {
                Some(Bson::Array(items)) => items.push(value.clone()),
                _ => {
                    document.insert(field.clone(), Bson::Array(vec![value.clone()]));
                }
            }
        }
    }
}

impl TryFrom<Document> for Patch {
    type Error = StoreError;

    /// Reads a patch from a document.
    ///
    /// A document whose keys are all update operators is parsed operator by operator; any
    /// other document is taken as a plain `$set`.
    fn try_from(document: Document) -> StoreResult<Self> {
        if !document.keys().any(|key| key.starts_with('$')) {
            return Ok(Self { set: document, ..Self::default() });
        }

        let mut patch = Patch::new();

        for (key, value) in document {
            match (key.as_str(), value) {
                ("$set", Bson::Document(set)) => patch.set = set,
                ("$push", Bson::Document(push)) => patch.push = push,
                ("$unset", Bson::Document(unset)) => patch.unset = unset.keys().cloned().collect(),
                ("$unset", Bson::Array(fields)) => {
                    patch.unset = fields
                        .into_iter()
                        .map(|field| match field {
                            Bson::String(field) => Ok(field),
                            other => Err(StoreError::InvalidQuery(format!("$unset expects field names, got {other}"))),
                        })
                        .collect::<StoreResult<_>>()?;
                }
                (key, value) => {
                    return Err(StoreError::InvalidQuery(format!("unsupported update entry {key}: {value}")));
                }
            }
        }

        Ok(patch)
    }
}

impl From<Patch> for Document {
    fn from(patch: Patch) -> Self {
        patch.to_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use crate::filter::{Condition, FilterObject};

    #[test]
    fn plain_document_is_a_set() {
        let patch = Patch::try_from(doc! { "nick": "ann" }).unwrap();

        assert_eq!(patch, Patch::new().set("nick", "ann"));
    }

    #[test]
    fn reads_update_operators() {
        let patch = Patch::try_from(doc! {
            "$set": { "nick": "ann" },
            "$unset": { "token": "" },
            "$push": { "collections": "books" },
        })
        .unwrap();

        assert_eq!(patch, Patch::new().set("nick", "ann").unset("token").push("collections", "books"));
        assert_eq!(patch.to_document(), doc! {
            "$set": { "nick": "ann" },
            "$unset": { "token": "" },
            "$push": { "collections": "books" },
        });
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(Patch::try_from(doc! { "$inc": { "n": 1 } }).is_err());
        assert!(Patch::try_from(doc! { "$set": { "a": 1 }, "b": 2 }).is_err());
    }

    #[test]
    fn applies_in_place() {
        let mut document = doc! { "nick": "ann", "token": "t", "collections": ["movies"] };

        Patch::new()
            .set("nick", "bob")
            .unset("token")
            .push("collections", "books")
            .push("tags", "new")
            .apply(&mut document);

        assert_eq!(document, doc! {
            "nick": "bob",
            "collections": ["movies", "books"],
            "tags": ["new"],
        });
    }

    #[test]
    fn upsert_seed_takes_equalities_of_a_single_object() {
        let filter = FilterList::from(
            FilterObject::new()
                .with("email", Condition::eq("ann@x.io"))
                .with("nick", Condition::eq("bot").not())
                .with("age", Condition::gte(18)),
        );
        let patch = Patch::new().set("nick", "ann");

        assert_eq!(patch.upsert_seed(&filter), doc! { "email": "ann@x.io", "nick": "ann" });

        let either = filter.or(FilterObject::new().with("email", Condition::eq("bob@x.io")));
        assert_eq!(patch.upsert_seed(&either), doc! { "nick": "ann" });
    }
}
