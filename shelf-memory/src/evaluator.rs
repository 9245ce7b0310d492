//! Filter evaluation for in-memory documents.
//!
//! The evaluator follows the semantics of the MongoDB connector, so that both connectors
//! agree on every filter:
//!
//! - a missing field only equals `null`, never satisfies an ordering comparison, and never
//!   matches a pattern;
//! - negated `=` and negated patterns therefore match documents missing the field, while a
//!   negated ordering comparison is its complementary range and still needs the field;
//! - an array field matches when any of its elements matches.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, DateTime, Document};

use shelf_core::{
    error::StoreError,
    filter::{Condition, FilterList, FilterObject, FilterVisitor, Operator},
};

#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    Timestamp(u32, u32),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values with no natural order (object ids, binaries...), equal only to themselves.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::Decimal128(value) => match value.to_string().parse::<f64>() {
                Ok(number) => Comparable::Number(number),
                Err(_) => Comparable::Other(bson),
            },
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::Timestamp(value) => Comparable::Timestamp(value.time, value.increment),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Timestamp(a, i), Comparable::Timestamp(b, j)) => (a, i) == (b, j),
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::Timestamp(a, i), Comparable::Timestamp(b, j)) => (a, i).partial_cmp(&(b, j)),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a possibly dotted field path inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Orders two field values for sorting. Missing and null values come first, and values of
/// types that do not compare are considered equal.
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.filter(|value| !matches!(value, Bson::Null));
    let right = right.filter(|value| !matches!(value, Bson::Null));

    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => Comparable::from(left)
            .partial_cmp(&Comparable::from(right))
            .unwrap_or(Ordering::Equal),
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn matches(&mut self, filter: &FilterList) -> Result<bool, StoreError> {
        self.visit_list(filter)
    }

    /// Tests a field value, or each element of an array value, against a predicate.
    fn any_value(value: &Bson, predicate: impl Fn(&Bson) -> bool) -> bool {
        match value {
            Bson::Array(items) => predicate(value) || items.iter().any(&predicate),
            _ => predicate(value),
        }
    }

    fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
        match value {
            None => matches!(expected, Bson::Null),
            Some(value) => Self::any_value(value, |candidate| {
                Comparable::from(candidate) == Comparable::from(expected)
            }),
        }
    }

    fn ordered(value: Option<&Bson>, op: Operator, expected: &Bson) -> bool {
        let Some(value) = value else {
            return false;
        };

        Self::any_value(value, |candidate| {
            match Comparable::from(candidate).partial_cmp(&Comparable::from(expected)) {
                Some(ordering) => match op {
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Lte => ordering != Ordering::Greater,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Gte => ordering != Ordering::Less,
                    _ => false,
                },
                None => false,
            }
        })
    }

    fn pattern(value: Option<&Bson>, op: Operator, expected: &Bson) -> bool {
        let (Some(value), Bson::String(needle)) = (value, expected) else {
            return false;
        };

        Self::any_value(value, |candidate| match candidate {
            Bson::String(text) => match op {
                Operator::Contains => text.contains(needle.as_str()),
                Operator::Starts => text.starts_with(needle.as_str()),
                Operator::Ends => text.ends_with(needle.as_str()),
                _ => false,
            },
            _ => false,
        })
    }
}

impl<'a> FilterVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = StoreError;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(true)
    }

    fn visit_or(&mut self, objects: &[FilterObject]) -> Result<Self::Output, Self::Error> {
        for object in objects {
            if self.visit_object(object)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_object(&mut self, object: &FilterObject) -> Result<Self::Output, Self::Error> {
        for (field, conditions) in object.fields() {
            for condition in conditions {
                if !self.visit_condition(field, condition)? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    fn visit_condition(&mut self, field: &str, condition: &Condition) -> Result<Self::Output, Self::Error> {
        let value = lookup(self.document, field);
        let expected = &condition.value;

        let matched = match (condition.op, condition.negated) {
            (Operator::Eq, negated) => Self::equals(value, expected) != negated,
            (Operator::Null, negated) => value.is_none() != negated,
            (op, true) if op.is_pattern() => !Self::pattern(value, op, expected),
            (op, false) if op.is_pattern() => Self::pattern(value, op, expected),
            (op, negated) => {
                let op = if negated { op.inverse_ordering().unwrap_or(op) } else { op };
                Self::ordered(value, op, expected)
            }
        };

        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Timestamp, doc, oid::ObjectId};

    fn matches(document: &Document, filter: FilterList) -> bool {
        DocumentEvaluator::new(document).matches(&filter).unwrap()
    }

    fn on(field: &str, condition: Condition) -> FilterList {
        FilterList::from(FilterObject::new().with(field, condition))
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc! {}, FilterList::all()));
    }

    #[test]
    fn equality_and_ordering() {
        let user = doc! { "nick": "ann", "age": 31, "tags": ["a", "b"] };

        assert!(matches(&user, on("nick", Condition::eq("ann"))));
        assert!(matches(&user, on("tags", Condition::eq("b"))));
        assert!(matches(&user, on("age", Condition::gte(31i64))));
        assert!(!matches(&user, on("age", Condition::lt(31))));
        assert!(matches(&user, on("age", Condition::lt(31).not())));
        assert!(!matches(&user, on("nick", Condition::gt(3))));
    }

    #[test]
    fn missing_fields_follow_store_semantics() {
        let user = doc! { "nick": "ann" };

        assert!(matches(&user, on("email", Condition::eq("x").not())));
        assert!(matches(&user, on("email", Condition::contains("x").not())));
        assert!(!matches(&user, on("age", Condition::lt(3).not())));
        assert!(matches(&user, on("email", Condition::null())));
        assert!(!matches(&user, on("nick", Condition::null())));
        assert!(matches(&user, on("nick", Condition::null().not())));
    }

    #[test]
    fn patterns_are_case_sensitive_substrings() {
        let item = doc! { "title": "The Hobbit" };

        assert!(matches(&item, on("title", Condition::contains("Hob"))));
        assert!(!matches(&item, on("title", Condition::contains("hob"))));
        assert!(matches(&item, on("title", Condition::starts("The"))));
        assert!(matches(&item, on("title", Condition::ends("bit"))));
        assert!(matches(&item, on("title", Condition::contains("Ring").not())));
    }

    #[test]
    fn objects_are_and_and_lists_are_or() {
        let user = doc! { "nick": "annabot", "email": "a@b.c" };
        let both = FilterObject::new()
            .with("nick", Condition::contains("ann"))
            .with("nick", Condition::contains("bot").not());

        assert!(!matches(&user, FilterList::from(both.clone())));
        assert!(matches(&user, FilterList::from(both).or(FilterObject::new().with("email", Condition::eq("a@b.c")))));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let item = doc! { "meta": { "lang": "es" } };

        assert!(matches(&item, on("meta.lang", Condition::eq("es"))));
        assert!(matches(&item, on("meta.year", Condition::null())));
    }

    #[test]
    fn object_ids_equal_only_themselves() {
        let owner = ObjectId::new();
        let item = doc! { "owner": owner };

        assert!(matches(&item, on("owner", Condition::eq(owner))));
        assert!(!matches(&item, on("owner", Condition::eq(ObjectId::new()))));
        assert!(!matches(&item, on("owner", Condition::eq(Bson::Null))));
        assert!(!matches(&item, on("owner", Condition::gt(ObjectId::new()))));
    }

    #[test]
    fn decimals_and_timestamps_compare() {
        let item = doc! {
            "price": Bson::Decimal128("2.5".parse().unwrap()),
            "seen": Timestamp { time: 2, increment: 0 },
        };

        assert!(matches(&item, on("price", Condition::gt(2))));
        assert!(!matches(&item, on("price", Condition::gte(3.0))));
        assert!(matches(&item, on("seen", Condition::gt(Timestamp { time: 1, increment: 5 }))));
        assert!(matches(&item, on("seen", Condition::eq(Timestamp { time: 2, increment: 0 }))));
    }

    #[test]
    fn sort_order_puts_missing_first() {
        let one = Bson::Int32(1);
        let two = Bson::Int32(2);

        assert_eq!(compare_values(None, Some(&one)), Ordering::Less);
        assert_eq!(compare_values(Some(&two), Some(&one)), Ordering::Greater);
        assert_eq!(compare_values(Some(&Bson::Null), None), Ordering::Equal);
    }
}
