//! Structured filter model shared by every connector.
//!
//! A [`FilterList`] is an ordered sequence of [`FilterObject`]s that are combined with a
//! logical OR. Each filter-object maps field names to an ordered list of [`Condition`]s
//! that are combined with a logical AND. A condition pairs an [`Operator`] with a value and
//! may be negated.
//!
//! Business logic usually builds filters in their JSON form:
//!
//! ```ignore
//! use shelf_core::filter::FilterList;
//! use serde_json::json;
//!
//! let filter = FilterList::from_json(&json!([
//!     { "access_token": ["=", "abc"] },
//!     { "nick": [["CONTAINS", "ann"], ["!CONTAINS", "bot"]] },
//! ]))?;
//! ```
//!
//! or with the builder API:
//!
//! ```ignore
//! use shelf_core::filter::{Condition, FilterList, FilterObject};
//!
//! let filter = FilterList::from(
//!     FilterObject::new()
//!         .with("nick", Condition::contains("ann"))
//!         .with("nick", Condition::contains("bot").not()),
//! );
//! ```
//!
//! Connectors walk the model through the [`FilterVisitor`] trait.

use bson::{Bson, ser::serialize_to_bson};
use serde_json::Value;
use std::{fmt, str::FromStr};

use crate::error::{StoreError, StoreResult};

/// Prefix that negates an operator token (`!CONTAINS`).
pub const NEGATION_MARKER: char = '!';

/// Comparison operators understood by every connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=` exact match.
    Eq,
    /// `<` strictly less than.
    Lt,
    /// `<=` less than or equal.
    Lte,
    /// `>` strictly greater than.
    Gt,
    /// `>=` greater than or equal.
    Gte,
    /// `CONTAINS` substring match.
    Contains,
    /// `STARTS` prefix match.
    Starts,
    /// `ENDS` suffix match.
    Ends,
    /// `NULL` field is absent.
    Null,
}

impl Operator {
    /// Returns the wire token of this operator.
    pub fn token(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Contains => "CONTAINS",
            Operator::Starts => "STARTS",
            Operator::Ends => "ENDS",
            Operator::Null => "NULL",
        }
    }

    /// Returns `true` for the operators that match string patterns.
    pub fn is_pattern(&self) -> bool {
        matches!(self, Operator::Contains | Operator::Starts | Operator::Ends)
    }

    /// For ordering operators, returns the operator that matches exactly the
    /// complementary range (`<` becomes `>=`, and so on).
    pub fn inverse_ordering(&self) -> Option<Operator> {
        match self {
            Operator::Lt => Some(Operator::Gte),
            Operator::Lte => Some(Operator::Gt),
            Operator::Gt => Some(Operator::Lte),
            Operator::Gte => Some(Operator::Lt),
            _ => None,
        }
    }
}

impl FromStr for Operator {
    type Err = StoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_uppercase().as_str() {
            "=" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "CONTAINS" => Ok(Operator::Contains),
            "STARTS" => Ok(Operator::Starts),
            "ENDS" => Ok(Operator::Ends),
            "NULL" => Ok(Operator::Null),
            other => Err(StoreError::InvalidQuery(format!("unknown operator {other:?}"))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A single `(operator, value)` test on a field, optionally negated.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The comparison operator.
    pub op: Operator,
    /// The value to compare against. Ignored by [`Operator::Null`].
    pub value: Bson,
    /// Whether the condition is inverted.
    pub negated: bool,
}

impl Condition {
    /// Creates a non-negated condition.
    pub fn new(op: Operator, value: impl Into<Bson>) -> Self {
        Self { op, value: value.into(), negated: false }
    }

    /// Parses an operator token such as `"<="` or `"!CONTAINS"` and pairs it with a value.
    pub fn parse(token: &str, value: impl Into<Bson>) -> StoreResult<Self> {
        let token = token.trim();
        let (negated, token) = match token.strip_prefix(NEGATION_MARKER) {
            Some(rest) => (true, rest),
            None => (false, token),
        };

        Ok(Self { op: token.parse()?, value: value.into(), negated })
    }

    /// Inverts this condition.
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Returns the wire token, including the negation marker when negated.
    pub fn token(&self) -> String {
        if self.negated {
            format!("{NEGATION_MARKER}{}", self.op.token())
        } else {
            self.op.token().to_string()
        }
    }

    pub fn eq(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Eq, value)
    }

    pub fn lt(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Lt, value)
    }

    pub fn lte(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Lte, value)
    }

    pub fn gt(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Gt, value)
    }

    pub fn gte(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Gte, value)
    }

    pub fn contains(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Contains, value)
    }

    pub fn starts(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Starts, value)
    }

    pub fn ends(value: impl Into<Bson>) -> Self {
        Self::new(Operator::Ends, value)
    }

    /// Matches documents where the field is absent.
    pub fn null() -> Self {
        Self::new(Operator::Null, Bson::Null)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Operator::Null => f.write_str(&self.token()),
            _ => write!(f, "{} {}", self.token(), self.value),
        }
    }
}

/// One AND-combination of field conditions.
///
/// Fields keep their insertion order, and so do the conditions attached to each field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterObject {
    fields: Vec<(String, Vec<Condition>)>,
}

impl FilterObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition to a field, returning the updated object.
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.push(field, condition);
        self
    }

    /// Adds a condition to a field. Conditions on the same field are AND-ed.
    pub fn push(&mut self, field: impl Into<String>, condition: Condition) {
        let field = field.into();

        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, conditions)) => conditions.push(condition),
            None => self.fields.push((field, vec![condition])),
        }
    }

    /// Returns the conditions attached to a field, if any.
    pub fn get(&self, field: &str) -> Option<&[Condition]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, conditions)| conditions.as_slice())
    }

    /// Iterates over `(field, conditions)` pairs in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Condition])> {
        self.fields
            .iter()
            .map(|(name, conditions)| (name.as_str(), conditions.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    fn from_json(value: &Value) -> StoreResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| StoreError::InvalidQuery(format!("filter-object must be a JSON object, got {value}")))?;
        let mut object = FilterObject::new();

        for (field, spec) in map {
            for condition in conditions_from_json(field, spec)? {
                object.push(field.clone(), condition);
            }
        }

        Ok(object)
    }
}

fn conditions_from_json(field: &str, spec: &Value) -> StoreResult<Vec<Condition>> {
    let invalid = || StoreError::InvalidQuery(format!("invalid conditions for field {field:?}: {spec}"));
    let items = spec.as_array().ok_or_else(invalid)?;

    match items.first() {
        Some(Value::Array(_)) => items
            .iter()
            .map(|pair| condition_from_json(field, pair))
            .collect(),
        Some(Value::String(_)) => Ok(vec![condition_from_json(field, spec)?]),
        _ => Err(invalid()),
    }
}

fn condition_from_json(field: &str, pair: &Value) -> StoreResult<Condition> {
    let invalid = || StoreError::InvalidQuery(format!("invalid condition for field {field:?}: {pair}"));

    match pair.as_array().map(Vec::as_slice) {
        Some([Value::String(token)]) => Condition::parse(token, Bson::Null),
        Some([Value::String(token), value]) => Condition::parse(token, serialize_to_bson(value)?),
        _ => Err(invalid()),
    }
}

impl fmt::Display for FilterObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for (field, conditions) in self.fields() {
            for condition in conditions {
                if !first {
                    f.write_str(" AND ")?;
                }
                write!(f, "{field} {condition}")?;
                first = false;
            }
        }

        Ok(())
    }
}

/// An ordered sequence of filter-objects combined with a logical OR.
///
/// An empty list matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterList {
    objects: Vec<FilterObject>,
}

impl FilterList {
    /// Creates a filter that matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an alternative, returning the updated list.
    pub fn or(mut self, object: FilterObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn push(&mut self, object: FilterObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[FilterObject] {
        &self.objects
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Parses the JSON form of a filter.
    ///
    /// Accepts either an array of filter-objects or a single filter-object. Each field maps to
    /// either one `[operator, value]` pair or an array of such pairs. `["NULL"]` may omit the
    /// value.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Array(objects) => objects
                .iter()
                .map(FilterObject::from_json)
                .collect(),
            Value::Object(_) => Ok(Self::from(FilterObject::from_json(value)?)),
            other => Err(StoreError::InvalidQuery(format!("filter must be an array or an object, got {other}"))),
        }
    }
}

impl From<FilterObject> for FilterList {
    fn from(object: FilterObject) -> Self {
        Self { objects: vec![object] }
    }
}

impl FromIterator<FilterObject> for FilterList {
    fn from_iter<I: IntoIterator<Item = FilterObject>>(iter: I) -> Self {
        Self { objects: iter.into_iter().collect() }
    }
}

impl fmt::Display for FilterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.objects.as_slice() {
            [] => f.write_str("ALL"),
            [object] => write!(f, "{object}"),
            objects => {
                for (index, object) in objects.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" OR ")?;
                    }
                    write!(f, "({object})")?;
                }
                Ok(())
            }
        }
    }
}

/// Walks a [`FilterList`] to produce a connector-specific representation.
///
/// The provided [`FilterVisitor::visit_list`] dispatches on the shape of the list: an empty
/// list is a match-all, a single object is visited directly, and several objects become a
/// logical OR.
pub trait FilterVisitor {
    type Output;
    type Error: Into<StoreError>;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, objects: &[FilterObject]) -> Result<Self::Output, Self::Error>;
    fn visit_object(&mut self, object: &FilterObject) -> Result<Self::Output, Self::Error>;
    fn visit_condition(
        &mut self,
        field: &str,
        condition: &Condition,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_list(&mut self, list: &FilterList) -> Result<Self::Output, Self::Error> {
        match list.objects() {
            [] => self.visit_all(),
            [object] => self.visit_object(object),
            objects => self.visit_or(objects),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_negated_operator_tokens() {
        let condition = Condition::parse("!contains", "bot").unwrap();

        assert_eq!(condition.op, Operator::Contains);
        assert!(condition.negated);
        assert_eq!(condition.token(), "!CONTAINS");
        assert!(Condition::parse("LIKE", "x").is_err());
    }

    #[test]
    fn builder_keeps_field_and_condition_order() {
        let object = FilterObject::new()
            .with("nick", Condition::contains("a"))
            .with("email", Condition::eq("a@b.c"))
            .with("nick", Condition::contains("b").not());

        let fields = object.fields().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(fields, vec!["nick", "email"]);
        assert_eq!(object.get("nick").unwrap().len(), 2);
        assert_eq!(object.to_string(), "nick CONTAINS \"a\" AND nick !CONTAINS \"b\" AND email = \"a@b.c\"");
    }

    #[test]
    fn reads_single_pairs_and_pair_lists_from_json() {
        let filter = FilterList::from_json(&json!([
            { "access_token": ["=", "abc"] },
            { "nick": [["CONTAINS", "a"], ["!CONTAINS", "b"]], "deleted": ["NULL"] },
        ]))
        .unwrap();

        assert_eq!(filter.len(), 2);
        assert_eq!(filter.objects()[0].get("access_token").unwrap(), &[Condition::eq("abc")]);
        assert_eq!(
            filter.objects()[1].get("nick").unwrap(),
            &[Condition::contains("a"), Condition::contains("b").not()],
        );
        assert_eq!(filter.objects()[1].get("deleted").unwrap(), &[Condition::null()]);
    }

    #[test]
    fn single_json_object_is_one_alternative() {
        let filter = FilterList::from_json(&json!({ "since": [">=", "2019-05-21"] })).unwrap();

        assert_eq!(filter.len(), 1);
        assert_eq!(filter.objects()[0].get("since").unwrap(), &[Condition::gte("2019-05-21")]);
    }

    #[test]
    fn rejects_malformed_json_conditions() {
        assert!(FilterList::from_json(&json!([{ "age": 3 }])).is_err());
        assert!(FilterList::from_json(&json!([{ "age": [] }])).is_err());
        assert!(FilterList::from_json(&json!([{ "age": ["=", 1, 2] }])).is_err());
        assert!(FilterList::from_json(&json!("age")).is_err());
    }

    #[test]
    fn inverse_ordering_is_the_complement() {
        assert_eq!(Operator::Lt.inverse_ordering(), Some(Operator::Gte));
        assert_eq!(Operator::Lte.inverse_ordering(), Some(Operator::Gt));
        assert_eq!(Operator::Gt.inverse_ordering(), Some(Operator::Lte));
        assert_eq!(Operator::Gte.inverse_ordering(), Some(Operator::Lt));
        assert_eq!(Operator::Contains.inverse_ordering(), None);
    }

    #[test]
    fn displays_alternatives() {
        let filter = FilterList::all()
            .or(FilterObject::new().with("a", Condition::eq(1i32)))
            .or(FilterObject::new().with("b", Condition::null().not()));

        assert_eq!(filter.to_string(), "(a = 1) OR (b !NULL)");
        assert_eq!(FilterList::all().to_string(), "ALL");
    }
}
