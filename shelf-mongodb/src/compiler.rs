//! Filter compilation to MongoDB query documents.
//!
//! - an empty filter list matches everything (`{}`);
//! - one filter-object becomes one query document, and several become an `$or` in input
//!   order;
//! - the conditions on one field merge into a single operator document, unless two of them
//!   use the same operator, in which case each condition becomes its own clause of an
//!   `$and`;
//! - negation picks the complementary operator (`$ne`, the opposite range, `$exists`), and
//!   negated patterns become `$not` regular expressions.

use bson::{Bson, Document, doc};

use shelf_core::{
    error::StoreError,
    filter::{Condition, FilterList, FilterObject, FilterVisitor, Operator},
};

pub(crate) struct MongoFilterCompiler;

impl MongoFilterCompiler {
    pub fn compile(filter: &FilterList) -> Result<Document, StoreError> {
        MongoFilterCompiler.visit_list(filter)
    }

    /// The operator document of one condition, without the field name.
    fn operator(condition: &Condition) -> Result<Document, StoreError> {
        let value = &condition.value;

        match condition.op {
            Operator::Eq if condition.negated => Ok(doc! { "$ne": value }),
            Operator::Eq => Ok(doc! { "$eq": value }),
            Operator::Null => Ok(doc! { "$exists": condition.negated }),
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                let op = match condition.negated {
                    true => condition.op.inverse_ordering().unwrap_or(condition.op),
                    false => condition.op,
                };
                let key = match op {
                    Operator::Lt => "$lt",
                    Operator::Lte => "$lte",
                    Operator::Gt => "$gt",
                    _ => "$gte",
                };

                Ok(doc! { key: value })
            }
            Operator::Contains | Operator::Starts | Operator::Ends => {
                let Bson::String(text) = value else {
                    return Err(StoreError::InvalidQuery(format!(
                        "{} operator requires a string value, got {value}",
                        condition.op,
                    )));
                };

                let escaped = regex::escape(text);
                let pattern = match condition.op {
                    Operator::Starts => format!("^{escaped}"),
                    Operator::Ends => format!("{escaped}$"),
                    _ => escaped,
                };

                match condition.negated {
                    true => Ok(doc! { "$not": { "$regex": pattern } }),
                    false => Ok(doc! { "$regex": pattern }),
                }
            }
        }
    }
}

impl FilterVisitor for MongoFilterCompiler {
    type Output = Document;
    type Error = StoreError;

    fn visit_all(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(doc! {})
    }

    fn visit_or(&mut self, objects: &[FilterObject]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": objects
                .iter()
                .map(|object| self.visit_object(object))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_object(&mut self, object: &FilterObject) -> Result<Self::Output, Self::Error> {
        let mut query = Document::new();
        let mut clauses = Vec::new();

        for (field, conditions) in object.fields() {
            let operators = conditions
                .iter()
                .map(Self::operator)
                .collect::<Result<Vec<_>, _>>()?;

            let mut merged = Document::new();
            let collides = operators
                .iter()
                .flat_map(|operator| operator.iter())
                .any(|(key, value)| merged.insert(key.clone(), value.clone()).is_some());

            if collides {
                clauses.extend(
                    operators
                        .into_iter()
                        .map(|operator| doc! { field: operator }),
                );
            } else {
                query.insert(field, merged);
            }
        }

        if !clauses.is_empty() {
            query.insert("$and", clauses);
        }

        Ok(query)
    }

    fn visit_condition(&mut self, field: &str, condition: &Condition) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: Self::operator(condition)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(filter: FilterList) -> Document {
        MongoFilterCompiler::compile(&filter).unwrap()
    }

    fn on(field: &str, condition: Condition) -> FilterList {
        FilterList::from(FilterObject::new().with(field, condition))
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(compile(FilterList::all()), doc! {});
    }

    #[test]
    fn single_object_is_a_conjunction() {
        let filter = FilterList::from(
            FilterObject::new()
                .with("access_token", Condition::eq("abc"))
                .with("age", Condition::gte(18)),
        );

        assert_eq!(compile(filter), doc! {
            "access_token": { "$eq": "abc" },
            "age": { "$gte": 18 },
        });
    }

    #[test]
    fn several_objects_become_an_ordered_or() {
        let filter = FilterList::all()
            .or(FilterObject::new().with("nick", Condition::eq("ann")))
            .or(FilterObject::new().with("email", Condition::eq("ann@x.io")));

        let compiled = compile(filter);
        let branches = compiled.get_array("$or").unwrap();

        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0], Bson::Document(doc! { "nick": { "$eq": "ann" } }));
        assert_eq!(branches[1], Bson::Document(doc! { "email": { "$eq": "ann@x.io" } }));
    }

    #[test]
    fn negation_picks_the_complement() {
        assert_eq!(compile(on("n", Condition::eq(1).not())), doc! { "n": { "$ne": 1 } });
        assert_eq!(compile(on("n", Condition::lt(1).not())), doc! { "n": { "$gte": 1 } });
        assert_eq!(compile(on("n", Condition::lte(1).not())), doc! { "n": { "$gt": 1 } });
        assert_eq!(compile(on("n", Condition::gt(1).not())), doc! { "n": { "$lte": 1 } });
        assert_eq!(compile(on("n", Condition::gte(1).not())), doc! { "n": { "$lt": 1 } });
        assert_eq!(compile(on("n", Condition::null())), doc! { "n": { "$exists": false } });
        assert_eq!(compile(on("n", Condition::null().not())), doc! { "n": { "$exists": true } });
    }

    #[test]
    fn patterns_are_escaped_regular_expressions() {
        assert_eq!(compile(on("t", Condition::contains("a.b"))), doc! { "t": { "$regex": "a\\.b" } });
        assert_eq!(compile(on("t", Condition::starts("The"))), doc! { "t": { "$regex": "^The" } });
        assert_eq!(compile(on("t", Condition::ends("(1)"))), doc! { "t": { "$regex": "\\(1\\)$" } });
        assert_eq!(
            compile(on("t", Condition::contains("bot").not())),
            doc! { "t": { "$not": { "$regex": "bot" } } }
        );
        assert!(MongoFilterCompiler::compile(&on("t", Condition::contains(3))).is_err());
    }

    #[test]
    fn same_field_conditions_merge() {
        let filter = FilterList::from(
            FilterObject::new()
                .with("nick", Condition::contains("a"))
                .with("nick", Condition::contains("b").not()),
        );

        assert_eq!(compile(filter), doc! {
            "nick": { "$regex": "a", "$not": { "$regex": "b" } },
        });
    }

    #[test]
    fn colliding_operators_fall_back_to_and() {
        let filter = FilterList::from(
            FilterObject::new()
                .with("last_connected", Condition::gte(10))
                .with("nick", Condition::contains("harry"))
                .with("nick", Condition::contains("potter")),
        );

        assert_eq!(compile(filter), doc! {
            "last_connected": { "$gte": 10 },
            "$and": [
                { "nick": { "$regex": "harry" } },
                { "nick": { "$regex": "potter" } },
            ],
        });
    }
}
