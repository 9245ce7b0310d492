//! Options accepted by `select` and `update`.
//!
//! ```ignore
//! use shelf_core::options::{SelectOptions, Sort};
//!
//! let options = SelectOptions::builder()
//!     .order(Sort::parse("!last_connected"))
//!     .limit(20)
//!     .build();
//! ```

use serde::{Deserialize, Serialize};

/// Prefix that turns an order field into a descending sort (`"!since"`).
pub const DESCENDING_MARKER: char = '!';

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }

    /// Parses an order string where a leading `!` means descending.
    pub fn parse(order: &str) -> Self {
        match order.strip_prefix(DESCENDING_MARKER) {
            Some(field) => Self::desc(field),
            None => Self::asc(order),
        }
    }
}

/// Ordering and windowing of a `select`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOptions {
    /// Sort specification for results.
    pub order: Option<Sort>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub skip: Option<usize>,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SelectOptionsBuilder {
        SelectOptionsBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectOptionsBuilder {
    options: SelectOptions,
}

impl SelectOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sort specification.
    pub fn order(mut self, order: Sort) -> Self {
        self.options.order = Some(order);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    pub fn build(self) -> SelectOptions {
        self.options
    }
}

/// Options of an `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Insert a document built from the filter and the patch when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bang_prefix_sorts_descending() {
        assert_eq!(Sort::parse("!since"), Sort::desc("since"));
        assert_eq!(Sort::parse("nick"), Sort::asc("nick"));
    }

    #[test]
    fn builder_sets_window() {
        let options = SelectOptions::builder()
            .order(Sort::asc("nick"))
            .limit(5)
            .skip(10)
            .build();

        assert_eq!(options.limit, Some(5));
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.order, Some(Sort::asc("nick")));
    }
}
