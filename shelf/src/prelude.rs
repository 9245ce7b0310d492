//! Convenient re-exports of commonly used types from shelf.
//!
//! ```ignore
//! use shelf::prelude::*;
//! ```
//!
//! [`DynConnector`](shelf_core::connector::DynConnector) is left out on purpose: with both
//! connector traits in scope, calls on a concrete connector would be ambiguous.

pub use shelf_core::{
    config::{DatabaseConfig, Engine},
    connector::{Connector, ConnectorBuilder},
    database::{Database, DynDatabase},
    entity::{Entity, TypedEntity},
    error::{ParseError, StoreError, StoreResult},
    filter::{Condition, FilterList, FilterObject, FilterVisitor, Operator},
    options::{SelectOptions, Sort, SortDirection, UpdateOptions},
    page::{Page, PaginationParams},
    patch::Patch,
    record::{Record, RecordExt},
    schema::{DefaultValue, FieldSpec, FieldType, Schema},
    search::SearchQuery,
};
