//! A schema-aware query layer over document stores, built for personal-collection catalogues.
//!
//! This crate is the core of the shelf project and provides:
//!
//! - **Search queries** ([`search`]) - Parser for the free-text search mini-language
//! - **Filters** ([`filter`]) - OR-of-AND filter model shared by every connector
//! - **Schemas** ([`schema`]) - Per-entity field descriptors driving validation, indexes and sanitization
//! - **Connectors** ([`connector`]) - Traits for implementing document store connectors
//! - **Model cache** ([`model`]) - Lazy, once-per-entity registration inside a connector
//! - **Database façade** ([`database`]) - Main interface for business logic
//! - **Entity handles** ([`entity`]) - Handles bound to one entity, typed or untyped
//! - **Records** ([`record`]) - Traits for typed documents
//! - **Options, patches and pages** ([`options`], [`patch`], [`page`])
//! - **Configuration** ([`config`]) - Connector selection and connection settings
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use shelf_core::{record::Record, schema::{FieldSpec, FieldType, Schema}};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub email: String,
//!     pub nick: String,
//! }
//!
//! impl Record for User {
//!     fn entity_name() -> &'static str {
//!         "users"
//!     }
//!
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field("email", FieldSpec::new(FieldType::String).required().unique().lowercase())
//!             .field("nick", FieldSpec::new(FieldType::String))
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as shelf_core;

pub mod config;
pub mod connector;
pub mod database;
pub mod entity;
pub mod error;
pub mod filter;
pub mod model;
pub mod options;
pub mod page;
pub mod patch;
pub mod record;
pub mod schema;
pub mod search;
