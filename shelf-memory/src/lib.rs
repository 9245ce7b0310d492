//! In-memory connector for shelf.
//!
//! This crate provides a thread-safe, in-memory implementation of the `Connector` trait.
//! It is the reference implementation of the filter semantics and is used for development
//! and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Full filter support** - Every operator, negation, OR-alternatives, sorting and windowing
//! - **Store-side constraints** - Unique fields and document expiry, as a document store's indexes would enforce them
//!
//! # Quick Start
//!
//! ```ignore
//! use shelf::{Database, memory::MemoryConnector};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(MemoryConnector::new());
//!     db.insert("users", doc! { "email": "ann@example.com" }, &users_schema).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as shelf_memory;

pub mod connector;
pub mod evaluator;

pub use connector::{MemoryConnector, MemoryConnectorBuilder};
