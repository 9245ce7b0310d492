//! MongoDB connector for shelf.
//!
//! This crate provides a MongoDB-based implementation of the `Connector` trait. Filters are
//! compiled to native query documents, and entity schemas become indexes the first time an
//! entity is used.
//!
//! To use this connector, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! shelf = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - Filters, sorting and windowing run in MongoDB's query engine
//! - **Schema indexes** - Unique, indexed and expiring fields become MongoDB indexes
//!
//! # Example
//!
//! ```ignore
//! use shelf::{connector::ConnectorBuilder, mongodb::MongoConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = MongoConnector::builder("mongodb://localhost:27017", "catalogue")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as shelf_mongodb;

mod compiler;
pub mod connector;

pub use connector::{MongoConnector, MongoConnectorBuilder};
