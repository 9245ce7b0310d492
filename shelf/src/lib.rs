//! Main shelf crate providing a schema-aware query layer over document stores.
//!
//! This crate is the primary entry point for the catalogue's business logic. It re-exports
//! the core types from the sub-crates, exposes the available connectors, and selects one
//! from configuration with [`connect`].
//!
//! # Features
//!
//! - **Free-text search** - A small query language turned into store filters
//! - **Schema-aware storage** - Defaults, validation, unique and expiring fields, hidden fields
//! - **Multiple connectors** - In-memory and MongoDB, behind one façade
//! - **Typed records** - Define entities with Serde and work with them directly
//!
//! # Quick Start
//!
//! ```ignore
//! use shelf::{prelude::*, memory::MemoryConnector};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Item {
//!     pub title: String,
//!     pub kind: String,
//! }
//!
//! impl Record for Item {
//!     fn entity_name() -> &'static str { "items" }
//!
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field("title", FieldSpec::new(FieldType::String).required().index())
//!             .field("kind", FieldSpec::new(FieldType::String).default_value("book"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let db = Database::new(MemoryConnector::new());
//!     let items = db.records::<Item>();
//!
//!     items.insert(&Item { title: "The Hobbit".into(), kind: "book".into() }).await?;
//!
//!     // Every item whose title contains "hobbit" or "tolkien", but not "film"
//!     let filter = SearchQuery::parse("hobbit,tolkien -film")?
//!         .to_filter(&["title"], &FilterObject::new());
//!     let found = items.select(&filter, &SelectOptions::default()).await?;
//!
//!     println!("Found {} items", found.len());
//!
//!     db.shutdown().await
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! When the connector is only known at runtime, [`connect`] returns a [`DynDatabase`]: the
//! same façade over a boxed connector.
//!
//! ```ignore
//! use shelf::{connect, config::DatabaseConfig};
//!
//! #[tokio::main]
//! async fn main() -> shelf::error::StoreResult<()> {
//!     let config = DatabaseConfig::from_file("shelf.toml")?.with_env_overrides()?;
//!     let db = shelf::connect(&config).await?;
//!
//!     // ...
//!
//!     db.shutdown().await
//! }
//! ```
//!
//! # Connectors
//!
//! - [`memory`] - In-memory connector for development and testing
//! - [`mongodb`] - MongoDB connector (requires `mongodb` feature)

pub mod prelude;

pub use shelf_core::{
    config, connector, database, entity, error, filter, model, options, page, patch, record, schema, search,
};
pub use shelf_core::database::{Database, DynDatabase};

// Re-export BSON types for convenience
pub use bson;

use shelf_core::{
    config::{DatabaseConfig, Engine},
    connector::ConnectorBuilder,
    error::StoreResult,
};
use tracing::debug;

/// In-memory connector implementations.
pub mod memory {
    pub use shelf_memory::{MemoryConnector, MemoryConnectorBuilder};
}

/// MongoDB connector implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use shelf_mongodb::{MongoConnector, MongoConnectorBuilder};
}

/// Builds the connector named by `config` and wraps it in a façade.
///
/// Selecting MongoDB without the `mongodb` feature is a
/// [`Configuration`](error::StoreError::Configuration) error.
pub async fn connect(config: &DatabaseConfig) -> StoreResult<DynDatabase> {
    debug!(engine = %config.engine, database = %config.database, "connecting database");

    match config.engine {
        Engine::Memory => {
            let connector = memory::MemoryConnector::builder()
                .build()
                .await?;

            Ok(Database::new(connector).into_dyn())
        }
        #[cfg(feature = "mongodb")]
        Engine::MongoDb => {
            let connector = mongodb::MongoConnectorBuilder::from_config(config)
                .build()
                .await?;

            Ok(Database::new(connector).into_dyn())
        }
        #[cfg(not(feature = "mongodb"))]
        Engine::MongoDb => Err(error::StoreError::Configuration(format!(
            "engine {} requires the `mongodb` feature",
            config.engine,
        ))),
    }
}
