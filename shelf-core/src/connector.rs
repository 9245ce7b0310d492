//! Connector abstraction for the database façade.
//!
//! A connector adapts one document store to the five operations the façade exposes. Each
//! call names the entity it works on and carries the entity's [`Schema`], which the
//! connector uses to register the entity the first time it sees it (see
//! [`ModelCache`](crate::model::ModelCache)).
//!
//! # Traits
//!
//! - [`Connector`]: The core trait for connectors
//! - [`DynConnector`]: A trait for dynamic dispatch over connector implementations
//! - [`ConnectorBuilder`]: Factory trait for creating connector instances
//!
//! # Examples
//!
//! ```ignore
//! use shelf_core::{connector::Connector, filter::FilterList, options::SelectOptions};
//! use bson::doc;
//!
//! let connector = MyConnector::new();
//!
//! connector.insert("users", doc! { "nick": "ann" }, &schema).await?;
//! let users = connector
//!     .select("users", &FilterList::all(), &schema, &SelectOptions::default())
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{any::Any, fmt::Debug};

use crate::{
    error::StoreResult,
    filter::FilterList,
    options::{SelectOptions, UpdateOptions},
    patch::Patch,
    schema::Schema,
};

/// Abstract interface for document store connectors.
///
/// # Thread Safety
///
/// Implementations are shared between concurrent tasks and must be `Send + Sync`. The
/// per-entity registration they perform lazily must happen once per entity, however many
/// tasks race on the first use.
///
/// # Error Handling
///
/// Native store failures are reported as [`StoreError::Store`](crate::error::StoreError::Store)
/// with the driver message, without any reinterpretation.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Stores one document and returns it as stored.
    async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document>;

    /// Returns the documents matching the filter, honoring ordering and windowing options.
    /// An empty vector means nothing matched.
    async fn select(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Counts the documents matching the filter.
    async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64>;

    /// Applies the patch to every matching document and returns them after the update.
    ///
    /// With [`UpdateOptions::upsert`] set and nothing matching, the document described by
    /// [`Schema::prepare_upsert`] is created and returned, even when the patch is empty.
    async fn update(
        &self,
        entity: &str,
        filter: &FilterList,
        patch: &Patch,
        schema: &Schema,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Deletes every matching document and returns the removed documents. Removing nothing
    /// is not an error.
    async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>>;

    /// Releases the connector's resources.
    ///
    /// The default implementation is a no-op; connectors holding a connection pool override
    /// it.
    async fn shutdown(self) -> StoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<C> Connector for &C
where
    C: Connector,
{
    async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document> {
        (*self).insert(entity, document, schema).await
    }

    async fn select(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Document>> {
        (*self)
            .select(entity, filter, schema, options)
            .await
    }

    async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64> {
        (*self).count(entity, filter, schema).await
    }

    async fn update(
        &self,
        entity: &str,
        filter: &FilterList,
        patch: &Patch,
        schema: &Schema,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>> {
        (*self)
            .update(entity, filter, patch, schema, options)
            .await
    }

    async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>> {
        (*self).remove(entity, filter, schema).await
    }
}

/// Object-safe counterpart of [`Connector`], implemented for every connector.
#[async_trait]
pub trait DynConnector: Send + Sync + Debug {
    async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document>;
    async fn select(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Document>>;
    async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64>;
    async fn update(
        &self,
        entity: &str,
        filter: &FilterList,
        patch: &Patch,
        schema: &Schema,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>>;
    async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>>;
    async fn shutdown_boxed(self: Box<Self>) -> StoreResult<()>;

    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[async_trait]
impl<C: Connector + 'static> DynConnector for C {
    async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document> {
        Connector::insert(self, entity, document, schema).await
    }

    async fn select(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Document>> {
        Connector::select(self, entity, filter, schema, options).await
    }

    async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64> {
        Connector::count(self, entity, filter, schema).await
    }

    async fn update(
        &self,
        entity: &str,
        filter: &FilterList,
        patch: &Patch,
        schema: &Schema,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>> {
        Connector::update(self, entity, filter, patch, schema, options).await
    }

    async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>> {
        Connector::remove(self, entity, filter, schema).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> StoreResult<()> {
        Connector::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[async_trait]
impl Connector for Box<dyn DynConnector> {
    async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document> {
        (**self).insert(entity, document, schema).await
    }

    async fn select(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Document>> {
        (**self)
            .select(entity, filter, schema, options)
            .await
    }

    async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64> {
        (**self).count(entity, filter, schema).await
    }

    async fn update(
        &self,
        entity: &str,
        filter: &FilterList,
        patch: &Patch,
        schema: &Schema,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>> {
        (**self)
            .update(entity, filter, patch, schema, options)
            .await
    }

    async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>> {
        (**self).remove(entity, filter, schema).await
    }

    async fn shutdown(self) -> StoreResult<()> {
        self.shutdown_boxed().await
    }
}

/// Factory for connectors that need asynchronous setup, such as opening a connection pool.
#[async_trait]
pub trait ConnectorBuilder {
    type Connector: Connector;

    async fn build(self) -> StoreResult<Self::Connector>;
}
