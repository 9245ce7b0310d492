//! Database façade over a connector.
//!
//! [`Database`] is the interface business logic talks to. It runs the schema checks that do
//! not need the store (defaults, lower-casing, types, required fields), then delegates to
//! its [`Connector`]. Errors from the connector are passed through untouched; the façade
//! never caches, batches or retries.
//!
//! - [`Database`] - Façade over a statically known connector
//! - [`DynDatabase`] - Façade over a connector chosen at runtime
//!
//! # Example
//!
//! ```ignore
//! use shelf_core::{database::Database, filter::FilterList, options::SelectOptions};
//!
//! let db = Database::new(connector);
//! db.insert("users", doc! { "email": "ann@example.com" }, &users).await?;
//!
//! let found = db.select("users", &filter, &users, &SelectOptions::default()).await?;
//! ```

use bson::{Bson, Document};
use tracing::instrument;

use crate::{
    connector::{Connector, DynConnector},
    entity::{Entity, TypedEntity},
    error::{StoreError, StoreResult},
    filter::{Condition, FilterList, FilterObject},
    options::{SelectOptions, Sort, UpdateOptions},
    page::{Page, PaginationParams},
    patch::Patch,
    record::Record,
    schema::Schema,
};

#[derive(Debug)]
pub struct Database<C: Connector> {
    connector: C,
}

/// Façade over a dynamically dispatched connector.
pub type DynDatabase = Database<Box<dyn DynConnector>>;

impl<C: Connector> Database<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns a handle bound to one entity and its schema.
    pub fn entity<'a>(&'a self, name: &str, schema: Schema) -> Entity<'a, C> {
        Entity::new(name.to_string(), schema, self)
    }

    /// Returns a typed handle for the entity of a [`Record`] type.
    pub fn records<'a, R: Record>(&'a self) -> TypedEntity<'a, C, R> {
        TypedEntity::new(self.entity(R::entity_name(), R::schema()))
    }

    /// Prepares a document against its schema and stores it.
    ///
    /// Uniqueness is left to the store; see [`Database::check_unique`] for a pre-check.
    #[instrument(level = "debug", skip(self, document, schema))]
    pub async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document> {
        let document = schema.prepare(document)?;

        self.connector
            .insert(entity, document, schema)
            .await
    }

    /// Checks the unique fields, then inserts.
    pub async fn insert_unique(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document> {
        let document = schema.prepare(document)?;
        self.check_unique(entity, &document, schema).await?;

        self.connector
            .insert(entity, document, schema)
            .await
    }

    #[instrument(level = "debug", skip(self, filter, schema, options), fields(filter = %filter))]
    pub async fn select(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Document>> {
        self.connector
            .select(entity, filter, schema, options)
            .await
    }

    /// Returns the first matching document, if any.
    pub async fn select_one(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
    ) -> StoreResult<Option<Document>> {
        let options = SelectOptions::builder().limit(1).build();

        Ok(self
            .select(entity, filter, schema, &options)
            .await?
            .into_iter()
            .next())
    }

    #[instrument(level = "debug", skip(self, filter, schema), fields(filter = %filter))]
    pub async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64> {
        self.connector
            .count(entity, filter, schema)
            .await
    }

    /// Validates the patch and applies it to every matching document.
    ///
    /// Returns the matching documents as they are after the update.
    #[instrument(level = "debug", skip(self, filter, patch, schema), fields(filter = %filter))]
    pub async fn update(
        &self,
        entity: &str,
        filter: &FilterList,
        mut patch: Patch,
        schema: &Schema,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>> {
        schema.validate_patch(&mut patch)?;

        self.connector
            .update(entity, filter, &patch, schema, options)
            .await
    }

    /// Deletes every matching document and returns what was removed.
    ///
    /// Nothing matching yields an empty vector, not an error.
    #[instrument(level = "debug", skip(self, filter, schema), fields(filter = %filter))]
    pub async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>> {
        self.connector
            .remove(entity, filter, schema)
            .await
    }

    /// Fails with [`StoreError::Conflict`] if a stored document shares the value of one of
    /// the unique fields of `document`.
    ///
    /// The check and a following insert are not atomic; the store's own unique indexes
    /// remain the final word.
    pub async fn check_unique(&self, entity: &str, document: &Document, schema: &Schema) -> StoreResult<()> {
        let unique = schema
            .unique_fields()
            .into_iter()
            .filter_map(|field| match document.get(field) {
                None | Some(Bson::Null) => None,
                Some(value) => Some((field, value.clone())),
            })
            .collect::<Vec<_>>();

        let filter = unique
            .iter()
            .map(|(field, value)| FilterObject::new().with(*field, Condition::eq(value.clone())))
            .collect::<FilterList>();

        if filter.is_empty() {
            return Ok(());
        }

        let Some(existing) = self.select_one(entity, &filter, schema).await? else {
            return Ok(());
        };

        let field = unique
            .iter()
            .find(|(field, value)| existing.get(field) == Some(value))
            .map_or(unique[0].0, |(field, _)| *field);

        Err(StoreError::Conflict(entity.to_string(), field.to_string()))
    }

    /// Selects one page of matching documents along with the total count.
    pub async fn select_page(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        order: Option<Sort>,
        params: &PaginationParams,
    ) -> StoreResult<Page<Document>> {
        let count = self.count(entity, filter, schema).await?;
        let items = self
            .select(entity, filter, schema, &params.to_select_options(order))
            .await?;

        Ok(params.page_of(items, count))
    }

    pub async fn shutdown(self) -> StoreResult<()> {
        self.connector.shutdown().await?;

        Ok(())
    }
}

impl<C: Connector + 'static> Database<C> {
    /// Erases the connector type.
    pub fn into_dyn(self) -> DynDatabase {
        Database::new(Box::new(self.connector) as Box<dyn DynConnector>)
    }
}

impl DynDatabase {
    /// Returns the connector if it is of type `C`.
    pub fn downcast_ref<C: Connector + 'static>(&self) -> Option<&C> {
        (*self.connector).as_any().downcast_ref::<C>()
    }

    /// Recovers the statically typed façade if the connector is of type `C`.
    pub fn into_static<C: Connector + 'static>(self) -> Option<Database<C>> {
        self.connector
            .into_any()
            .downcast::<C>()
            .ok()
            .map(|connector| Database::new(*connector))
    }
}
