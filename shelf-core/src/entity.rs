//! Entity handles.
//!
//! An entity handle binds the façade to one entity name and its schema, so that callers do
//! not have to repeat them on every call. Two flavors exist:
//!
//! - [`Entity`] - Untyped handle working with BSON documents
//! - [`TypedEntity`] - Handle for a [`Record`] type, converting on the way in and out
//!
//! # Example
//!
//! ```ignore
//! use shelf_core::{filter::{Condition, FilterList, FilterObject}, record::Record};
//!
//! let users = db.records::<User>();
//! users.insert(user).await?;
//!
//! let filter = FilterList::from(FilterObject::new().with("email", Condition::eq("ann@example.com")));
//! let ann = users.first(&filter).await?;
//! ```

use bson::Document;
use std::marker::PhantomData;

use crate::{
    connector::Connector,
    database::Database,
    error::StoreResult,
    filter::FilterList,
    options::{SelectOptions, Sort, UpdateOptions},
    page::{Page, PaginationParams},
    patch::Patch,
    record::{Record, RecordExt},
    schema::Schema,
};

#[derive(Debug)]
pub struct Entity<'a, C: Connector> {
    name: String,
    schema: Schema,
    database: &'a Database<C>,
}

impl<'a, C: Connector> Entity<'a, C> {
    pub(crate) fn new(name: String, schema: Schema, database: &'a Database<C>) -> Self {
        Self { name, schema, database }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub async fn insert(&self, document: Document) -> StoreResult<Document> {
        self.database
            .insert(&self.name, document, &self.schema)
            .await
    }

    pub async fn insert_unique(&self, document: Document) -> StoreResult<Document> {
        self.database
            .insert_unique(&self.name, document, &self.schema)
            .await
    }

    pub async fn select(&self, filter: &FilterList, options: &SelectOptions) -> StoreResult<Vec<Document>> {
        self.database
            .select(&self.name, filter, &self.schema, options)
            .await
    }

    pub async fn first(&self, filter: &FilterList) -> StoreResult<Option<Document>> {
        self.database
            .select_one(&self.name, filter, &self.schema)
            .await
    }

    pub async fn count(&self, filter: &FilterList) -> StoreResult<u64> {
        self.database
            .count(&self.name, filter, &self.schema)
            .await
    }

    pub async fn update(
        &self,
        filter: &FilterList,
        patch: Patch,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>> {
        self.database
            .update(&self.name, filter, patch, &self.schema, options)
            .await
    }

    pub async fn remove(&self, filter: &FilterList) -> StoreResult<Vec<Document>> {
        self.database
            .remove(&self.name, filter, &self.schema)
            .await
    }

    pub async fn check_unique(&self, document: &Document) -> StoreResult<()> {
        self.database
            .check_unique(&self.name, document, &self.schema)
            .await
    }

    pub async fn select_page(
        &self,
        filter: &FilterList,
        order: Option<Sort>,
        params: &PaginationParams,
    ) -> StoreResult<Page<Document>> {
        self.database
            .select_page(&self.name, filter, &self.schema, order, params)
            .await
    }

    /// Removes the hidden fields of this entity from a document.
    pub fn sanitize(&self, document: Document) -> Document {
        self.schema.sanitize(document)
    }
}

/// Entity handle for a [`Record`] type.
#[derive(Debug)]
pub struct TypedEntity<'a, C: Connector, R: Record> {
    entity: Entity<'a, C>,
    _marker: PhantomData<R>,
}

impl<'a, C: Connector, R: Record> TypedEntity<'a, C, R> {
    pub(crate) fn new(entity: Entity<'a, C>) -> Self {
        Self { entity, _marker: PhantomData }
    }

    pub fn name(&self) -> &str {
        self.entity.name()
    }

    /// The untyped handle of the same entity.
    pub fn untyped(&self) -> &Entity<'a, C> {
        &self.entity
    }

    pub async fn insert(&self, record: &R) -> StoreResult<R> {
        R::from_document(self.entity.insert(record.to_document()?).await?)
    }

    pub async fn insert_unique(&self, record: &R) -> StoreResult<R> {
        R::from_document(self.entity.insert_unique(record.to_document()?).await?)
    }

    pub async fn select(&self, filter: &FilterList, options: &SelectOptions) -> StoreResult<Vec<R>> {
        self.entity
            .select(filter, options)
            .await?
            .into_iter()
            .map(R::from_document)
            .collect()
    }

    pub async fn first(&self, filter: &FilterList) -> StoreResult<Option<R>> {
        self.entity
            .first(filter)
            .await?
            .map(R::from_document)
            .transpose()
    }

    pub async fn count(&self, filter: &FilterList) -> StoreResult<u64> {
        self.entity.count(filter).await
    }

    pub async fn update(&self, filter: &FilterList, patch: Patch, options: &UpdateOptions) -> StoreResult<Vec<R>> {
        self.entity
            .update(filter, patch, options)
            .await?
            .into_iter()
            .map(R::from_document)
            .collect()
    }

    pub async fn remove(&self, filter: &FilterList) -> StoreResult<Vec<R>> {
        self.entity
            .remove(filter)
            .await?
            .into_iter()
            .map(R::from_document)
            .collect()
    }

    pub async fn select_page(
        &self,
        filter: &FilterList,
        order: Option<Sort>,
        params: &PaginationParams,
    ) -> StoreResult<Page<R>> {
        let page = self.entity.select_page(filter, order, params).await?;
        let items = page
            .items
            .into_iter()
            .map(R::from_document)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(params.page_of(items, page.count))
    }
}
