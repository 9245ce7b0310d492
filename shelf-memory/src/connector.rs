//! In-memory connector.
//!
//! Documents are kept per entity, in insertion order, under an async-aware read-write lock.
//! The first use of an entity registers a model derived from its schema, holding what a
//! document store would keep in its indexes: the unique fields and the expiring field.

use std::{cmp::Ordering, collections::HashMap, sync::Arc, time::Duration};
use async_trait::async_trait;
use bson::{Bson, Document};
use chrono::{TimeDelta, Utc};
use mea::rwlock::RwLock;
use tracing::trace;

use shelf_core::{
    connector::{Connector, ConnectorBuilder},
    error::{StoreError, StoreResult},
    filter::FilterList,
    model::ModelCache,
    options::{SelectOptions, SortDirection, UpdateOptions},
    patch::Patch,
    schema::Schema,
};

use crate::evaluator::{DocumentEvaluator, compare_values, lookup};

type Table = Vec<Document>;
type TableMap = HashMap<String, Table>;

/// Store-side constraints of one entity.
#[derive(Debug)]
pub(crate) struct MemoryModel {
    unique: Vec<String>,
    expiry: Option<(String, Duration)>,
}

impl MemoryModel {
    fn from_schema(schema: &Schema) -> Self {
        Self {
            unique: schema
                .unique_fields()
                .into_iter()
                .map(str::to_string)
                .collect(),
            expiry: schema
                .expiring_field()
                .map(|(field, ttl)| (field.to_string(), ttl)),
        }
    }

    /// Returns `false` once the expiring field of the document is older than its time to
    /// live. Documents without a date in that field never expire.
    fn is_live(&self, document: &Document) -> bool {
        let Some((field, ttl)) = &self.expiry else {
            return true;
        };
        let Some(Bson::DateTime(stored)) = document.get(field) else {
            return true;
        };
        let Some(cutoff) = TimeDelta::from_std(*ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return true;
        };

        stored.to_chrono() > cutoff
    }

    fn purge_expired(&self, table: &mut Table) {
        if self.expiry.is_some() {
            table.retain(|document| self.is_live(document));
        }
    }

    /// Fails like a unique index would if `document` shares a unique value with any other
    /// document of the table. `skip` is the position of `document` itself, if stored.
    fn check_unique(&self, entity: &str, table: &Table, document: &Document, skip: Option<usize>) -> StoreResult<()> {
        for field in &self.unique {
            let value = match document.get(field) {
                None | Some(Bson::Null) => continue,
                Some(value) => value,
            };

            let duplicate = table
                .iter()
                .enumerate()
                .any(|(position, other)| Some(position) != skip && other.get(field) == Some(value));

            if duplicate {
                return Err(StoreError::Store(format!(
                    "duplicate key error in {entity}: unique field {field} already holds {value}"
                )));
            }
        }

        Ok(())
    }
}

/// Thread-safe in-memory connector.
///
/// `MemoryConnector` is cloneable; clones share the same documents and models.
#[derive(Default, Clone, Debug)]
pub struct MemoryConnector {
    tables: Arc<RwLock<TableMap>>,
    models: Arc<ModelCache<MemoryModel>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(TableMap::new())),
            models: Arc::new(ModelCache::new()),
        }
    }

    pub fn builder() -> MemoryConnectorBuilder {
        MemoryConnectorBuilder
    }

    /// Number of entities registered so far.
    pub async fn registered_entities(&self) -> usize {
        self.models.len().await
    }

    async fn model(&self, entity: &str, schema: &Schema) -> StoreResult<Arc<MemoryModel>> {
        self.models
            .get_or_register(entity, || async { Ok(MemoryModel::from_schema(schema)) })
            .await
    }

    /// Positions of the live documents matching the filter, in table order.
    fn matching(table: &Table, model: &MemoryModel, filter: &FilterList) -> StoreResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, document) in table.iter().enumerate() {
            if model.is_live(document) && DocumentEvaluator::new(document).matches(filter)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document> {
        let model = self.model(entity, schema).await?;
        let mut tables = self.tables.write().await;
        let table = tables
            .entry(entity.to_string())
            .or_default();

        model.purge_expired(table);
        model.check_unique(entity, table, &document, None)?;

        trace!(entity, "inserting document");
        table.push(document.clone());

        Ok(document)
    }

    async fn select(
        &self,
        entity: &str,
        filter: &FilterList,
        schema: &Schema,
        options: &SelectOptions,
    ) -> StoreResult<Vec<Document>> {
        let model = self.model(entity, schema).await?;
        let tables = self.tables.read().await;
        let table = match tables.get(entity) {
            Some(table) => table,
            None => return Ok(vec![]),
        };

        let mut documents = Self::matching(table, &model, filter)?
            .into_iter()
            .map(|position| &table[position])
            .collect::<Vec<_>>();

        if let Some(sort) = &options.order {
            documents.sort_by(|a, b| {
                let ordering: Ordering = compare_values(lookup(a, &sort.field), lookup(b, &sort.field));

                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        trace!(entity, %filter, matched = documents.len(), "selected documents");

        Ok(documents
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64> {
        let model = self.model(entity, schema).await?;
        let tables = self.tables.read().await;

        match tables.get(entity) {
            Some(table) => Ok(Self::matching(table, &model, filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn update(
        &self,
        entity: &str,
        filter: &FilterList,
        patch: &Patch,
        schema: &Schema,
        options: &UpdateOptions,
    ) -> StoreResult<Vec<Document>> {
        let model = self.model(entity, schema).await?;
        let mut tables = self.tables.write().await;
        let table = tables
            .entry(entity.to_string())
            .or_default();

        model.purge_expired(table);
        let positions = Self::matching(table, &model, filter)?;

        if positions.is_empty() {
            if !options.upsert {
                return Ok(vec![]);
            }

            let seed = schema.prepare_upsert(filter, patch)?;
            model.check_unique(entity, table, &seed, None)?;
            trace!(entity, %filter, "upserting document");
            table.push(seed.clone());

            return Ok(vec![seed]);
        }

        let mut updated = Vec::with_capacity(positions.len());

        for position in positions {
            let mut document = table[position].clone();
            patch.apply(&mut document);
            model.check_unique(entity, table, &document, Some(position))?;

            table[position] = document.clone();
            updated.push(document);
        }

        trace!(entity, %filter, updated = updated.len(), "updated documents");

        Ok(updated)
    }

    async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>> {
        let model = self.model(entity, schema).await?;
        let mut tables = self.tables.write().await;
        let table = match tables.get_mut(entity) {
            Some(table) => table,
            None => return Ok(vec![]),
        };

        model.purge_expired(table);

        let mut flags = Vec::with_capacity(table.len());
        for document in table.iter() {
            flags.push(DocumentEvaluator::new(document).matches(filter)?);
        }

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(table)
            .into_iter()
            .zip(flags)
            .partition(|(_, matched)| *matched);

        *table = kept
            .into_iter()
            .map(|(document, _)| document)
            .collect();

        trace!(entity, %filter, removed = removed.len(), "removed documents");

        Ok(removed
            .into_iter()
            .map(|(document, _)| document)
            .collect())
    }
}

/// Builder for constructing [`MemoryConnector`] instances.
#[derive(Debug, Default)]
pub struct MemoryConnectorBuilder;

#[async_trait]
impl ConnectorBuilder for MemoryConnectorBuilder {
    type Connector = MemoryConnector;

    async fn build(self) -> StoreResult<Self::Connector> {
        Ok(MemoryConnector::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{DateTime, doc};
    use shelf_core::{
        filter::{Condition, FilterObject},
        options::Sort,
        schema::{FieldSpec, FieldType},
    };

    fn users() -> Schema {
        Schema::new()
            .field("email", FieldSpec::new(FieldType::String).required().unique())
            .field("nick", FieldSpec::new(FieldType::String))
    }

    fn by(field: &str, condition: Condition) -> FilterList {
        FilterList::from(FilterObject::new().with(field, condition))
    }

    async fn seeded() -> MemoryConnector {
        let connector = MemoryConnector::new();

        for (email, nick, age) in [("a@x.io", "ann", 31), ("b@x.io", "bob", 25), ("c@x.io", "cid", 40)] {
            connector
                .insert("users", doc! { "email": email, "nick": nick, "age": age }, &users())
                .await
                .unwrap();
        }

        connector
    }

    #[tokio::test]
    async fn select_filters_sorts_and_windows() {
        let connector = seeded().await;
        let options = SelectOptions::builder()
            .order(Sort::parse("!age"))
            .skip(1)
            .limit(1)
            .build();

        let found = connector
            .select("users", &FilterList::all(), &users(), &options)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("nick").unwrap(), "ann");

        let none = connector
            .select("users", &by("nick", Condition::eq("zed")), &users(), &SelectOptions::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn unique_fields_are_enforced_by_the_store() {
        let connector = seeded().await;

        let duplicate = connector
            .insert("users", doc! { "email": "a@x.io" }, &users())
            .await;

        assert!(matches!(duplicate, Err(StoreError::Store(_))));
        assert_eq!(connector.count("users", &FilterList::all(), &users()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn update_returns_documents_after_the_patch() {
        let connector = seeded().await;

        let updated = connector
            .update(
                "users",
                &by("age", Condition::gte(31)),
                &Patch::new().set("vip", true),
                &users(),
                &UpdateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|user| user.get_bool("vip").unwrap()));
        assert_eq!(connector.count("users", &by("vip", Condition::eq(true)), &users()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upsert_seeds_from_equality_conditions() {
        let connector = MemoryConnector::new();

        let upserted = connector
            .update(
                "users",
                &by("email", Condition::eq("new@x.io")),
                &Patch::new().set("nick", "new"),
                &users(),
                &UpdateOptions::upsert(),
            )
            .await
            .unwrap();

        assert_eq!(upserted, vec![doc! { "email": "new@x.io", "nick": "new" }]);

        let untouched = connector
            .update("users", &by("email", Condition::eq("nobody")), &Patch::new().set("nick", "x"), &users(), &UpdateOptions::default())
            .await
            .unwrap();
        assert!(untouched.is_empty());
    }

    #[tokio::test]
    async fn upserted_documents_are_prepared() {
        let connector = MemoryConnector::new();
        let schema = users().field("rank", FieldSpec::new(FieldType::Number).default_value(0));

        let missing = connector
            .update("users", &by("nick", Condition::eq("ghost")), &Patch::new().set("nick", "ghost"), &schema, &UpdateOptions::upsert())
            .await;
        assert!(matches!(missing, Err(StoreError::Validation(_))));
        assert_eq!(connector.count("users", &FilterList::all(), &schema).await.unwrap(), 0);

        let upserted = connector
            .update("users", &by("email", Condition::eq("ann@x.io")), &Patch::new(), &schema, &UpdateOptions::upsert())
            .await
            .unwrap();
        assert_eq!(upserted, vec![doc! { "email": "ann@x.io", "rank": 0 }]);
        assert_eq!(connector.count("users", &FilterList::all(), &schema).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_returns_removed_documents() {
        let connector = seeded().await;

        let removed = connector
            .remove("users", &by("nick", Condition::starts("b")), &users())
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].get_str("email").unwrap(), "b@x.io");

        let nothing = connector
            .remove("users", &by("nick", Condition::eq("zed")), &users())
            .await
            .unwrap();
        assert!(nothing.is_empty());
        assert_eq!(connector.count("users", &FilterList::all(), &users()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expired_documents_are_purged() {
        let tokens = Schema::new()
            .field("token", FieldSpec::new(FieldType::String))
            .field("createdAT", FieldSpec::new(FieldType::Date).expires_after(Duration::from_secs(60)));
        let connector = MemoryConnector::new();
        let stale = DateTime::from_millis(DateTime::now().timestamp_millis() - 120_000);

        connector.insert("tokens", doc! { "token": "old", "createdAT": stale }, &tokens).await.unwrap();
        connector.insert("tokens", doc! { "token": "new", "createdAT": DateTime::now() }, &tokens).await.unwrap();

        let live = connector
            .select("tokens", &FilterList::all(), &tokens, &SelectOptions::default())
            .await
            .unwrap();

        assert_eq!(live.len(), 1);
        assert_eq!(live[0].get_str("token").unwrap(), "new");
    }

    #[tokio::test]
    async fn first_schema_registered_wins() {
        let connector = MemoryConnector::new();
        let loose = Schema::new().field("email", FieldSpec::new(FieldType::String));

        connector.insert("users", doc! { "email": "a@x.io" }, &loose).await.unwrap();
        connector.insert("users", doc! { "email": "a@x.io" }, &users()).await.unwrap();

        assert_eq!(connector.registered_entities().await, 1);
        assert_eq!(connector.count("users", &FilterList::all(), &users()).await.unwrap(), 2);
    }
}
