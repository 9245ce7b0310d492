use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, FindOptions, IndexOptions},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, trace};

use shelf_core::{
    config::DatabaseConfig,
    connector::{Connector, ConnectorBuilder},
    error::{StoreError, StoreResult},
    filter::FilterList,
    model::ModelCache,
    options::{SelectOptions, SortDirection, UpdateOptions},
    patch::Patch,
    schema::Schema,
};

use crate::compiler::MongoFilterCompiler;

/// A registered entity: its collection, with indexes created.
#[derive(Debug)]
pub(crate) struct MongoModel {
    collection: MongoCollection<Document>,
}

/// Connector backed by a MongoDB database.
///
/// The client is a connection pool; it is built once and shared by every operation.
#[derive(Debug)]
pub struct MongoConnector {
    client: Client,
    database: String,
    models: ModelCache<MongoModel>,
}

impl MongoConnector {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database, models: ModelCache::new() }
    }

    pub fn builder(uri: &str, database: &str) -> MongoConnectorBuilder {
        MongoConnectorBuilder::new(uri, database)
    }

    fn get_collection(&self, entity: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(entity)
    }

    async fn model(&self, entity: &str, schema: &Schema) -> StoreResult<Arc<MongoModel>> {
        self.models
            .get_or_register(entity, || self.register(entity, schema))
            .await
    }

    /// Creates the indexes the schema asks for. Unique fields get a unique index and the
    /// expiring field a TTL index.
    async fn register(&self, entity: &str, schema: &Schema) -> StoreResult<MongoModel> {
        let collection = self.get_collection(entity);
        let indexes = schema
            .fields()
            .filter(|(_, spec)| spec.index || spec.unique || spec.expiry().is_some())
            .map(|(field, spec)| {
                let mut options = IndexOptions::builder()
                    .unique(spec.unique)
                    .build();
                options.expire_after = spec.expiry();

                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(options)
                    .build()
            })
            .collect::<Vec<_>>();

        if !indexes.is_empty() {
            collection
                .create_indexes(indexes.clone())
                .await
                .map_err(|e| StoreError::Store(e.to_string()))?;
        }

        debug!(entity, indexes = indexes.len(), "registered MongoDB collection");

        Ok(MongoModel { collection })
    }

    fn find_options(options: &SelectOptions) -> FindOptions {
        let mut find_options = FindOptions::default();

        if let Some(limit) = options.limit {
            find_options.limit = Some(limit as i64);
        }
        if let Some(skip) = options.skip {
            find_options.skip = Some(skip as u64);
        }
        if let Some(sort) = &options.order {
            let direction = match sort.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            let mut order = Document::new();
            order.insert(sort.field.clone(), direction);

            find_options.sort = Some(order);
        }

        find_options
    }

    async fn find(collection: &MongoCollection<Document>, query: Document) -> StoreResult<Vec<Document>> {
        Ok(collection
            .find(query)
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?
            .into_iter()
            .map(restore_document)
            .collect())
    }

    async fn matching_ids(collection: &MongoCollection<Document>, query: Document) -> StoreResult<Vec<Bson>> {
        Ok(collection
            .find(query)
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?
            .into_iter()
            .filter_map(|document| document.get("_id").cloned())
            .collect())
    }

    /// Creates the document of an upsert that matched nothing.
    ///
    /// The prepared document goes to `$setOnInsert`, minus the fields the patch writes
    /// itself, so that MongoDB stores exactly what [`Schema::prepare_upsert`] describes.
    async fn upsert(
        collection: &MongoCollection<Document>,
        query: Document,
        mut update: Document,
        filter: &FilterList,
        patch: &Patch,
        schema: &Schema,
    ) -> StoreResult<Vec<Document>> {
        let on_insert = upsert_on_insert(schema.prepare_upsert(filter, patch)?, patch);

        if !on_insert.is_empty() {
            update.insert("$setOnInsert", on_insert);
        }

        if update.is_empty() {
            collection
                .insert_one(Document::new())
                .await
                .map_err(|e| StoreError::Store(e.to_string()))?;

            return Ok(vec![Document::new()]);
        }

        let result = collection
            .update_one(query, update)
            .upsert(true)
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?;

        match result.upserted_id {
            Some(id) => Self::find(collection, doc! { "_id": id }).await,
            None => Ok(vec![]),
        }
    }

    pub async fn shutdown(self) -> StoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Fields of a prepared upsert document left for `$setOnInsert`: those the patch's own
/// operators do not touch.
fn upsert_on_insert(prepared: Document, patch: &Patch) -> Document {
    prepared
        .into_iter()
        .filter(|(field, _)| !patch.set.contains_key(field) && !patch.push.contains_key(field))
        .collect()
}

/// Drops the store-generated `_id`; identity is whatever field business logic designates.
fn restore_document(mut document: Document) -> Document {
    document.remove("_id");
    document
}

#[async_trait]
impl Connector for MongoConnector {
    async fn insert(&self, entity: &str, document: Document, schema: &Schema) -> StoreResult<Document> {
        let model = self.model(entity, schema).await?;

        model
            .collection
            .insert_one(&document)
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?;

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
        let query = MongoFilterCompiler::compile(filter)?;
        trace!(entity, %query, "compiled select");

        Ok(model
            .collection
            .find(query)
            .with_options(Self::find_options(options))
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?
            .into_iter()
            .map(restore_document)
            .collect())
    }

    async fn count(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<u64> {
        let model = self.model(entity, schema).await?;
        let query = MongoFilterCompiler::compile(filter)?;
        trace!(entity, %query, "compiled count");

        model
            .collection
            .count_documents(query)
            .await
            .map_err(|e| StoreError::Store(e.to_string()))
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
        let query = MongoFilterCompiler::compile(filter)?;
        let update = patch.to_document();
        trace!(entity, %query, %update, "compiled update");

        let ids = Self::matching_ids(&model.collection, query.clone()).await?;

        if ids.is_empty() {
            if !options.upsert {
                return Ok(vec![]);
            }

            return Self::upsert(&model.collection, query, update, filter, patch, schema).await;
        }

        let by_id = doc! { "_id": { "$in": ids } };

        if !update.is_empty() {
            model
                .collection
                .update_many(by_id.clone(), update)
                .await
                .map_err(|e| StoreError::Store(e.to_string()))?;
        }

        Self::find(&model.collection, by_id).await
    }

    async fn remove(&self, entity: &str, filter: &FilterList, schema: &Schema) -> StoreResult<Vec<Document>> {
        let model = self.model(entity, schema).await?;
        let query = MongoFilterCompiler::compile(filter)?;
        trace!(entity, %query, "compiled remove");

        let matched = model
            .collection
            .find(query)
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?;

        if matched.is_empty() {
            return Ok(vec![]);
        }

        let ids = matched
            .iter()
            .filter_map(|document| document.get("_id").cloned())
            .collect::<Vec<_>>();

        model
            .collection
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(|e| StoreError::Store(e.to_string()))?;

        Ok(matched
            .into_iter()
            .map(restore_document)
            .collect())
    }

    async fn shutdown(self) -> StoreResult<()> {
        self.shutdown().await
    }
}

pub struct MongoConnectorBuilder {
    uri: String,
    database: String,
    app_name: Option<String>,
    connect_timeout: Option<Duration>,
}

impl MongoConnectorBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
            app_name: None,
            connect_timeout: None,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            uri: config.uri.clone(),
            database: config.database.clone(),
            app_name: config.app_name.clone(),
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Bounds both connection establishment and server selection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ConnectorBuilder for MongoConnectorBuilder {
    type Connector = MongoConnector;

    async fn build(self) -> StoreResult<Self::Connector> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| StoreError::Initialization(e.to_string()))?;

        if let Some(app_name) = self.app_name {
            options.app_name = Some(app_name);
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);
        }

        debug!(database = %self.database, "connecting to MongoDB");

        Ok(MongoConnector::new(
            Client::with_options(options).map_err(|e| StoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::config::Engine;

    #[test]
    fn builder_reads_connection_settings_from_config() {
        let config = DatabaseConfig {
            engine: Engine::MongoDb,
            uri: "mongodb://db:27017".to_string(),
            database: "catalogue".to_string(),
            app_name: Some("shelf".to_string()),
            connect_timeout_secs: Some(3),
        };

        let builder = MongoConnectorBuilder::from_config(&config);

        assert_eq!(builder.uri, "mongodb://db:27017");
        assert_eq!(builder.database, "catalogue");
        assert_eq!(builder.app_name.as_deref(), Some("shelf"));
        assert_eq!(builder.connect_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn find_options_mirror_select_options() {
        let options = SelectOptions::builder()
            .order(shelf_core::options::Sort::parse("!last_connected"))
            .limit(10)
            .skip(20)
            .build();

        let find_options = MongoConnector::find_options(&options);

        assert_eq!(find_options.limit, Some(10));
        assert_eq!(find_options.skip, Some(20));
        assert_eq!(find_options.sort, Some(doc! { "last_connected": -1 }));
    }

    #[test]
    fn store_identifiers_are_stripped() {
        let restored = restore_document(doc! { "_id": 1, "nick": "ann" });

        assert_eq!(restored, doc! { "nick": "ann" });
    }

    #[test]
    fn upserts_insert_what_the_patch_does_not_write() {
        let schema = Schema::new()
            .field("email", shelf_core::schema::FieldSpec::new(shelf_core::schema::FieldType::String).required())
            .field("rank", shelf_core::schema::FieldSpec::new(shelf_core::schema::FieldType::Number).default_value(0));
        let filter = FilterList::from(
            shelf_core::filter::FilterObject::new().with("email", shelf_core::filter::Condition::eq("ann@x.io")),
        );
        let patch = Patch::new().set("nick", "ann").push("tags", "new");

        let prepared = schema.prepare_upsert(&filter, &patch).unwrap();

        assert_eq!(upsert_on_insert(prepared, &patch), doc! { "email": "ann@x.io", "rank": 0 });
    }
}
