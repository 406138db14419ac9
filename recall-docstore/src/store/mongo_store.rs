//! [DocumentStore] backed by a MongoDB collection. Filters, updates and pipeline stages are
//! translated to their BSON query form and evaluated by the server.

use futures::TryStreamExt;
use mongodb::bson::{self, Bson, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Collection};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::Error;
use crate::document::{Accumulator, Document, Filter, ID_FIELD, SortOrder, Stage, Update};
use crate::store::DocumentStore;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// A single MongoDB collection. The [Collection] handle is cheap to clone and shares the
/// client's connection pool.
#[derive(Clone, Debug)]
pub struct MongoDocumentStore {
    collection: Collection<bson::Document>,
}

impl MongoDocumentStore {
    /// Connect to `url` and check the server answers before handing out the collection.
    pub async fn connect(url: &str, database: &str, collection: &str) -> crate::Result<Self> {
        let client = Client::with_uri_str(url)
            .await
            .map_err(|e| Error::Connection(format!("Creating MongoDB client: {e}")))?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::Connection(format!("Connecting to MongoDB server: {e}")))?;

        info!(database, collection, "Connected to MongoDB");
        Ok(Self {
            collection: db.collection(collection),
        })
    }
}

fn mongo_error(e: mongodb::error::Error) -> Error {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE =>
        {
            Error::DuplicateKey(write_error.message.clone())
        }
        _ => Error::Mongo(e.to_string()),
    }
}

fn to_bson(value: &Value) -> crate::Result<Bson> {
    bson::to_bson(value).map_err(|e| Error::InvalidDocument(format!("{value}: {e}")))
}

fn to_bson_document(document: &Document) -> crate::Result<bson::Document> {
    bson::to_document(document).map_err(|e| Error::InvalidDocument(e.to_string()))
}

fn from_bson_document(document: bson::Document) -> crate::Result<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidDocument(format!("expected an object, got {other}"))),
    }
}

/// Regex source matching `needle` literally.
fn escape_regex(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The query document selecting what `filter` selects.
pub fn filter_to_bson(filter: &Filter) -> crate::Result<bson::Document> {
    let mut query = bson::Document::new();
    match filter {
        Filter::All => {}
        Filter::Eq { field, value } => {
            query.insert(field.clone(), to_bson(value)?);
        }
        Filter::ContainsIgnoreCase { field, needle } => {
            query.insert(
                field.clone(),
                doc! { "$regex": escape_regex(needle), "$options": "i" },
            );
        }
        Filter::And(filters) if filters.is_empty() => {}
        Filter::And(filters) => {
            let clauses = filters
                .iter()
                .map(|filter| filter_to_bson(filter).map(Bson::Document))
                .collect::<crate::Result<Vec<_>>>()?;
            query.insert("$and", clauses);
        }
    }
    Ok(query)
}

pub fn update_to_bson(update: &Update) -> crate::Result<bson::Document> {
    Ok(doc! { "$set": to_bson_document(update.fields())? })
}

fn field_path(field: &str) -> String {
    format!("${field}")
}

fn accumulator_to_bson(accumulator: &Accumulator) -> bson::Document {
    match accumulator {
        Accumulator::First(field) => doc! { "$first": field_path(field) },
        Accumulator::Push(field) => doc! { "$push": field_path(field) },
        Accumulator::Avg(field) => doc! { "$avg": field_path(field) },
        Accumulator::Sum(field) => doc! { "$sum": field_path(field) },
        Accumulator::Count => doc! { "$sum": 1 },
    }
}

pub fn stage_to_bson(stage: &Stage) -> bson::Document {
    match stage {
        Stage::Unwind(field) => doc! { "$unwind": field_path(field) },
        Stage::Group { by, accumulators } => {
            let mut group = doc! { "_id": field_path(by) };
            for (name, accumulator) in accumulators {
                group.insert(name.clone(), accumulator_to_bson(accumulator));
            }
            doc! { "$group": group }
        }
        Stage::Sort { field, order } => {
            let direction = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            let mut sort = bson::Document::new();
            sort.insert(field.clone(), direction);
            doc! { "$sort": sort }
        }
        Stage::Limit(n) => doc! { "$limit": i64::try_from(*n).unwrap_or(i64::MAX) },
    }
}

impl DocumentStore for MongoDocumentStore {
    async fn insert_one(&self, mut document: Document) -> crate::Result<String> {
        // string ids keep `_id` comparable with what the in-memory store hands out
        let id = document
            .entry(ID_FIELD)
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
            .clone();

        self.collection
            .insert_one(to_bson_document(&document)?)
            .await
            .map_err(mongo_error)?;

        debug!(collection = %self.collection.name(), id = %id, "Inserted document");
        Ok(match id {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    async fn update_one(&self, filter: &Filter, update: &Update) -> crate::Result<u64> {
        let result = self
            .collection
            .update_one(filter_to_bson(filter)?, update_to_bson(update)?)
            .await
            .map_err(mongo_error)?;
        Ok(result.matched_count)
    }

    async fn find(&self, filter: &Filter) -> crate::Result<Vec<Document>> {
        let cursor = self
            .collection
            .find(filter_to_bson(filter)?)
            .await
            .map_err(mongo_error)?;
        let found: Vec<bson::Document> = cursor.try_collect().await.map_err(mongo_error)?;
        found.into_iter().map(from_bson_document).collect()
    }

    async fn count(&self, filter: &Filter) -> crate::Result<u64> {
        self.collection
            .count_documents(filter_to_bson(filter)?)
            .await
            .map_err(mongo_error)
    }

    async fn aggregate(&self, pipeline: &[Stage]) -> crate::Result<Vec<Document>> {
        let cursor = self
            .collection
            .aggregate(pipeline.iter().map(stage_to_bson))
            .await
            .map_err(mongo_error)?;
        let results: Vec<bson::Document> = cursor.try_collect().await.map_err(mongo_error)?;
        results.into_iter().map(from_bson_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_filter_to_bson() {
        assert_eq!(filter_to_bson(&Filter::All).unwrap(), doc! {});
        assert_eq!(
            filter_to_bson(&Filter::eq("method", "GET")).unwrap(),
            doc! { "method": "GET" }
        );
        assert_eq!(
            filter_to_bson(&Filter::contains_ignore_case("topics", "c++")).unwrap(),
            doc! { "topics": { "$regex": "c\\+\\+", "$options": "i" } }
        );
        assert_eq!(
            filter_to_bson(&Filter::And(vec![
                Filter::eq("method", "GET"),
                Filter::eq("path", "/status"),
            ]))
            .unwrap(),
            doc! { "$and": [{ "method": "GET" }, { "path": "/status" }] }
        );
        assert_eq!(filter_to_bson(&Filter::And(Vec::new())).unwrap(), doc! {});
    }

    #[test]
    fn test_update_to_bson() {
        let update = Update::set("topics", json!(["Sys admin"]));
        assert_eq!(
            update_to_bson(&update).unwrap(),
            doc! { "$set": { "topics": ["Sys admin"] } }
        );
    }

    #[test]
    fn test_stage_to_bson() {
        let stages = [
            Stage::Unwind("topics".to_string()),
            Stage::Group {
                by: "remote_addr".to_string(),
                accumulators: vec![
                    ("count".to_string(), Accumulator::Count),
                    ("avg".to_string(), Accumulator::Avg("topics.score".to_string())),
                ],
            },
            Stage::Sort {
                field: "count".to_string(),
                order: SortOrder::Descending,
            },
            Stage::Limit(10),
        ];
        let pipeline: Vec<bson::Document> = stages.iter().map(stage_to_bson).collect();
        assert_eq!(
            pipeline,
            vec![
                doc! { "$unwind": "$topics" },
                doc! { "$group": {
                    "_id": "$remote_addr",
                    "count": { "$sum": 1 },
                    "avg": { "$avg": "$topics.score" },
                } },
                doc! { "$sort": { "count": -1 } },
                doc! { "$limit": 10_i64 },
            ]
        );
    }

    #[test]
    fn test_from_bson_document() {
        let document = doc! { "_id": "a", "n": 3_i64, "score": 4.5, "tags": ["x"] };
        assert_eq!(
            Value::Object(from_bson_document(document).unwrap()),
            json!({"_id": "a", "n": 3, "score": 4.5, "tags": ["x"]})
        );
    }

    #[tokio::test]
    async fn test_connect_invalid_url() {
        let result = MongoDocumentStore::connect("no_such_mongo://127.0.0.1", "logs", "nginx").await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[cfg(feature = "mongo-tests")]
    #[tokio::test]
    async fn test_mongo_store() {
        let collection = format!("test_mongo_store_{}", std::process::id());
        let store = MongoDocumentStore::connect("mongodb://127.0.0.1:27017", "recall", &collection)
            .await
            .unwrap();

        for (ip, method) in [("10.0.0.1", "GET"), ("10.0.0.2", "GET"), ("10.0.0.2", "POST")] {
            let Value::Object(doc) = json!({"remote_addr": ip, "method": method}) else {
                unreachable!()
            };
            store.insert_one(doc).await.unwrap();
        }

        let Value::Object(dup) = json!({"_id": "fixed"}) else {
            unreachable!()
        };
        store.insert_one(dup.clone()).await.unwrap();
        assert!(matches!(store.insert_one(dup).await, Err(Error::DuplicateKey(_))));

        assert_eq!(store.count(&Filter::eq("method", "GET")).await.unwrap(), 2);
        assert_eq!(
            store
                .update_one(&Filter::eq("method", "POST"), &Update::set("method", "PUT"))
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.find(&Filter::eq("method", "PUT")).await.unwrap().len(), 1);

        let top = store
            .aggregate(&[
                Stage::Group {
                    by: "remote_addr".to_string(),
                    accumulators: vec![("count".to_string(), Accumulator::Count)],
                },
                Stage::Sort {
                    field: "count".to_string(),
                    order: SortOrder::Descending,
                },
                Stage::Limit(1),
            ])
            .await
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0]["_id"], json!("10.0.0.2"));
        assert_eq!(top[0]["count"], json!(2));

        store.collection.drop().await.unwrap();
    }
}
