//! School documents: `{"name": ..., "topics": [...]}` plus any extra fields.

use serde_json::Value;
use tracing::debug;

use crate::document::{Document, Filter, Update};
use crate::store::DocumentStore;

/// Every document in the collection.
pub async fn list_all<D: DocumentStore>(collection: &D) -> crate::Result<Vec<Document>> {
    collection.find(&Filter::All).await
}

/// Insert a school built from `fields` and return its id.
pub async fn insert_school<D, I, K>(collection: &D, fields: I) -> crate::Result<String>
where
    D: DocumentStore,
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let document: Document = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
    collection.insert_one(document).await
}

/// Replace the topics of the school called `name`. Returns whether a school was modified.
pub async fn update_topics<D: DocumentStore>(
    collection: &D,
    name: &str,
    topics: &[&str],
) -> crate::Result<bool> {
    let modified = collection
        .update_one(&Filter::eq("name", name), &Update::set("topics", topics))
        .await?;
    debug!(name, modified, "Updated school topics");
    Ok(modified > 0)
}

/// Schools with a topic containing `topic`, ignoring case.
pub async fn schools_by_topic<D: DocumentStore>(
    collection: &D,
    topic: &str,
) -> crate::Result<Vec<Document>> {
    collection
        .find(&Filter::contains_ignore_case("topics", topic))
        .await
}
