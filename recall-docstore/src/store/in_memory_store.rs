//! In-memory implementation of the [DocumentStore] trait for tests and for loading local dumps.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::Error;
use crate::document::{Document, Filter, ID_FIELD, Stage, Update};
use crate::pipeline;
use crate::store::DocumentStore;

/// A single collection kept in insertion order and shared between clones.
#[derive(Clone, Debug)]
pub struct InMemoryDocumentStore {
    name: String,
    docs: Arc<RwLock<Vec<Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn insert_one(&self, mut document: Document) -> crate::Result<String> {
        let id = document
            .entry(ID_FIELD)
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
            .clone();

        let mut docs = self.docs.write();
        if docs.iter().any(|doc| doc.get(ID_FIELD) == Some(&id)) {
            return Err(Error::DuplicateKey(format!(
                "{} already holds _id {id}",
                self.name
            )));
        }
        docs.push(document);
        debug!(collection = %self.name, id = %id, "Inserted document");
        Ok(id_string(&id))
    }

    async fn update_one(&self, filter: &Filter, update: &Update) -> crate::Result<u64> {
        let mut docs = self.docs.write();
        let Some(doc) = docs.iter_mut().find(|doc| filter.matches(doc)) else {
            return Ok(0);
        };
        update.apply(doc);
        Ok(1)
    }

    async fn find(&self, filter: &Filter) -> crate::Result<Vec<Document>> {
        Ok(self
            .docs
            .read()
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &Filter) -> crate::Result<u64> {
        Ok(self
            .docs
            .read()
            .iter()
            .filter(|doc| filter.matches(doc))
            .count() as u64)
    }

    async fn aggregate(&self, stages: &[Stage]) -> crate::Result<Vec<Document>> {
        let docs = self.docs.read().clone();
        Ok(pipeline::run(docs, stages))
    }
}
