use crate::document::{Document, Filter, Stage, Update};

pub mod in_memory_store;
pub mod mongo_store;

/// DocumentStore is the minimal collection interface the query helpers need.
#[trait_variant::make(Send)]
pub trait DocumentStore: Sync {
    /// Insert `document` and return its `_id`, generating one when the document has none.
    async fn insert_one(&self, document: Document) -> crate::Result<String>;

    /// Apply `update` to the first document matching `filter`. Returns the number of documents
    /// modified (0 or 1).
    async fn update_one(&self, filter: &Filter, update: &Update) -> crate::Result<u64>;

    async fn find(&self, filter: &Filter) -> crate::Result<Vec<Document>>;

    async fn count(&self, filter: &Filter) -> crate::Result<u64>;

    async fn aggregate(&self, pipeline: &[Stage]) -> crate::Result<Vec<Document>>;
}
