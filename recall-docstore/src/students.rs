//! Student documents: `{"name": ..., "topics": [{"title": ..., "score": ...}]}`.

use crate::document::{Accumulator, Document, SortOrder, Stage};
use crate::store::DocumentStore;

/// Students ranked by the mean score over their topics, best first. Each result carries the
/// student `_id`, `name`, `topics` and `averageScore`. Students without topics are left out.
pub async fn top_students<D: DocumentStore>(collection: &D) -> crate::Result<Vec<Document>> {
    let stages = [
        Stage::Unwind("topics".to_string()),
        Stage::Group {
            by: "_id".to_string(),
            accumulators: vec![
                ("name".to_string(), Accumulator::First("name".to_string())),
                ("topics".to_string(), Accumulator::Push("topics".to_string())),
                (
                    "averageScore".to_string(),
                    Accumulator::Avg("topics.score".to_string()),
                ),
            ],
        },
        Stage::Sort {
            field: "averageScore".to_string(),
            order: SortOrder::Descending,
        },
    ];
    collection.aggregate(&stages).await
}
