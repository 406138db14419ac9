use std::fmt;

use serde_json::Value;

use crate::document::{Accumulator, Filter, SortOrder, Stage};
use crate::store::DocumentStore;

/// Methods reported by [LogStats], in report order.
pub const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

const STATUS_PATH: &str = "/status";

pub async fn count_logs<D: DocumentStore>(collection: &D) -> crate::Result<u64> {
    collection.count(&Filter::All).await
}

pub async fn count_method<D: DocumentStore>(collection: &D, method: &str) -> crate::Result<u64> {
    collection.count(&Filter::eq("method", method)).await
}

/// Requests to the `/status` path.
pub async fn count_status_check<D: DocumentStore>(collection: &D) -> crate::Result<u64> {
    collection.count(&Filter::eq("path", STATUS_PATH)).await
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpCount {
    pub ip: String,
    pub count: u64,
}

/// The `limit` most frequent client addresses, most frequent first.
pub async fn top_ips<D: DocumentStore>(collection: &D, limit: usize) -> crate::Result<Vec<IpCount>> {
    let stages = [
        Stage::Group {
            by: "remote_addr".to_string(),
            accumulators: vec![("count".to_string(), Accumulator::Count)],
        },
        Stage::Sort {
            field: "count".to_string(),
            order: SortOrder::Descending,
        },
        Stage::Limit(limit),
    ];

    let rows = collection.aggregate(&stages).await?;
    Ok(rows
        .into_iter()
        .map(|row| IpCount {
            ip: match row.get("_id") {
                Some(Value::String(ip)) => ip.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            count: row.get("count").and_then(Value::as_u64).unwrap_or(0),
        })
        .collect())
}

/// Summary of an nginx log collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStats {
    pub total: u64,
    pub methods: Vec<(&'static str, u64)>,
    pub status_checks: u64,
}

impl LogStats {
    pub async fn collect<D: DocumentStore>(collection: &D) -> crate::Result<Self> {
        let total = count_logs(collection).await?;
        let mut methods = Vec::with_capacity(METHODS.len());
        for method in METHODS {
            methods.push((method, count_method(collection, method).await?));
        }
        let status_checks = count_status_check(collection).await?;
        Ok(Self {
            total,
            methods,
            status_checks,
        })
    }
}

impl fmt::Display for LogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} logs", self.total)?;
        writeln!(f, "Methods:")?;
        for (method, count) in &self.methods {
            writeln!(f, "\tmethod {method}: {count}")?;
        }
        write!(f, "{} status check", self.status_checks)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::in_memory_store::InMemoryDocumentStore;

    async fn nginx() -> InMemoryDocumentStore {
        let logs = InMemoryDocumentStore::new("nginx");
        let entries = [
            ("GET", "/status", "10.0.0.1"),
            ("GET", "/", "10.0.0.2"),
            ("POST", "/login", "10.0.0.2"),
            ("GET", "/status", "10.0.0.3"),
            ("DELETE", "/item/1", "10.0.0.2"),
            ("PUT", "/item/1", "10.0.0.3"),
        ];
        for (method, path, ip) in entries {
            let doc = json!({"method": method, "path": path, "remote_addr": ip});
            logs.insert_one(doc.as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        logs
    }

    #[tokio::test]
    async fn test_counts() {
        let logs = nginx().await;
        assert_eq!(count_logs(&logs).await.unwrap(), 6);
        assert_eq!(count_method(&logs, "GET").await.unwrap(), 3);
        assert_eq!(count_method(&logs, "PATCH").await.unwrap(), 0);
        assert_eq!(count_status_check(&logs).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_top_ips() {
        let logs = nginx().await;
        let top = top_ips(&logs, 2).await.unwrap();
        assert_eq!(
            top,
            vec![
                IpCount {
                    ip: "10.0.0.2".to_string(),
                    count: 3
                },
                IpCount {
                    ip: "10.0.0.3".to_string(),
                    count: 2
                },
            ]
        );
        assert_eq!(top_ips(&logs, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_report() {
        let logs = nginx().await;
        let stats = LogStats::collect(&logs).await.unwrap();
        assert_eq!(
            stats.to_string(),
            "6 logs\n\
             Methods:\n\
             \tmethod GET: 3\n\
             \tmethod POST: 1\n\
             \tmethod PUT: 1\n\
             \tmethod PATCH: 0\n\
             \tmethod DELETE: 1\n\
             2 status check"
        );
    }

    #[tokio::test]
    async fn test_report_empty_collection() {
        let logs = InMemoryDocumentStore::new("nginx");
        let stats = LogStats::collect(&logs).await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.methods.iter().all(|(_, count)| *count == 0));
    }
}
