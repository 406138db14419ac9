use std::cmp::Ordering;

use serde_json::{Map, Value};

/// A document is a JSON object. `_id` holds its identity once inserted.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

/// Resolve a dotted `path` (`topics.score`) inside `doc`.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Selects documents for `find`, `count` and `update_one`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document.
    All,
    /// `field` equals `value`, or `field` is an array containing `value`.
    Eq { field: String, value: Value },
    /// `field` is a string containing `needle` ignoring case, or an array holding such a string.
    ContainsIgnoreCase { field: String, needle: String },
    /// Every filter matches.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains_ignore_case(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::ContainsIgnoreCase {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => match lookup(doc, field) {
                Some(Value::Array(items)) if !value.is_array() => items.contains(value),
                Some(found) => found == value,
                None => value.is_null(),
            },
            Filter::ContainsIgnoreCase { field, needle } => {
                let needle = needle.to_lowercase();
                let contains = |value: &Value| {
                    value
                        .as_str()
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
                };
                match lookup(doc, field) {
                    Some(Value::Array(items)) => items.iter().any(contains),
                    Some(found) => contains(found),
                    None => false,
                }
            }
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(doc)),
        }
    }
}

/// Field replacements applied by `update_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Document,
}

impl Update {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_set(field, value)
    }

    pub fn and_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// The fields replaced by this update.
    pub fn fields(&self) -> &Document {
        &self.set
    }

    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in &self.set {
            doc.insert(field.clone(), value.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Per-group accumulators of a [Stage::Group].
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Value of the field in the first document of the group.
    First(String),
    /// Every value of the field, in document order.
    Push(String),
    /// Mean of the numeric values of the field, null if there are none.
    Avg(String),
    /// Sum of the numeric values of the field.
    Sum(String),
    /// Number of documents in the group.
    Count,
}

/// The aggregation stages the helpers need.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// One output document per element of the array `field`.
    Unwind(String),
    /// Group on the value of `by`, which becomes `_id` of the output document.
    Group {
        by: String,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort {
        field: String,
        order: SortOrder,
    },
    Limit(usize),
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order used by [Stage::Sort]; a missing field sorts like null.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_lookup_nested() {
        let d = doc(json!({"topic": {"title": "C", "score": 4.5}}));
        assert_eq!(lookup(&d, "topic.score"), Some(&json!(4.5)));
        assert_eq!(lookup(&d, "topic.missing"), None);
        assert_eq!(lookup(&d, "nope.score"), None);
    }

    #[test]
    fn test_filter_eq() {
        let d = doc(json!({"name": "Holberton", "topics": ["C", "Python"]}));
        assert!(Filter::eq("name", "Holberton").matches(&d));
        assert!(!Filter::eq("name", "holberton").matches(&d));
        assert!(Filter::eq("topics", "Python").matches(&d));
        assert!(Filter::eq("missing", Value::Null).matches(&d));
        assert!(Filter::All.matches(&d));
    }

    #[test]
    fn test_filter_contains_ignore_case() {
        let d = doc(json!({"name": "UCSF", "topics": ["Algorithm", "MongoDB"]}));
        assert!(Filter::contains_ignore_case("topics", "mongo").matches(&d));
        assert!(Filter::contains_ignore_case("name", "csf").matches(&d));
        assert!(!Filter::contains_ignore_case("topics", "python").matches(&d));
        assert!(!Filter::contains_ignore_case("missing", "a").matches(&d));
    }

    #[test]
    fn test_filter_and() {
        let d = doc(json!({"method": "GET", "path": "/status"}));
        let filter = Filter::And(vec![Filter::eq("method", "GET"), Filter::eq("path", "/status")]);
        assert!(filter.matches(&d));
        let filter = Filter::And(vec![Filter::eq("method", "POST"), Filter::eq("path", "/status")]);
        assert!(!filter.matches(&d));
    }

    #[test]
    fn test_update_apply() {
        let mut d = doc(json!({"name": "UCSF", "topics": []}));
        Update::set("topics", json!(["Sys admin"]))
            .and_set("address", "505 Parnassus Ave")
            .apply(&mut d);
        assert_eq!(d["topics"], json!(["Sys admin"]));
        assert_eq!(d["address"], json!("505 Parnassus Ave"));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10.5))),
            Ordering::Less
        );
        assert_eq!(compare_values(None, Some(&json!(0))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }
}
