use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde_json::{Number, Value};

use crate::document::{Accumulator, Document, ID_FIELD, SortOrder, Stage, compare_values, lookup};

/// Run `stages` in order over `docs`.
pub fn run(docs: Vec<Document>, stages: &[Stage]) -> Vec<Document> {
    stages.iter().fold(docs, |docs, stage| match stage {
        Stage::Unwind(field) => unwind(docs, field),
        Stage::Group { by, accumulators } => group(&docs, by, accumulators),
        Stage::Sort { field, order } => sort(docs, field, *order),
        Stage::Limit(n) => docs.into_iter().take(*n).collect(),
    })
}

/// Documents without the field or with an empty array are dropped; a non-array value passes
/// through as a single element.
fn unwind(docs: Vec<Document>, field: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match doc.get(field).cloned() {
            Some(Value::Array(items)) => {
                for item in items {
                    let mut unwound = doc.clone();
                    unwound.insert(field.to_string(), item);
                    out.push(unwound);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn accumulate(members: &[&Document], accumulator: &Accumulator) -> Value {
    match accumulator {
        Accumulator::First(field) => members
            .first()
            .and_then(|doc| lookup(doc, field))
            .cloned()
            .unwrap_or(Value::Null),
        Accumulator::Push(field) => Value::Array(
            members
                .iter()
                .filter_map(|doc| lookup(doc, field).cloned())
                .collect(),
        ),
        Accumulator::Avg(field) => {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|doc| lookup(doc, field).and_then(Value::as_f64))
                .collect();
            if values.is_empty() {
                Value::Null
            } else {
                number(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Accumulator::Sum(field) => {
            let values: Vec<&Value> = members
                .iter()
                .filter_map(|doc| lookup(doc, field))
                .filter(|value| value.is_number())
                .collect();
            if values.iter().all(|value| value.is_i64()) {
                Value::from(values.iter().filter_map(|value| value.as_i64()).sum::<i64>())
            } else {
                number(values.iter().filter_map(|value| value.as_f64()).sum())
            }
        }
        Accumulator::Count => Value::from(members.len() as u64),
    }
}

/// Groups keep the order in which their key was first seen.
fn group(docs: &[Document], by: &str, accumulators: &[(String, Accumulator)]) -> Vec<Document> {
    // groups are looked up by the JSON text of their key
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<&Document>)> = Vec::new();
    for doc in docs {
        let key = lookup(doc, by).cloned().unwrap_or(Value::Null);
        match index.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                if let Some((_, members)) = groups.get_mut(*slot.get()) {
                    members.push(doc);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push((key, vec![doc]));
            }
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert(ID_FIELD.to_string(), key);
            for (name, accumulator) in accumulators {
                out.insert(name.clone(), accumulate(&members, accumulator));
            }
            out
        })
        .collect()
}

fn sort(mut docs: Vec<Document>, field: &str, order: SortOrder) -> Vec<Document> {
    docs.sort_by(|a, b| {
        let ordering = compare_values(lookup(a, field), lookup(b, field));
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
    docs
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn docs(values: Value) -> Vec<Document> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_unwind() {
        let input = docs(json!([
            {"_id": 1, "topics": ["a", "b"]},
            {"_id": 2, "topics": []},
            {"_id": 3},
            {"_id": 4, "topics": "c"},
        ]));
        let out = run(input, &[Stage::Unwind("topics".to_string())]);
        let topics: Vec<&Value> = out.iter().map(|d| &d["topics"]).collect();
        assert_eq!(topics, vec![&json!("a"), &json!("b"), &json!("c")]);
    }

    #[test]
    fn test_group_count_sort_limit() {
        let input = docs(json!([
            {"ip": "10.0.0.1"},
            {"ip": "10.0.0.2"},
            {"ip": "10.0.0.2"},
            {"ip": "10.0.0.3"},
            {"ip": "10.0.0.2"},
            {"ip": "10.0.0.3"},
        ]));
        let stages = [
            Stage::Group {
                by: "ip".to_string(),
                accumulators: vec![("count".to_string(), Accumulator::Count)],
            },
            Stage::Sort {
                field: "count".to_string(),
                order: SortOrder::Descending,
            },
            Stage::Limit(2),
        ];
        let out = run(input, &stages);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], json!("10.0.0.2"));
        assert_eq!(out[0]["count"], json!(3));
        assert_eq!(out[1]["_id"], json!("10.0.0.3"));
        assert_eq!(out[1]["count"], json!(2));
    }

    #[test]
    fn test_group_many_keys_keeps_first_seen_order() {
        let input: Vec<Document> = (0..20_000)
            .map(|i| {
                let host = i % 5_000;
                let mut doc = Document::new();
                doc.insert("ip".to_string(), json!(format!("10.0.{}.{}", host / 256, host % 256)));
                doc
            })
            .collect();
        let stages = [Stage::Group {
            by: "ip".to_string(),
            accumulators: vec![("count".to_string(), Accumulator::Count)],
        }];
        let out = run(input, &stages);
        assert_eq!(out.len(), 5_000);
        assert!(out.iter().all(|group| group["count"] == json!(4)));
        assert_eq!(out[0]["_id"], json!("10.0.0.0"));
        assert_eq!(out[4_999]["_id"], json!("10.0.19.135"));
    }

    #[test]
    fn test_group_accumulators() {
        let input = docs(json!([
            {"k": "x", "name": "first", "n": 1, "f": 1.5},
            {"k": "x", "name": "second", "n": 2, "f": 2.5},
            {"k": "y", "name": "third"},
        ]));
        let stages = [Stage::Group {
            by: "k".to_string(),
            accumulators: vec![
                ("name".to_string(), Accumulator::First("name".to_string())),
                ("names".to_string(), Accumulator::Push("name".to_string())),
                ("avg".to_string(), Accumulator::Avg("n".to_string())),
                ("sum".to_string(), Accumulator::Sum("n".to_string())),
                ("fsum".to_string(), Accumulator::Sum("f".to_string())),
            ],
        }];
        let out = run(input, &stages);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["name"], json!("first"));
        assert_eq!(out[0]["names"], json!(["first", "second"]));
        assert_eq!(out[0]["avg"], json!(1.5));
        assert_eq!(out[0]["sum"], json!(3));
        assert_eq!(out[0]["fsum"], json!(4.0));
        assert_eq!(out[1]["avg"], Value::Null);
        assert_eq!(out[1]["sum"], json!(0));
    }
}
