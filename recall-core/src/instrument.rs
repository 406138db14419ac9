//! Call counting and call history are wrappers around an [Operation]. Each wrapper takes an
//! operation plus a [KVStore] handle and returns a new operation with the same name, input and
//! output, so they compose at construction time:
//!
//! ```ignore
//! let op = count_calls(call_history(StoreEntry::new(kv.clone()), kv.clone()), kv);
//! ```
//!
//! For an operation named `name` the counter lives at `name` and the history at
//! `name:inputs` / `name:outputs`. Counting and recording are separate round trips, so the
//! counter and the history length only stay equal when a single caller drives the operation.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::Error;
use crate::store::KVStore;

/// An async, named unit of work that can be instrumented.
pub trait Operation: Sync {
    type Input: Serialize + Send;
    type Output: Serialize + Send;

    /// Stable name used to namespace the counter and history keys.
    fn name(&self) -> &str;

    fn call(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = crate::Result<Self::Output>> + Send;
}

/// Key of the list holding the serialized inputs of `name`.
pub fn inputs_key(name: &str) -> String {
    format!("{name}:inputs")
}

/// Key of the list holding the serialized outputs of `name`.
pub fn outputs_key(name: &str) -> String {
    format!("{name}:outputs")
}

/// Increments the counter of the wrapped operation before every call.
#[derive(Clone)]
pub struct CountCalls<O, S> {
    inner: O,
    store: S,
}

/// Wrap `inner` so every call first increments the counter at `inner.name()`.
pub fn count_calls<O: Operation, S: KVStore>(inner: O, store: S) -> CountCalls<O, S> {
    CountCalls { inner, store }
}

impl<O: Operation, S: KVStore> Operation for CountCalls<O, S> {
    type Input = O::Input;
    type Output = O::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn call(&self, input: Self::Input) -> crate::Result<Self::Output> {
        let calls = self.store.incr(self.inner.name()).await?;
        debug!(operation = self.inner.name(), calls, "Counted call");
        self.inner.call(input).await
    }
}

/// Records the inputs and the result of every call of the wrapped operation.
#[derive(Clone)]
pub struct CallHistory<O, S> {
    inner: O,
    store: S,
}

/// Wrap `inner` so every call is appended to its input and output logs.
///
/// The input is appended before the call and the output after it returns. A failed call still
/// appends `{"error": "<message>"}` to the output log, which keeps both logs index aligned, and
/// the error is returned unchanged.
///
/// Failing to record the input skips the call. Failing to record the output only logs a warning
/// and the call's own result is still returned, since its side effects already happened; the
/// inputs log is then one entry longer than the outputs log.
pub fn call_history<O: Operation, S: KVStore>(inner: O, store: S) -> CallHistory<O, S> {
    CallHistory { inner, store }
}

#[derive(Serialize)]
struct FailedCall {
    error: String,
}

fn encode<T: Serialize + ?Sized>(value: &T) -> crate::Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::Serialization(format!("Serializing call record: {e}")))
}

impl<O: Operation, S: KVStore> Operation for CallHistory<O, S> {
    type Input = O::Input;
    type Output = O::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn call(&self, input: Self::Input) -> crate::Result<Self::Output> {
        let name = self.inner.name();
        let inputs = encode(&input)?;
        self.store.append_to_list(&inputs_key(name), inputs).await?;

        let result = self.inner.call(input).await;

        let output = match &result {
            Ok(output) => encode(output),
            Err(e) => encode(&FailedCall {
                error: e.to_string(),
            }),
        };
        let recorded = match output {
            Ok(output) => self.store.append_to_list(&outputs_key(name), output).await,
            Err(e) => Err(e),
        };
        if let Err(e) = recorded {
            warn!(
                operation = name,
                error = %e,
                "Recording call output failed, outputs log is one entry short"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::in_memory_store::InMemoryStore;

    /// Doubles its input and remembers how often it ran.
    #[derive(Clone, Default)]
    struct Double {
        runs: Arc<AtomicUsize>,
    }

    impl Operation for Double {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &str {
            "Math.double"
        }

        async fn call(&self, input: i64) -> crate::Result<i64> {
            self.runs.fetch_add(1, Ordering::Relaxed);
            Ok(input * 2)
        }
    }

    /// Fails on odd input.
    struct EvenOnly;

    impl Operation for EvenOnly {
        type Input = i64;
        type Output = i64;

        fn name(&self) -> &str {
            "Math.even_only"
        }

        async fn call(&self, input: i64) -> crate::Result<i64> {
            if input % 2 == 0 {
                Ok(input)
            } else {
                Err(Error::Store(format!("{input} is odd")))
            }
        }
    }

    async fn counter(store: &InMemoryStore, name: &str) -> i64 {
        match store.get(name).await.unwrap() {
            Some(raw) => std::str::from_utf8(&raw).unwrap().parse().unwrap(),
            None => 0,
        }
    }

    #[tokio::test]
    async fn test_count_calls() {
        let store = InMemoryStore::new();
        let double = Double::default();
        let op = count_calls(double.clone(), store.clone());
        assert_eq!(op.name(), "Math.double");

        assert_eq!(counter(&store, "Math.double").await, 0);
        for i in 0..5 {
            assert_eq!(op.call(i).await.unwrap(), i * 2);
        }
        assert_eq!(counter(&store, "Math.double").await, 5);
        assert_eq!(double.runs.load(Ordering::Relaxed), 5);

        // counting alone records no history
        assert!(store.read_list(&inputs_key("Math.double")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_history_order() {
        let store = InMemoryStore::new();
        let op = call_history(Double::default(), store.clone());

        for i in [1, 2, 3] {
            op.call(i).await.unwrap();
        }

        let inputs = store.read_list("Math.double:inputs").await.unwrap();
        let outputs = store.read_list("Math.double:outputs").await.unwrap();
        assert_eq!(
            inputs,
            vec![Bytes::from("1"), Bytes::from("2"), Bytes::from("3")]
        );
        assert_eq!(
            outputs,
            vec![Bytes::from("2"), Bytes::from("4"), Bytes::from("6")]
        );

        // recording alone does not count
        assert_eq!(counter(&store, "Math.double").await, 0);
    }

    #[tokio::test]
    async fn test_counter_matches_history() {
        for n in [0, 1, 5, 100] {
            let store = InMemoryStore::new();
            let op = count_calls(call_history(Double::default(), store.clone()), store.clone());

            for i in 0..n {
                op.call(i).await.unwrap();
            }

            assert_eq!(counter(&store, "Math.double").await, n);
            let inputs = store.read_list(&inputs_key("Math.double")).await.unwrap();
            let outputs = store.read_list(&outputs_key("Math.double")).await.unwrap();
            assert_eq!(inputs.len() as i64, n);
            assert_eq!(outputs.len() as i64, n);
        }
    }

    #[tokio::test]
    async fn test_failed_call_keeps_logs_aligned() {
        let store = InMemoryStore::new();
        let op = count_calls(call_history(EvenOnly, store.clone()), store.clone());

        assert_eq!(op.call(2).await.unwrap(), 2);
        let err = op.call(3).await.unwrap_err();
        assert_eq!(err, Error::Store("3 is odd".to_string()));
        assert_eq!(op.call(4).await.unwrap(), 4);

        assert_eq!(counter(&store, "Math.even_only").await, 3);
        let outputs = store.read_list(&outputs_key("Math.even_only")).await.unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(
            outputs[1],
            Bytes::from(r#"{"error":"Store Error - 3 is odd"}"#)
        );
        assert_eq!(outputs[2], Bytes::from("4"));
    }

    #[tokio::test]
    async fn test_operations_are_namespaced() {
        let store = InMemoryStore::new();
        let double = count_calls(Double::default(), store.clone());
        let even = count_calls(EvenOnly, store.clone());

        double.call(1).await.unwrap();
        double.call(2).await.unwrap();
        even.call(2).await.unwrap();

        assert_eq!(counter(&store, "Math.double").await, 2);
        assert_eq!(counter(&store, "Math.even_only").await, 1);
    }

    #[tokio::test]
    async fn test_output_record_failure_keeps_result() {
        let store = InMemoryStore::new();
        // a string under the outputs key makes the append fail
        store
            .set(&outputs_key("Math.double"), Bytes::from("x"))
            .await
            .unwrap();

        let double = Double::default();
        let op = call_history(double.clone(), store.clone());
        assert_eq!(op.call(21).await.unwrap(), 42);
        assert_eq!(double.runs.load(Ordering::Relaxed), 1);
        assert_eq!(
            store.read_list(&inputs_key("Math.double")).await.unwrap(),
            vec![Bytes::from("21")]
        );
    }

    #[tokio::test]
    async fn test_store_failure_skips_the_call() {
        let store = InMemoryStore::new();
        // a list under the counter key makes INCR fail
        store
            .append_to_list("Math.double", Bytes::from("x"))
            .await
            .unwrap();

        let double = Double::default();
        let op = count_calls(double.clone(), store.clone());
        assert!(matches!(op.call(1).await, Err(Error::Store(_))));
        assert_eq!(double.runs.load(Ordering::Relaxed), 0);
    }
}
