use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::Error;
use crate::instrument::{inputs_key, outputs_key};
use crate::store::KVStore;

/// The recorded calls of one operation, read back with [replay].
///
/// Inputs and outputs are paired by position. Iterating does not touch the store and can be
/// repeated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    name: String,
    calls: u64,
    inputs: Vec<Bytes>,
    outputs: Vec<Bytes>,
}

/// A single recorded call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Invocation<'a> {
    /// 1-based position in call order.
    pub index: usize,
    pub name: &'a str,
    pub inputs: &'a [u8],
    pub output: &'a [u8],
}

impl Invocation<'_> {
    pub fn inputs_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.inputs)
    }

    pub fn output_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.output)
    }

    /// Deserialize the recorded inputs back into `T`.
    pub fn decode_inputs<T: DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_slice(self.inputs)
            .map_err(|e| Error::Serialization(format!("Decoding inputs of call {}: {e}", self.index)))
    }

    /// Deserialize the recorded output back into `T`.
    pub fn decode_output<T: DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_slice(self.output)
            .map_err(|e| Error::Serialization(format!("Decoding output of call {}: {e}", self.index)))
    }
}

impl fmt::Display for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}",
            self.name,
            self.inputs_text(),
            self.output_text()
        )
    }
}

impl History {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the call counter. Falls back to the number of recorded calls when the operation
    /// was recorded without being counted.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Number of (input, output) pairs.
    pub fn len(&self) -> usize {
        self.inputs.len().min(self.outputs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Invocation<'_>> + '_ {
        self.inputs
            .iter()
            .zip(self.outputs.iter())
            .enumerate()
            .map(|(i, (inputs, output))| Invocation {
                index: i + 1,
                name: &self.name,
                inputs,
                output,
            })
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = Invocation<'a>;
    type IntoIter = Box<dyn Iterator<Item = Invocation<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} was called {} times:", self.name, self.calls)?;
        for invocation in self {
            write!(f, "\n{invocation}")?;
        }
        Ok(())
    }
}

/// Read the call counter and the call history of `name`.
///
/// An operation that was never called yields an empty [History] with zero calls.
pub async fn replay<S: KVStore>(store: &S, name: &str) -> crate::Result<History> {
    let counter = store.get(name).await?;
    let inputs = store.read_list(&inputs_key(name)).await?;
    let outputs = store.read_list(&outputs_key(name)).await?;

    if inputs.len() != outputs.len() {
        warn!(
            operation = name,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "Call history logs have different lengths, extra entries are ignored"
        );
    }

    let calls = match counter {
        Some(raw) => std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::Store(format!(
                    "Call counter {name} holds a non-integer value: {:?}",
                    String::from_utf8_lossy(&raw)
                ))
            })?,
        None => inputs.len().min(outputs.len()) as u64,
    };

    Ok(History {
        name: name.to_string(),
        calls,
        inputs,
        outputs,
    })
}
