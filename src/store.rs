//! Key-value storage boundary for the posting index.
//!
//! [`Store`] is the narrow surface the posting engine needs: string scalars,
//! append-only lists, member sets, a counter, and batched variants of the
//! hot-path reads and writes. [`MemoryStore`] is the in-process
//! implementation, with postcard snapshots for persistence across runs.
//!
//! Stores assume a single writer; the engine holds the only mutable handle.

use crate::error::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A single mutation, applied atomically as part of a [`Store::write_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set { key: String, value: String },
    ListPush { key: String, values: Vec<String> },
    SetAdd { key: String, member: String },
}

/// The storage operations the posting index is written against.
///
/// Batched methods have element-wise defaults; implementations backed by a
/// networked store would override them with pipelines.
pub trait Store: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Post-increment: returns the counter's current value and bumps it.
    /// Missing counters start at 0.
    fn counter_next(&mut self, key: &str) -> Result<u64>;

    /// Append `values` to the list at `key`, creating it if absent.
    fn list_push(&mut self, key: &str, values: &[String]) -> Result<()>;
    fn list_range(&self, key: &str) -> Result<Vec<String>>;
    fn list_len(&self, key: &str) -> Result<usize>;

    fn set_add(&mut self, key: &str, member: &str) -> Result<()>;
    fn set_members(&self, key: &str) -> Result<Vec<String>>;

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn list_range_many(&self, keys: &[String]) -> Result<Vec<Vec<String>>> {
        keys.iter().map(|key| self.list_range(key)).collect()
    }

    fn list_len_many(&self, keys: &[String]) -> Result<Vec<usize>> {
        keys.iter().map(|key| self.list_len(key)).collect()
    }

    /// Apply every op or none. The in-memory store validates key types up
    /// front so a mid-batch type clash cannot leave a partial write behind.
    fn write_batch(&mut self, ops: Vec<WriteOp>) -> Result<()>;

    /// Drop every key.
    fn flush_all(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Value {
    Scalar(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::List(_) => "list",
            Value::Set(_) => "set",
        }
    }
}

fn wrong_type(key: &str, found: &Value, expected: &str) -> Error {
    Error::Storage(format!(
        "key {key:?} holds a {}, expected {expected}",
        found.kind()
    ))
}

/// In-process [`Store`] over a hash map, snapshot-persisted with postcard.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    entries: AHashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a point-in-time snapshot of every key.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = postcard::to_allocvec(self)
            .map_err(|err| Error::Storage(format!("snapshot encode failed: {err}")))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a snapshot written by [`MemoryStore::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        postcard::from_bytes(&bytes)
            .map_err(|err| Error::Storage(format!("snapshot decode failed: {err}")))
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut Vec<String>> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::List(Vec::new()))
        {
            Value::List(list) => Ok(list),
            other => Err(wrong_type(key, other, "list")),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(BTreeSet::new()))
        {
            Value::Set(set) => Ok(set),
            other => Err(wrong_type(key, other, "set")),
        }
    }

    fn check_op(&self, op: &WriteOp) -> Result<()> {
        let (key, expected) = match op {
            WriteOp::Set { key, .. } => (key, "scalar"),
            WriteOp::ListPush { key, .. } => (key, "list"),
            WriteOp::SetAdd { key, .. } => (key, "set"),
        };
        match self.entries.get(key) {
            None => Ok(()),
            Some(value) if value.kind() == expected => Ok(()),
            // Set overwrites any existing value, matching plain `set`.
            Some(_) if expected == "scalar" => Ok(()),
            Some(value) => Err(wrong_type(key, value, expected)),
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::Scalar(s)) => Ok(Some(s.clone())),
            Some(other) => Err(wrong_type(key, other, "scalar")),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert(key.to_string(), Value::Scalar(value.to_string()));
        Ok(())
    }

    fn counter_next(&mut self, key: &str) -> Result<u64> {
        let current = match self.entries.get(key) {
            None => 0,
            Some(Value::Scalar(s)) => s
                .parse::<u64>()
                .map_err(|_| Error::Storage(format!("counter {key:?} is not numeric: {s:?}")))?,
            Some(other) => return Err(wrong_type(key, other, "scalar")),
        };
        self.entries
            .insert(key.to_string(), Value::Scalar((current + 1).to_string()));
        Ok(current)
    }

    fn list_push(&mut self, key: &str, values: &[String]) -> Result<()> {
        self.list_mut(key)?.extend_from_slice(values);
        Ok(())
    }

    fn list_range(&self, key: &str) -> Result<Vec<String>> {
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(list.clone()),
            Some(other) => Err(wrong_type(key, other, "list")),
        }
    }

    fn list_len(&self, key: &str) -> Result<usize> {
        match self.entries.get(key) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len()),
            Some(other) => Err(wrong_type(key, other, "list")),
        }
    }

    fn set_add(&mut self, key: &str, member: &str) -> Result<()> {
        self.set_mut(key)?.insert(member.to_string());
        Ok(())
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(other) => Err(wrong_type(key, other, "set")),
        }
    }

    fn write_batch(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        for op in &ops {
            self.check_op(op)?;
        }
        for op in ops {
            match op {
                WriteOp::Set { key, value } => self.set(&key, &value)?,
                WriteOp::ListPush { key, values } => self.list_push(&key, &values)?,
                WriteOp::SetAdd { key, member } => self.set_add(&key, &member)?,
            }
        }
        Ok(())
    }

    fn flush_all(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}
