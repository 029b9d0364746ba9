//! In-memory [`KvStore`] implementation.
//!
//! [`InMemoryStore`] keeps hashes, lists, and sorted sets in a [`DashMap`]
//! and reproduces the Redis behaviour the job index relies on: negative
//! range indices, score-then-member ordering, empty collections vanishing,
//! and wrong-type errors. It backs single-process deployments and the test
//! suite.
//!
//! Two hooks exist for exercising failure paths: [`set_available`]
//! makes every command fail with [`StoreError::Unavailable`], and
//! [`op_count`] reports how many commands were issued.
//!
//! [`set_available`]: InMemoryStore::set_available
//! [`op_count`]: InMemoryStore::op_count

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{resolve_range, KvStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    SortedSet(HashMap<String, f64>),
}

/// Thread-safe in-memory key-value store.
///
/// # Examples
///
/// ```
/// use jobtrack::store::memory::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// assert!(store.is_empty());
/// assert_eq!(store.op_count(), 0);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    data: DashMap<String, Value>,
    available: AtomicBool,
    ops: AtomicUsize,
}

impl InMemoryStore {
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            available: AtomicBool::new(true),
            ops: AtomicUsize::new(0),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if `key` holds any value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Toggles simulated reachability. While unavailable every command fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of commands issued so far, including failed ones.
    pub fn op_count(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store marked unavailable"))
        }
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }

    /// Drops `key` if the collection it holds became empty.
    fn drop_if_empty(&self, key: &str) {
        self.data.remove_if(key, |_, value| match value {
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        });
    }

    fn push(&self, key: &str, value: &str, front: bool) -> Result<usize, StoreError> {
        self.begin()?;
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        match entry.value_mut() {
            Value::List(list) => {
                if front {
                    list.push_front(value.to_string());
                } else {
                    list.push_back(value.to_string());
                }
                Ok(list.len())
            },
            _ => Err(Self::wrong_type(key)),
        }
    }

    fn sorted_members(set: &HashMap<String, f64>) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> =
            set.iter().map(|(m, s)| (m.clone(), *s)).collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.begin()?;
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry.value_mut() {
            Value::Hash(hash) => {
                for (field, value) in fields {
                    hash.insert((*field).to_string(), value.clone());
                }
                Ok(())
            },
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.begin()?;
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        match entry.value_mut() {
            Value::Hash(hash) => {
                if hash.contains_key(field) {
                    Ok(false)
                } else {
                    hash.insert(field.to_string(), value.to_string());
                    Ok(true)
                }
            },
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.begin()?;
        match self.data.get(key).as_deref() {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.begin()?;
        match self.data.get(key).as_deref() {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.push(key, value, false)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.push(key, value, true)
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.begin()?;
        match self.data.get(key).as_deref() {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(resolve_range(list.len(), start, stop)
                .map(|(from, to)| list.range(from..to).cloned().collect())
                .unwrap_or_default()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        self.begin()?;
        if let Some(mut entry) = self.data.get_mut(key) {
            match entry.value_mut() {
                Value::List(list) => match resolve_range(list.len(), start, stop) {
                    Some((from, to)) => {
                        list.truncate(to);
                        list.drain(..from);
                    },
                    None => list.clear(),
                },
                _ => return Err(Self::wrong_type(key)),
            }
        }
        self.drop_if_empty(key);
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<usize, StoreError> {
        self.begin()?;
        Ok(keys
            .iter()
            .filter(|key| self.data.remove(**key).is_some())
            .count())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.begin()?;
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(HashMap::new()));
        match entry.value_mut() {
            Value::SortedSet(set) => {
                set.insert(member.to_string(), score);
                Ok(())
            },
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.begin()?;
        let removed = match self.data.get_mut(key) {
            None => false,
            Some(mut entry) => match entry.value_mut() {
                Value::SortedSet(set) => set.remove(member).is_some(),
                _ => return Err(Self::wrong_type(key)),
            },
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.begin()?;
        match self.data.get(key).as_deref() {
            None => Ok(Vec::new()),
            Some(Value::SortedSet(set)) => {
                let members = Self::sorted_members(set);
                Ok(resolve_range(members.len(), start, stop)
                    .map(|(from, to)| members[from..to].to_vec())
                    .unwrap_or_default())
            },
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        self.begin()?;
        match self.data.get(key).as_deref() {
            None => Ok(0),
            Some(Value::SortedSet(set)) => Ok(set.len()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }
}
