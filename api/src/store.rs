//! Storage gateway: a thin contract over collections of JSON documents.
//!
//! Callers never retry; any failure is surfaced as [`StoreError`] to whoever
//! issued the enclosing command.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub const EVENTS: &str = "events";
pub const SONGS: &str = "songs";
pub const PLAYS: &str = "song_plays";
pub const USERS: &str = "users";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("document {id} already exists in {collection}")]
    Duplicate { collection: String, id: String },

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document selector.
#[derive(Debug, Clone)]
pub enum Filter {
    All,
    Id(String),
    /// JSON containment, the same rule as Postgres `@>`.
    Matches(Value),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Filter::Id(id.into())
    }

    pub fn matches(&self, id: &str, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(want) => want == id,
            Filter::Matches(pattern) => contains(doc, pattern),
        }
    }
}

/// Returns true if every part of `pattern` is present in `doc`.
pub fn contains(doc: &Value, pattern: &Value) -> bool {
    match (doc, pattern) {
        (Value::Object(doc), Value::Object(pattern)) => pattern
            .iter()
            .all(|(key, want)| doc.get(key).is_some_and(|have| contains(have, want))),
        (Value::Array(doc), Value::Array(pattern)) => pattern
            .iter()
            .all(|want| doc.iter().any(|have| contains(have, want))),
        (doc, pattern) => doc == pattern,
    }
}

/// Anything stored in a collection carries its own identity.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Value>>;

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> StoreResult<()>;

    /// Whole-document replace of the first match. Returns whether anything changed.
    async fn replace(&self, collection: &str, filter: &Filter, doc: Value) -> StoreResult<bool>;

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Skip/limit listing in insertion order. `page` is 1-based.
    async fn paginate(
        &self,
        collection: &str,
        filter: &Filter,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Value>>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Groups documents by the string value of a top-level field and counts them.
    /// Documents without the field are skipped.
    async fn group_count(&self, collection: &str, field: &str) -> StoreResult<HashMap<String, u64>>;

    /// Atomic read-check-write of a single document.
    ///
    /// `apply` sees the current document and returns true to persist its edits;
    /// no other writer can interleave between the read and the write. Returns
    /// false without calling `apply` when the document does not exist.
    async fn modify(
        &self,
        collection: &str,
        id: &str,
        apply: &mut (dyn for<'v> FnMut(&'v mut Value) -> bool + Send),
    ) -> StoreResult<bool>;
}

fn decode<T: DeserializeOwned>(doc: Value) -> StoreResult<T> {
    Ok(serde_json::from_value(doc)?)
}

/// Typed view of one collection.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    name: &'static str,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            _doc: PhantomData,
        }
    }
}

impl<T: Document> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>, name: &'static str) -> Self {
        Self {
            store,
            name,
            _doc: PhantomData,
        }
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<T>> {
        self.find_one(&Filter::id(id)).await
    }

    pub async fn find(&self, filter: &Filter) -> StoreResult<Vec<T>> {
        self.store
            .find(self.name, filter)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> StoreResult<Option<T>> {
        self.store.find_one(self.name, filter).await?.map(decode).transpose()
    }

    pub async fn insert(&self, doc: &T) -> StoreResult<()> {
        self.store
            .insert(self.name, doc.id(), serde_json::to_value(doc)?)
            .await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<u64> {
        self.store.delete(self.name, &Filter::id(id)).await
    }

    pub async fn paginate(&self, page: u32, page_size: u32) -> StoreResult<Vec<T>> {
        self.store
            .paginate(self.name, &Filter::All, page, page_size)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        self.store.count(self.name, filter).await
    }

    pub async fn group_count(&self, field: &str) -> StoreResult<HashMap<String, u64>> {
        self.store.group_count(self.name, field).await
    }

    /// Runs `f` against the stored document inside one atomic update.
    ///
    /// The edit is persisted only when `f` returns `Ok`. Returns `Ok(None)` if
    /// the document does not exist.
    pub async fn update<R, E, F>(&self, id: &str, f: F) -> Result<Option<R>, E>
    where
        F: FnOnce(&mut T) -> Result<R, E> + Send,
        R: Send,
        E: From<StoreError> + Send,
    {
        let mut f = Some(f);
        let mut outcome: Option<Result<R, E>> = None;

        let mut apply = |doc: &mut Value| -> bool {
            let Some(f) = f.take() else {
                return false;
            };
            let mut typed: T = match decode(doc.clone()) {
                Ok(typed) => typed,
                Err(e) => {
                    outcome = Some(Err(e.into()));
                    return false;
                }
            };
            match f(&mut typed) {
                Ok(result) => match serde_json::to_value(&typed) {
                    Ok(updated) => {
                        *doc = updated;
                        outcome = Some(Ok(result));
                        true
                    }
                    Err(e) => {
                        outcome = Some(Err(StoreError::from(e).into()));
                        false
                    }
                },
                Err(e) => {
                    outcome = Some(Err(e));
                    false
                }
            }
        };

        let found = self.store.modify(self.name, id, &mut apply).await?;
        if !found {
            return Ok(None);
        }
        match outcome {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }
}
