use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::{DocumentStore, Filter, StoreError, StoreResult};

/// Process-local document store. Used when no database is configured and in tests.
///
/// Each collection keeps insertion order so pagination matches the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<(String, Value)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(id, doc)| filter.matches(id, doc))
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(id, doc)| filter.matches(id, doc))
                .map(|(_, doc)| doc.clone())
        }))
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|(existing, _)| existing == id) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.push((id.to_string(), doc));
        Ok(())
    }

    async fn replace(&self, collection: &str, filter: &Filter, doc: Value) -> StoreResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        match docs.iter_mut().find(|(id, existing)| filter.matches(id, existing)) {
            Some((_, existing)) => {
                let modified = *existing != doc;
                *existing = doc;
                Ok(modified)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|(id, doc)| !filter.matches(id, doc));
        Ok((before - docs.len()) as u64)
    }

    async fn paginate(
        &self,
        collection: &str,
        filter: &Filter,
        page: u32,
        page_size: u32,
    ) -> StoreResult<Vec<Value>> {
        let skip = page.saturating_sub(1) as usize * page_size as usize;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(id, doc)| filter.matches(id, doc))
                    .skip(skip)
                    .take(page_size as usize)
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|(id, doc)| filter.matches(id, doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn group_count(
        &self,
        collection: &str,
        field: &str,
    ) -> StoreResult<HashMap<String, u64>> {
        let collections = self.collections.read().await;
        let mut groups: HashMap<String, u64> = HashMap::new();
        if let Some(docs) = collections.get(collection) {
            for key in docs
                .iter()
                .filter_map(|(_, doc)| doc.get(field).and_then(Value::as_str))
            {
                *groups.entry(key.to_string()).or_insert(0) += 1;
            }
        }
        Ok(groups)
    }

    async fn modify(
        &self,
        collection: &str,
        id: &str,
        apply: &mut (dyn for<'v> FnMut(&'v mut Value) -> bool + Send),
    ) -> StoreResult<bool> {
        let mut collections = self.collections.write().await;
        let Some((_, stored)) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|(existing, _)| existing == id))
        else {
            return Ok(false);
        };

        let mut working = stored.clone();
        if apply(&mut working) {
            *stored = working;
        }
        Ok(true)
    }
}
