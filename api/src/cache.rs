//! In-process read cache with sliding expiration.
//!
//! Values are stored type-erased and cloned out on every hit. Entries are never
//! populated from a failed load, and a load that overlaps any invalidation is
//! returned to its caller but not stored, so a completed write is never shadowed
//! by a value read before it.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

pub struct Cache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
    pagination_keys: Mutex<HashMap<&'static str, HashSet<String>>>,
    epoch: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panic while holding the lock cannot leave the maps half-updated
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Cache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            pagination_keys: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value, refreshing its expiry.
    pub fn get<V: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<V> {
        let mut entries = lock(&self.entries);
        let now = Instant::now();
        let entry = entries.get_mut(key)?;
        if entry.expires_at <= now {
            entries.remove(key);
            return None;
        }
        let value = entry.value.downcast_ref::<V>()?.clone();
        entry.expires_at = now + self.ttl;
        Some(value)
    }

    pub fn set<V: Clone + Send + Sync + 'static>(&self, key: &str, value: V) {
        lock(&self.entries).insert(
            key.to_string(),
            Entry {
                value: Arc::new(value),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn get_or_load<V, E, F, Fut>(&self, key: &str, loader: F) -> Result<V, E>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.load_with(key, None, loader, |_| true).await
    }

    /// Like [`Cache::get_or_load`] but absent results are not cached.
    pub async fn get_or_load_some<V, E, F, Fut>(&self, key: &str, loader: F) -> Result<Option<V>, E>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(hit) = self.get::<V>(key) {
            tracing::debug!(key, "cache hit");
            return Ok(Some(hit));
        }
        tracing::debug!(key, "cache miss");

        let epoch = self.epoch.load(Ordering::Acquire);
        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.store_if_current(key, None, value.clone(), epoch);
        }
        Ok(loaded)
    }

    /// Loads one page of a listing family through the cache.
    ///
    /// Empty pages are returned but never stored. A stored page is registered
    /// under `family` in the same critical section that stores it, so a later
    /// [`Cache::sweep_pagination_keys`] always finds it.
    pub async fn load_page<T, E, F, Fut>(
        &self,
        family: &'static str,
        key: &str,
        loader: F,
    ) -> Result<Vec<T>, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        self.load_with(key, Some(family), loader, |page: &Vec<T>| !page.is_empty())
            .await
    }

    async fn load_with<V, E, F, Fut>(
        &self,
        key: &str,
        family: Option<&'static str>,
        loader: F,
        keep: impl FnOnce(&V) -> bool,
    ) -> Result<V, E>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get::<V>(key) {
            tracing::debug!(key, "cache hit");
            return Ok(hit);
        }
        tracing::debug!(key, "cache miss");

        let epoch = self.epoch.load(Ordering::Acquire);
        let value = loader().await?;
        if keep(&value) {
            self.store_if_current(key, family, value.clone(), epoch);
        }
        Ok(value)
    }

    fn store_if_current<V: Clone + Send + Sync + 'static>(
        &self,
        key: &str,
        family: Option<&'static str>,
        value: V,
        epoch: u64,
    ) {
        let mut entries = lock(&self.entries);
        // checked under the entries lock; invalidations bump the epoch while holding it
        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!(key, "discarding load that raced an invalidation");
            return;
        }
        if let Some(family) = family {
            lock(&self.pagination_keys)
                .entry(family)
                .or_default()
                .insert(key.to_string());
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Arc::new(value),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = lock(&self.entries);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        entries.remove(key);
    }

    pub fn invalidate_all<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut entries = lock(&self.entries);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        for key in keys {
            entries.remove(key.as_ref());
        }
    }

    /// Drops every stored page of `family` and forgets their keys.
    pub fn sweep_pagination_keys(&self, family: &'static str) {
        let mut entries = lock(&self.entries);
        let keys = lock(&self.pagination_keys)
            .remove(family)
            .unwrap_or_default();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        for key in &keys {
            entries.remove(key);
        }
        tracing::debug!(family, swept = keys.len(), "sweeping pagination keys");
    }

    pub fn registered_pagination_keys(&self, family: &'static str) -> usize {
        lock(&self.pagination_keys)
            .get(family)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Evicts entries whose sliding window has lapsed, along with their
    /// pagination registrations. Returns how many entries were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = lock(&self.entries);
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let mut families = lock(&self.pagination_keys);
        for keys in families.values_mut() {
            keys.retain(|key| entries.contains_key(key));
        }
        families.retain(|_, keys| !keys.is_empty());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(60);

    async fn load_counted(cache: &Cache, key: &str, calls: &AtomicUsize) -> u32 {
        cache
            .get_or_load(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(7)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let cache = Cache::new(TTL);
        let calls = AtomicUsize::new(0);
        assert_eq!(load_counted(&cache, "k", &calls).await, 7);
        assert_eq!(load_counted(&cache, "k", &calls).await, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn access_slides_the_expiry_window() {
        let cache = Cache::new(TTL);
        cache.set("k", 1u32);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.get::<u32>("k"), Some(1));

        // 90s after insert but only 45s after the last access
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.get::<u32>("k"), Some(1));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get::<u32>("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_lapsed_entries() {
        let cache = Cache::new(TTL);
        cache.set("old", 1u32);
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.set("new", 2u32);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get::<u32>("new"), Some(2));
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let cache = Cache::new(TTL);
        let result: Result<u32, &str> = cache.get_or_load("k", || async { Err("down") }).await;
        assert!(result.is_err());
        assert!(cache.get::<u32>("k").is_none());
    }

    #[tokio::test]
    async fn absent_values_are_not_cached() {
        let cache = Cache::new(TTL);
        let loaded: Option<u32> = cache
            .get_or_load_some("k", || async { Ok::<_, Infallible>(None) })
            .await
            .unwrap();
        assert!(loaded.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn load_racing_an_invalidation_is_not_stored() {
        let cache = Cache::new(TTL);
        let value: u32 = cache
            .get_or_load("k", || async {
                // a writer finishes while this read is in flight
                cache.invalidate("k");
                Ok::<_, Infallible>(1)
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert!(cache.get::<u32>("k").is_none());
    }

    async fn load_page(cache: &Cache, key: &str, rows: Vec<u32>) -> Vec<u32> {
        cache
            .load_page("events", key, || async move { Ok::<_, Infallible>(rows) })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sweep_clears_every_stored_page() {
        let cache = Cache::new(TTL);
        for page in 1..=3 {
            load_page(&cache, &format!("events_page_{page}_size_10"), vec![page]).await;
        }
        cache.set("song_1", 1u32);
        assert_eq!(cache.registered_pagination_keys("events"), 3);

        cache.sweep_pagination_keys("events");

        assert_eq!(cache.registered_pagination_keys("events"), 0);
        assert!(cache.get::<Vec<u32>>("events_page_2_size_10").is_none());
        assert_eq!(cache.get::<u32>("song_1"), Some(1));
    }

    #[tokio::test]
    async fn page_loaded_after_a_sweep_is_registered() {
        let cache = Cache::new(TTL);
        cache.sweep_pagination_keys("events");
        assert_eq!(load_page(&cache, "events_page_1_size_10", vec![1]).await, vec![1]);
        assert_eq!(cache.registered_pagination_keys("events"), 1);

        cache.sweep_pagination_keys("events");

        assert!(cache.get::<Vec<u32>>("events_page_1_size_10").is_none());
    }

    #[tokio::test]
    async fn page_racing_a_sweep_is_neither_stored_nor_registered() {
        let cache = Cache::new(TTL);
        let page = cache
            .load_page("events", "events_page_1_size_10", || async {
                cache.sweep_pagination_keys("events");
                Ok::<_, Infallible>(vec![1u32])
            })
            .await
            .unwrap();
        assert_eq!(page, vec![1]);
        assert!(cache.is_empty());
        assert_eq!(cache.registered_pagination_keys("events"), 0);
    }

    #[tokio::test]
    async fn empty_and_failed_pages_are_not_registered() {
        let cache = Cache::new(TTL);
        for page in 1..=50 {
            load_page(&cache, &format!("events_page_{page}_size_10"), Vec::new()).await;
        }
        let failed: Result<Vec<u32>, &str> = cache
            .load_page("events", "events_page_99_size_10", || async { Err("down") })
            .await;
        assert!(failed.is_err());

        assert_eq!(cache.registered_pagination_keys("events"), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_forgets_registrations_of_lapsed_pages() {
        let cache = Cache::new(TTL);
        load_page(&cache, "events_page_1_size_10", vec![1]).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.registered_pagination_keys("events"), 0);
    }

    #[test]
    fn type_mismatch_reads_as_miss() {
        let cache = Cache::new(TTL);
        cache.set("k", 1u32);
        assert!(cache.get::<String>("k").is_none());
    }
}
