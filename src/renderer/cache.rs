use color_eyre::eyre::eyre;
use color_eyre::{Report, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

/// How a cache entry keeps its value alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Entry lives while someone outside the cache holds the value
    Weak,
    /// Entry lives until purged
    Strong,
}

enum Cached<V> {
    Weak(Weak<V>),
    Strong(Arc<V>),
}

impl<V> Cached<V> {
    fn new(value: &Arc<V>, retention: Retention) -> Self {
        match retention {
            Retention::Weak => Self::Weak(Arc::downgrade(value)),
            Retention::Strong => Self::Strong(value.clone()),
        }
    }

    fn get(&self) -> Option<Arc<V>> {
        match self {
            Self::Weak(weak) => weak.upgrade(),
            Self::Strong(strong) => Some(strong.clone()),
        }
    }
}

type Entry<V> = Arc<OnceLock<std::result::Result<Cached<V>, String>>>;

/// Keyed compute-once cache. Concurrent requests for one key run the creator
/// exactly once; the others block on the entry until it is filled.
pub struct SingleFlightCache<K, V> {
    name: &'static str,
    retention: Retention,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Hash + Eq + Clone, V> SingleFlightCache<K, V> {
    pub fn new(name: &'static str, retention: Retention) -> Self {
        Self {
            name,
            retention,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_or_create(
        &self,
        key: &K,
        create: impl FnOnce() -> Result<Arc<V>>,
    ) -> Result<Arc<V>> {
        let mut create = Some(create);

        loop {
            let entry = self.lock().entry(key.clone()).or_default().clone();

            let mut created = None;
            let mut failure: Option<Report> = None;
            let state = entry.get_or_init(|| {
                let Some(create) = create.take() else {
                    return Err(format!("{} creator already consumed", self.name));
                };
                match create() {
                    Ok(value) => {
                        let cached = Cached::new(&value, self.retention);
                        created = Some(value);
                        Ok(cached)
                    }
                    Err(e) => {
                        let message = e.to_string();
                        failure = Some(e);
                        Err(message)
                    }
                }
            });

            if let Some(value) = created {
                log::debug!("{} cache miss, created new entry", self.name);
                return Ok(value);
            }

            match state {
                Ok(cached) => {
                    if let Some(value) = cached.get() {
                        return Ok(value);
                    }
                    // Expired, drop the dead entry and compile again
                    self.remove_entry(key, &entry);
                    if create.is_none() {
                        return Err(eyre!("{} entry expired while being created", self.name));
                    }
                }
                Err(message) => {
                    self.remove_entry(key, &entry);
                    return Err(failure.unwrap_or_else(|| {
                        eyre!("{} creation failed: {}", self.name, message)
                    }));
                }
            }
        }
    }

    fn remove_entry(&self, key: &K, entry: &Entry<V>) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            entries.remove(key);
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let entry = self.lock().get(key)?.clone();
        entry.get()?.as_ref().ok()?.get()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops finished entries nobody outside the cache is using. Returns how many went.
    pub fn purge_unused(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| match entry.get() {
            None => true,
            Some(Err(_)) => false,
            Some(Ok(Cached::Weak(weak))) => weak.strong_count() > 0,
            Some(Ok(Cached::Strong(strong))) => Arc::strong_count(strong) > 1,
        });
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_requests_compile_once() {
        let cache = Arc::new(SingleFlightCache::<u64, String>::new("test", Retention::Weak));
        let compiles = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let compiles = compiles.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_create(&42, || {
                            compiles.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(Arc::new("compiled".to_string()))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<String>> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn weak_entries_expire_with_their_last_user() {
        let cache = SingleFlightCache::<&str, u32>::new("test", Retention::Weak);
        let first = cache.get_or_create(&"a", || Ok(Arc::new(1))).unwrap();
        assert_eq!(cache.get(&"a").as_deref(), Some(&1));
        drop(first);
        assert!(cache.get(&"a").is_none());

        let second = cache.get_or_create(&"a", || Ok(Arc::new(2))).unwrap();
        assert_eq!(*second, 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = SingleFlightCache::<&str, u32>::new("test", Retention::Strong);
        assert!(cache.get_or_create(&"bad", || Err(eyre!("missing"))).is_err());
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_create(&"bad", || Ok(Arc::new(7))).unwrap(), 7);
    }

    #[test]
    fn purge_drops_strong_entries_only_the_cache_holds() {
        let cache = SingleFlightCache::<&str, u32>::new("test", Retention::Strong);
        let kept = cache.get_or_create(&"kept", || Ok(Arc::new(1))).unwrap();
        drop(cache.get_or_create(&"dropped", || Ok(Arc::new(2))).unwrap());

        assert_eq!(cache.purge_unused(), 1);
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&kept, &cache.get(&"kept").unwrap()));
    }
}
