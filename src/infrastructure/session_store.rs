use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    secondary: Option<String>,
    value: V,
    expires_at: Instant,
}

/// A concurrent key-value store reachable through two indices.
///
/// Records live in the primary index; the secondary index maps its key to a
/// primary key, so either key resolves to the same record. Records are replaced
/// whole (last write wins) and a reader never observes a half-written record.
/// Every record expires `ttl` after its last `put`; expired records are invisible
/// to reads and reclaimed by [`SessionStore::evict_expired`].
pub struct SessionStore<V> {
    primary: DashMap<String, Arc<Entry<V>>>,
    secondary: DashMap<String, String>,
    ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> SessionStore<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            primary: DashMap::new(),
            secondary: DashMap::new(),
            ttl,
        }
    }

    /// Inserts or replaces the record under `primary`, linking `secondary` to it.
    pub fn put(&self, primary: impl Into<String>, secondary: Option<String>, value: V) {
        let primary = primary.into();
        let entry = Arc::new(Entry {
            secondary: secondary.clone(),
            value,
            expires_at: Instant::now() + self.ttl,
        });

        if let Some(previous) = self.primary.insert(primary.clone(), entry)
            && let Some(old_secondary) = previous.secondary.as_ref()
            && secondary.as_ref() != Some(old_secondary)
        {
            self.secondary
                .remove_if(old_secondary, |_, linked| linked == &primary);
        }

        if let Some(secondary) = secondary {
            self.secondary.insert(secondary, primary);
        }
    }

    pub fn get_by_primary(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.primary
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn get_by_secondary(&self, key: &str) -> Option<V> {
        let primary = self.secondary.get(key).map(|linked| linked.value().clone())?;
        self.get_by_primary(&primary)
    }

    /// Removes the record from both indices, returning it even if it had expired.
    pub fn remove(&self, primary: &str) -> Option<V> {
        let (_, entry) = self.primary.remove(primary)?;
        self.unlink(primary, &entry);
        Some(entry.value.clone())
    }

    pub fn remove_by_secondary(&self, key: &str) -> Option<V> {
        let primary = self.secondary.get(key).map(|linked| linked.value().clone())?;
        self.remove(&primary)
    }

    /// Atomically removes and returns a live record.
    ///
    /// Of several concurrent callers at most one receives the record.
    pub fn take(&self, primary: &str) -> Option<V> {
        let now = Instant::now();
        let (_, entry) = self
            .primary
            .remove_if(primary, |_, entry| entry.expires_at > now)?;
        self.unlink(primary, &entry);
        Some(entry.value.clone())
    }

    pub fn evict_expired(&self) -> Vec<V> {
        self.evict_expired_at(Instant::now())
    }

    /// Removes every record that has expired at `now` and returns them.
    pub fn evict_expired_at(&self, now: Instant) -> Vec<V> {
        let expired: Vec<String> = self
            .primary
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some((_, entry)) = self
                .primary
                .remove_if(&key, |_, entry| entry.expires_at <= now)
            {
                self.unlink(&key, &entry);
                evicted.push(entry.value.clone());
            }
        }
        evicted
    }

    /// Number of records, expired ones included until they are evicted.
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    fn unlink(&self, primary: &str, entry: &Entry<V>) {
        if let Some(secondary) = entry.secondary.as_ref() {
            self.secondary
                .remove_if(secondary, |_, linked| linked == primary);
        }
    }
}
