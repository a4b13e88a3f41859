// Sliding windows of recent message ids, keyed by (actor, category).
//
// The original tracked these in plain per-process dicts mutated from every
// handler, with one sleeping task per entry to remove it again. Here the
// windows are owned by one component: entries carry their own expiry deadline,
// reads filter dead entries out, and a periodic purge drops them for real.
// No per-entry timer tasks.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::automod_models::WindowCategory;

/// Composite key for one actor's window in one category.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct WindowKey {
    actor_id: u64,
    category: WindowCategory,
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    message_id: u64,
    expires_at: Instant,
}

/// Per-actor, per-category ordered buffers of message ids with timed expiry.
///
/// **DashMap:**
/// Mutations on one key happen under that key's shard write guard, so
/// concurrent appends for the same `(actor, category)` pair linearize while
/// unrelated keys proceed in parallel. There is deliberately no global lock.
///
/// This is in-memory, per-process state; it does not survive a restart and is
/// not meant to.
pub struct WindowStore {
    windows: DashMap<WindowKey, Vec<WindowEntry>>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Insert a message id at the tail of the actor's window.
    ///
    /// The entry expires `ttl` after insertion. Dead entries at the head are
    /// pruned opportunistically, which keeps appends amortized O(1) as long
    /// as the window duration for a scope stays roughly constant.
    pub fn append(&self, actor_id: u64, category: WindowCategory, message_id: u64, ttl: Duration) {
        let key = WindowKey { actor_id, category };
        let now = Instant::now();

        let mut entries = self.windows.entry(key).or_default();
        while entries.first().is_some_and(|e| e.expires_at <= now) {
            entries.remove(0);
        }
        entries.push(WindowEntry {
            message_id,
            expires_at: now + ttl,
        });
    }

    /// Non-destructive read of the live entries, in arrival order.
    ///
    /// Reflects every `append` that completed before this call; entries past
    /// their deadline are excluded even if the purge sweep has not run yet.
    pub fn snapshot(&self, actor_id: u64, category: WindowCategory) -> Vec<u64> {
        let key = WindowKey { actor_id, category };
        let now = Instant::now();

        self.windows
            .get(&key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.expires_at > now)
                    .map(|e| e.message_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove one entry. A missing entry is a no-op, not an error - explicit
    /// cleanup and expiry race by contract and the loser must not care.
    pub fn evict(&self, actor_id: u64, category: WindowCategory, message_id: u64) {
        let key = WindowKey { actor_id, category };

        if let Some(mut entries) = self.windows.get_mut(&key) {
            if let Some(pos) = entries.iter().position(|e| e.message_id == message_id) {
                entries.remove(pos);
            }
        }
    }

    /// Drop every expired entry and every empty buffer. Called from the
    /// background sweep; reads don't depend on it for correctness.
    pub fn purge_expired(&self) {
        let now = Instant::now();

        self.windows.retain(|_, entries| {
            entries.retain(|e| e.expires_at > now);
            !entries.is_empty()
        });
    }

    /// Number of live keys, for observability.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn snapshot_preserves_arrival_order() {
        let store = WindowStore::new();
        for id in [5, 3, 9] {
            store.append(1, WindowCategory::Message, id, TTL);
        }
        assert_eq!(store.snapshot(1, WindowCategory::Message), vec![5, 3, 9]);
    }

    #[test]
    fn categories_and_actors_are_independent() {
        let store = WindowStore::new();
        store.append(1, WindowCategory::Message, 10, TTL);
        store.append(1, WindowCategory::Attachment, 11, TTL);
        store.append(2, WindowCategory::Message, 12, TTL);

        assert_eq!(store.snapshot(1, WindowCategory::Message), vec![10]);
        assert_eq!(store.snapshot(1, WindowCategory::Attachment), vec![11]);
        assert_eq!(store.snapshot(2, WindowCategory::Message), vec![12]);
    }

    #[tokio::test]
    async fn entries_age_out_of_snapshots() {
        let store = WindowStore::new();
        let ttl = Duration::from_millis(80);

        store.append(1, WindowCategory::Message, 10, ttl);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.snapshot(1, WindowCategory::Message), vec![10]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.snapshot(1, WindowCategory::Message).is_empty());
    }

    #[test]
    fn evict_is_idempotent() {
        let store = WindowStore::new();
        store.append(1, WindowCategory::Message, 10, TTL);
        store.append(1, WindowCategory::Message, 11, TTL);

        store.evict(1, WindowCategory::Message, 10);
        // Second eviction of the same id and an unknown key are both no-ops.
        store.evict(1, WindowCategory::Message, 10);
        store.evict(42, WindowCategory::Attachment, 10);

        assert_eq!(store.snapshot(1, WindowCategory::Message), vec![11]);
    }

    #[tokio::test]
    async fn purge_drops_dead_entries_and_empty_buffers() {
        let store = WindowStore::new();
        store.append(1, WindowCategory::Message, 10, Duration::from_millis(10));
        store.append(2, WindowCategory::Message, 11, TTL);

        tokio::time::sleep(Duration::from_millis(30)).await;
        store.purge_expired();

        assert_eq!(store.tracked_keys(), 1);
        assert_eq!(store.snapshot(2, WindowCategory::Message), vec![11]);
    }

    #[test]
    fn concurrent_appends_on_one_key_lose_nothing() {
        use std::sync::Arc;

        let store = Arc::new(WindowStore::new());
        let mut handles = Vec::new();

        for id in 0..100u64 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.append(1, WindowCategory::Message, id, TTL);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut snapshot = store.snapshot(1, WindowCategory::Message);
        assert_eq!(snapshot.len(), 100);
        snapshot.sort_unstable();
        snapshot.dedup();
        assert_eq!(snapshot.len(), 100, "no duplicate or lost ids");
    }
}
