//! Content Store: the node's in-network cache.

use log::{debug, info};
use rust_icn_common::ndn::{Content, Name};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A cached content object.
#[derive(Debug, Clone)]
pub struct ContentStoreEntry {
    pub content: Content,
    /// Pinned entries are never aged out
    pub static_entry: bool,
    pub last_access: Instant,
}

impl ContentStoreEntry {
    pub fn name(&self) -> &Name {
        &self.content.name
    }
}

#[derive(Debug)]
struct CsState {
    entries: HashMap<Name, ContentStoreEntry>,
    cs_timeout: Duration,
}

/// Exact-match cache keyed by name.
#[derive(Debug)]
pub struct ContentStore {
    state: RwLock<CsState>,
}

impl ContentStore {
    pub fn new(cs_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(CsState {
                entries: HashMap::new(),
                cs_timeout,
            }),
        }
    }

    /// Look up a content object by its exact name.
    pub async fn find_content_object(&self, name: &Name) -> Option<ContentStoreEntry> {
        self.state.read().await.entries.get(name).cloned()
    }

    /// Insert or replace a content object.
    pub async fn add_content_object(&self, content: Content, static_entry: bool) {
        let mut state = self.state.write().await;
        debug!("CS add {} (static: {})", content.name, static_entry);
        state.entries.insert(
            content.name.clone(),
            ContentStoreEntry {
                content,
                static_entry,
                last_access: Instant::now(),
            },
        );
    }

    /// Refresh the access time of an entry after a hit.
    pub async fn update_timestamp(&self, name: &Name) {
        if let Some(entry) = self.state.write().await.entries.get_mut(name) {
            entry.last_access = Instant::now();
        }
    }

    pub async fn remove_content_object(&self, name: &Name) -> Option<ContentStoreEntry> {
        let removed = self.state.write().await.entries.remove(name);
        if removed.is_some() {
            info!("Removed {} from the content store", name);
        }
        removed
    }

    /// Evict every non-static entry idle for longer than the CS timeout.
    ///
    /// Returns the number of evicted entries.
    pub async fn ageing(&self) -> usize {
        let mut state = self.state.write().await;
        let now = Instant::now();
        let timeout = state.cs_timeout;
        let before = state.entries.len();

        state
            .entries
            .retain(|_, e| e.static_entry || now.duration_since(e.last_access) <= timeout);

        let evicted = before - state.entries.len();
        if evicted > 0 {
            debug!("CS ageing evicted {} entries", evicted);
        }
        evicted
    }

    pub async fn set_cs_timeout(&self, timeout: Duration) {
        self.state.write().await.cs_timeout = timeout;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Snapshot of all entries, static ones included.
    pub async fn entries(&self) -> Vec<ContentStoreEntry> {
        self.state.read().await.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_twice_keeps_latest_payload() {
        let cs = ContentStore::new(Duration::from_secs(10));
        cs.add_content_object(Content::new("/test/data", "first"), false).await;
        cs.add_content_object(Content::new("/test/data", "second"), false).await;

        assert_eq!(cs.len().await, 1);
        let entry = cs.find_content_object(&Name::from("/test/data")).await.unwrap();
        assert_eq!(entry.content.payload.as_ref(), b"second");
    }

    #[tokio::test]
    async fn lookup_is_exact() {
        let cs = ContentStore::new(Duration::from_secs(10));
        cs.add_content_object(Content::new("/test/data", "x"), false).await;

        assert!(cs.find_content_object(&Name::from("/test")).await.is_none());
        assert!(cs.find_content_object(&Name::from("/test/data/1")).await.is_none());
        assert!(cs.find_content_object(&Name::from("/test/data")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn ageing_spares_static_entries() {
        let cs = ContentStore::new(Duration::from_secs(2));
        cs.add_content_object(Content::new("/test/data", "HelloWorld"), false).await;
        cs.add_content_object(Content::new("/data/test", "Goodbye"), true).await;

        assert_eq!(cs.ageing().await, 0);
        assert_eq!(cs.len().await, 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cs.ageing().await, 1);

        assert!(cs.find_content_object(&Name::from("/test/data")).await.is_none());
        assert!(cs.find_content_object(&Name::from("/data/test")).await.is_some());

        tokio::time::advance(Duration::from_secs(3600)).await;
        cs.ageing().await;
        assert_eq!(cs.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hit_refreshes_timestamp() {
        let cs = ContentStore::new(Duration::from_secs(2));
        let name = Name::from("/a");
        cs.add_content_object(Content::new("/a", "x"), false).await;

        tokio::time::advance(Duration::from_millis(1500)).await;
        cs.update_timestamp(&name).await;
        tokio::time::advance(Duration::from_millis(1500)).await;

        cs.ageing().await;
        assert!(cs.find_content_object(&name).await.is_some());
    }

    #[tokio::test]
    async fn remove_and_timeout_update() {
        let cs = ContentStore::new(Duration::from_secs(2));
        cs.add_content_object(Content::new("/a", "x"), true).await;
        assert!(cs.remove_content_object(&Name::from("/a")).await.is_some());
        assert!(cs.remove_content_object(&Name::from("/a")).await.is_none());
        assert!(cs.is_empty().await);

        cs.set_cs_timeout(Duration::from_secs(60)).await;
        cs.add_content_object(Content::new("/b", "y"), false).await;
        assert_eq!(cs.entries().await.len(), 1);
    }
}
