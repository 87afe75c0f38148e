//! Forwarding Information Base.
//!
//! Routes are kept in search order: the most recently added entry is
//! evaluated first. Lookups walk the name from its full length down to a
//! single component and never match the empty prefix.

use log::{debug, info};
use rust_icn_common::{ndn::Name, types::FaceId};
use tokio::sync::RwLock;

/// A route: prefix plus ordered outgoing faces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibEntry {
    pub name: Name,
    pub faces: Vec<FaceId>,
    /// Static entries survive `clear()`
    pub static_entry: bool,
}

#[derive(Debug, Default)]
pub struct ForwardingInformationBase {
    entries: RwLock<Vec<FibEntry>>,
}

impl ForwardingInformationBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route in front of the search order.
    ///
    /// Entries with the same prefix are not merged; an entry identical in
    /// prefix and faces to an existing one is not added again.
    pub async fn add_fib_entry(&self, name: Name, faces: Vec<FaceId>, static_entry: bool) {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.name == name && e.faces == faces) {
            debug!("FIB already holds {} -> {:?}", name, faces);
            return;
        }

        info!("Added route for prefix {} to faces {:?}", name, faces);
        entries.insert(
            0,
            FibEntry {
                name,
                faces,
                static_entry,
            },
        );
    }

    /// Longest-prefix match with face exclusion.
    ///
    /// Returns the first entry whose prefix matches and which still has a
    /// face outside both exclusion lists. The returned entry only lists
    /// those admissible faces.
    pub async fn find_fib_entry(
        &self,
        name: &Name,
        already_used: &[FaceId],
        incoming: &[FaceId],
    ) -> Option<FibEntry> {
        let entries = self.entries.read().await;

        for len in (1..=name.len()).rev() {
            let prefix = name.prefix(len);
            for entry in entries.iter().filter(|e| e.name == prefix) {
                let faces: Vec<FaceId> = entry
                    .faces
                    .iter()
                    .filter(|f| !already_used.contains(*f) && !incoming.contains(*f))
                    .copied()
                    .collect();

                if !faces.is_empty() {
                    return Some(FibEntry {
                        name: entry.name.clone(),
                        faces,
                        static_entry: entry.static_entry,
                    });
                }
            }
        }

        None
    }

    /// Remove every entry with exactly this prefix.
    pub async fn remove_fib_entry(&self, name: &Name) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| &e.name != name);
        let removed = before - entries.len();
        if removed > 0 {
            info!("Removed route for prefix {}", name);
        }
        removed
    }

    /// Drop all non-static routes.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.static_entry);
        info!("FIB cleared, {} static routes kept", entries.len());
    }

    /// Snapshot in search order.
    pub async fn entries(&self) -> Vec<FibEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
