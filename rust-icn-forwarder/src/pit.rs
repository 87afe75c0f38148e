//! Pending Interest Table.
//!
//! One entry per name in flight. Entries are records mutated in place
//! under the table lock; callers get clones and re-fetch after a change.

use crate::fib::FibEntry;
use log::{debug, info};
use rust_icn_common::{
    ndn::{Interest, Name},
    types::FaceId,
};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Someone waiting for a name: a face plus whether it is the local application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requester {
    pub face: FaceId,
    pub local_app: bool,
}

impl Requester {
    pub fn network(face: FaceId) -> Self {
        Self {
            face,
            local_app: false,
        }
    }

    pub fn local(face: FaceId) -> Self {
        Self {
            face,
            local_app: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PitEntry {
    pub name: Name,
    pub requesters: Vec<Requester>,
    pub outgoing_faces: Vec<FaceId>,
    /// Kept for retransmission and failover
    pub interest: Option<Interest>,
    pub timestamp: Instant,
    pub retransmits: u32,
    /// Outstanding branches of a fan-out
    pub number_of_forwards: u32,
    pub fib_faces_already_used: Vec<FaceId>,
    pub faces_already_nacked: Vec<FaceId>,
}

impl PitEntry {
    pub fn new(
        name: Name,
        requester: Requester,
        outgoing: FaceId,
        interest: Option<Interest>,
    ) -> Self {
        Self {
            name,
            requesters: vec![requester],
            outgoing_faces: vec![outgoing],
            interest,
            timestamp: Instant::now(),
            retransmits: 0,
            number_of_forwards: 0,
            fib_faces_already_used: Vec::new(),
            faces_already_nacked: Vec::new(),
        }
    }

    /// Faces of all requesters, in arrival order.
    pub fn faceids(&self) -> Vec<FaceId> {
        self.requesters.iter().map(|r| r.face).collect()
    }

    pub fn has_local_requester(&self) -> bool {
        self.requesters.iter().any(|r| r.local_app)
    }

    /// The Interest to re-send, rebuilt from the name if none was stored.
    pub fn interest_or_default(&self) -> Interest {
        self.interest
            .clone()
            .unwrap_or_else(|| Interest::new(self.name.clone()))
    }
}

#[derive(Debug)]
struct PitState {
    entries: Vec<PitEntry>,
    pit_timeout: Duration,
    pit_retransmits: u32,
}

impl PitState {
    fn entry_mut(&mut self, name: &Name) -> Option<&mut PitEntry> {
        self.entries.iter_mut().find(|e| &e.name == name)
    }
}

#[derive(Debug)]
pub struct PendingInterestTable {
    state: RwLock<PitState>,
}

impl PendingInterestTable {
    pub fn new(pit_timeout: Duration, pit_retransmits: u32) -> Self {
        Self {
            state: RwLock::new(PitState {
                entries: Vec::new(),
                pit_timeout,
                pit_retransmits,
            }),
        }
    }

    /// Create an entry, or extend the existing one with whatever of
    /// `requester` and `outgoing` it does not record yet.
    pub async fn add_pit_entry(
        &self,
        name: &Name,
        requester: Requester,
        outgoing: FaceId,
        interest: Option<Interest>,
    ) {
        let mut state = self.state.write().await;

        if let Some(entry) = state.entry_mut(name) {
            if !entry.requesters.contains(&requester) {
                entry.requesters.push(requester);
            }
            if !entry.outgoing_faces.contains(&outgoing) {
                entry.outgoing_faces.push(outgoing);
            }
            if entry.interest.is_none() {
                entry.interest = interest;
            }
            return;
        }

        debug!("PIT add {} from {} towards {}", name, requester.face, outgoing);
        state
            .entries
            .push(PitEntry::new(name.clone(), requester, outgoing, interest));
    }

    pub async fn add_interested_face(&self, name: &Name, face: FaceId, local_app: bool) {
        let requester = Requester { face, local_app };
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            if !entry.requesters.contains(&requester) {
                entry.requesters.push(requester);
            }
        }
    }

    pub async fn add_outgoing_face(&self, name: &Name, face: FaceId) {
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            if !entry.outgoing_faces.contains(&face) {
                entry.outgoing_faces.push(face);
            }
        }
    }

    pub async fn find_pit_entry(&self, name: &Name) -> Option<PitEntry> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .find(|e| &e.name == name)
            .cloned()
    }

    pub async fn remove_pit_entry(&self, name: &Name) -> Option<PitEntry> {
        let mut state = self.state.write().await;
        let idx = state.entries.iter().position(|e| &e.name == name)?;
        Some(state.entries.remove(idx))
    }

    /// Put a detached entry back, replacing any entry with the same name.
    pub async fn append(&self, entry: PitEntry) {
        let mut state = self.state.write().await;
        state.entries.retain(|e| e.name != entry.name);
        state.entries.push(entry);
    }

    /// Mark an entry as fresh: new timestamp, retransmit counter back to zero.
    pub async fn update_timestamp(&self, name: &Name) {
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            entry.timestamp = Instant::now();
            entry.retransmits = 0;
        }
    }

    /// For each face of `fib_entry`, in order, the number of entries under
    /// its prefix that currently use the face as an outgoing face.
    pub async fn occupancy_available_faces_per_name(
        &self,
        fib_entry: &FibEntry,
    ) -> Vec<(FaceId, usize)> {
        let state = self.state.read().await;
        fib_entry
            .faces
            .iter()
            .map(|face| {
                let count = state
                    .entries
                    .iter()
                    .filter(|e| fib_entry.name.is_prefix_of(&e.name))
                    .filter(|e| e.outgoing_faces.contains(face))
                    .count();
                (*face, count)
            })
            .collect()
    }

    pub async fn set_number_of_forwards(&self, name: &Name, forwards: u32) {
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            entry.number_of_forwards = forwards;
        }
    }

    pub async fn increase_number_of_forwards(&self, name: &Name) {
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            entry.number_of_forwards += 1;
        }
    }

    pub async fn decrease_number_of_forwards(&self, name: &Name) {
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            entry.number_of_forwards = entry.number_of_forwards.saturating_sub(1);
        }
    }

    pub async fn add_nacked_faceid(&self, name: &Name, face: FaceId) {
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            if !entry.faces_already_nacked.contains(&face) {
                entry.faces_already_nacked.push(face);
            }
        }
    }

    pub async fn test_faceid_was_nacked(&self, name: &Name, face: FaceId) -> bool {
        self.state
            .read()
            .await
            .entries
            .iter()
            .find(|e| &e.name == name)
            .map_or(false, |e| e.faces_already_nacked.contains(&face))
    }

    pub async fn add_used_fib_face(&self, name: &Name, faces: &[FaceId]) {
        if let Some(entry) = self.state.write().await.entry_mut(name) {
            for face in faces {
                if !entry.fib_faces_already_used.contains(face) {
                    entry.fib_faces_already_used.push(*face);
                }
            }
        }
    }

    pub async fn get_already_used_fib_faces(&self, name: &Name) -> Vec<FaceId> {
        self.find_pit_entry(name)
            .await
            .map(|e| e.fib_faces_already_used)
            .unwrap_or_default()
    }

    /// Split the table into entries to retransmit and entries to drop.
    ///
    /// An entry is dropped once it is older than the PIT timeout and has
    /// used more retransmissions than allowed. Every other entry has its
    /// retransmit counter bumped and is returned for retransmission.
    pub async fn ageing(&self) -> (Vec<PitEntry>, Vec<PitEntry>) {
        let mut guard = self.state.write().await;
        let PitState {
            entries,
            pit_timeout,
            pit_retransmits,
        } = &mut *guard;

        let now = Instant::now();
        let mut retransmit = Vec::new();
        let mut removed = Vec::new();

        entries.retain_mut(|entry| {
            if now.duration_since(entry.timestamp) > *pit_timeout
                && entry.retransmits > *pit_retransmits
            {
                removed.push(entry.clone());
                false
            } else {
                entry.retransmits += 1;
                retransmit.push(entry.clone());
                true
            }
        });

        if !removed.is_empty() {
            info!("PIT ageing removed {} entries", removed.len());
        }
        (retransmit, removed)
    }

    pub async fn set_pit_timeout(&self, timeout: Duration) {
        self.state.write().await.pit_timeout = timeout;
    }

    pub async fn set_pit_retransmits(&self, retransmits: u32) {
        self.state.write().await.pit_retransmits = retransmits;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pit() -> PendingInterestTable {
        PendingInterestTable::new(Duration::from_secs(10), 3)
    }

    #[tokio::test]
    async fn second_requester_and_outgoing_face_are_appended() {
        let pit = pit();
        let name = Name::from("/test/data");
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(15), None)
            .await;
        pit.add_pit_entry(&name, Requester::network(FaceId(2)), FaceId(16), None)
            .await;

        assert_eq!(pit.len().await, 1);
        let entry = pit.find_pit_entry(&name).await.unwrap();
        assert_eq!(entry.faceids(), vec![FaceId(1), FaceId(2)]);
        assert_eq!(entry.outgoing_faces, vec![FaceId(15), FaceId(16)]);
    }

    #[tokio::test]
    async fn duplicate_requester_is_not_recorded_twice() {
        let pit = pit();
        let name = Name::from("/test/data");
        let interest = Interest::new(name.clone());
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(15), Some(interest.clone()))
            .await;
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(16), None)
            .await;
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(16), None)
            .await;

        let entry = pit.find_pit_entry(&name).await.unwrap();
        assert_eq!(entry.faceids(), vec![FaceId(1)]);
        assert_eq!(entry.outgoing_faces, vec![FaceId(15), FaceId(16)]);
        assert_eq!(entry.interest, Some(interest));
    }

    #[tokio::test]
    async fn local_flag_travels_with_its_face() {
        let pit = pit();
        let name = Name::from("/a");
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(2), None)
            .await;
        pit.add_interested_face(&name, FaceId(7), true).await;
        pit.add_interested_face(&name, FaceId(7), true).await;

        let entry = pit.find_pit_entry(&name).await.unwrap();
        assert_eq!(
            entry.requesters,
            vec![Requester::network(FaceId(1)), Requester::local(FaceId(7))]
        );
        assert!(entry.has_local_requester());

        // no entry, no effect
        pit.add_interested_face(&Name::from("/b"), FaceId(3), false).await;
        assert_eq!(pit.len().await, 1);
    }

    #[tokio::test]
    async fn occupancy_counts_entries_under_prefix() {
        let pit = pit();
        let fib_entry = FibEntry {
            name: Name::from("/a/b"),
            faces: vec![FaceId(1), FaceId(2), FaceId(3)],
            static_entry: false,
        };
        for (name, face) in [("/a/b/x", 1), ("/a/b/y", 1), ("/a/b/z", 2), ("/c/d", 3)] {
            pit.add_pit_entry(&Name::from(name), Requester::network(FaceId(10)), FaceId(face), None)
                .await;
        }

        let occupancy = pit.occupancy_available_faces_per_name(&fib_entry).await;
        assert_eq!(
            occupancy,
            vec![(FaceId(1), 2), (FaceId(2), 1), (FaceId(3), 0)]
        );
    }

    #[tokio::test]
    async fn forwards_nacks_and_used_faces() {
        let pit = pit();
        let name = Name::from("/a");
        assert!(!pit.test_faceid_was_nacked(&name, FaceId(2)).await);

        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(2), None)
            .await;
        pit.increase_number_of_forwards(&name).await;
        pit.increase_number_of_forwards(&name).await;
        pit.decrease_number_of_forwards(&name).await;
        assert_eq!(pit.find_pit_entry(&name).await.unwrap().number_of_forwards, 1);
        pit.set_number_of_forwards(&name, 0).await;
        pit.decrease_number_of_forwards(&name).await;
        assert_eq!(pit.find_pit_entry(&name).await.unwrap().number_of_forwards, 0);

        pit.add_nacked_faceid(&name, FaceId(2)).await;
        assert!(pit.test_faceid_was_nacked(&name, FaceId(2)).await);
        assert!(!pit.test_faceid_was_nacked(&name, FaceId(3)).await);

        pit.add_used_fib_face(&name, &[FaceId(2), FaceId(3)]).await;
        pit.add_used_fib_face(&name, &[FaceId(2)]).await;
        assert_eq!(
            pit.get_already_used_fib_faces(&name).await,
            vec![FaceId(2), FaceId(3)]
        );
    }

    #[tokio::test]
    async fn remove_and_append() {
        let pit = pit();
        let name = Name::from("/a");
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(2), None)
            .await;

        let mut entry = pit.remove_pit_entry(&name).await.unwrap();
        assert!(pit.is_empty().await);
        assert!(pit.remove_pit_entry(&name).await.is_none());

        entry.requesters.push(Requester::network(FaceId(5)));
        pit.append(entry.clone()).await;
        pit.append(entry).await;
        assert_eq!(pit.len().await, 1);
        assert_eq!(
            pit.find_pit_entry(&name).await.unwrap().faceids(),
            vec![FaceId(1), FaceId(5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ageing_retransmits_until_budget_then_removes() {
        let pit = PendingInterestTable::new(Duration::from_secs(2), 2);
        let name = Name::from("/test/data");
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(2), None)
            .await;

        let (retransmit, removed) = pit.ageing().await;
        assert_eq!(retransmit.len(), 1);
        assert!(removed.is_empty());
        pit.ageing().await;

        tokio::time::advance(Duration::from_secs(3)).await;

        // retransmits == budget: one more retransmission
        let (retransmit, removed) = pit.ageing().await;
        assert_eq!(retransmit.len(), 1);
        assert_eq!(retransmit[0].retransmits, 3);
        assert!(removed.is_empty());

        let (retransmit, removed) = pit.ageing().await;
        assert!(retransmit.is_empty());
        assert_eq!(removed.len(), 1);
        assert!(pit.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn young_entry_is_never_removed() {
        let pit = PendingInterestTable::new(Duration::from_secs(10), 0);
        let name = Name::from("/a");
        pit.add_pit_entry(&name, Requester::network(FaceId(1)), FaceId(2), None)
            .await;

        for _ in 0..5 {
            pit.ageing().await;
        }
        assert_eq!(pit.len().await, 1);

        pit.update_timestamp(&name).await;
        assert_eq!(pit.find_pit_entry(&name).await.unwrap().retransmits, 0);

        pit.set_pit_timeout(Duration::from_secs(1)).await;
        pit.set_pit_retransmits(0).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        pit.ageing().await;
        assert_eq!(pit.len().await, 1);
        let (_, removed) = pit.ageing().await;
        assert_eq!(removed.len(), 1);
    }
}
