//! Forwarding engine (ICN layer).
//!
//! Ties the Content Store, FIB and PIT together. Packets come in from the
//! network ("lower") or from the local application ("higher") tagged with
//! a face id; every handler answers with zero or more `(face, packet)`
//! pairs on the outbound channels.

use crate::{
    cs::ContentStore,
    fib::{FibEntry, ForwardingInformationBase},
    pit::{PendingInterestTable, PitEntry, Requester},
};
use log::{debug, info, warn};
use rust_icn_common::{
    metrics::ForwarderMetrics,
    ndn::{Content, Interest, Nack, NackReason, Packet},
    types::FaceId,
    Error, Result,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Outbound half of a face-indexed channel.
pub type FaceSender = mpsc::UnboundedSender<(FaceId, Packet)>;

/// Inbound half of a face-indexed channel.
pub type FaceReceiver = mpsc::UnboundedReceiver<(FaceId, Packet)>;

/// What the link layer hands to the forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerFrame {
    /// A decoded `[face, packet]` pair
    Packet(FaceId, Packet),
    /// The decoder could not produce a `[face, packet]` pair
    Malformed(String),
}

impl From<(FaceId, Packet)> for LowerFrame {
    fn from((face, packet): (FaceId, Packet)) -> Self {
        LowerFrame::Packet(face, packet)
    }
}

/// Where a packet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lower,
    Higher,
}

/// The forwarding engine of one node. Cheap to clone; clones share tables.
#[derive(Clone)]
pub struct IcnLayer {
    cs: Arc<ContentStore>,
    fib: Arc<ForwardingInformationBase>,
    pit: Arc<PendingInterestTable>,
    metrics: Arc<ForwarderMetrics>,
    to_lower: FaceSender,
    to_higher: FaceSender,
    interest_to_app: Arc<AtomicBool>,
}

impl IcnLayer {
    pub fn new(
        cs: Arc<ContentStore>,
        fib: Arc<ForwardingInformationBase>,
        pit: Arc<PendingInterestTable>,
        metrics: Arc<ForwarderMetrics>,
        to_lower: FaceSender,
        to_higher: FaceSender,
    ) -> Self {
        Self {
            cs,
            fib,
            pit,
            metrics,
            to_lower,
            to_higher,
            interest_to_app: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hand unmatched network Interests to the local application.
    pub fn set_interest_to_app(&self, enabled: bool) {
        info!("Interest-to-app mode {}", if enabled { "on" } else { "off" });
        self.interest_to_app.store(enabled, Ordering::Relaxed);
    }

    pub fn interest_to_app(&self) -> bool {
        self.interest_to_app.load(Ordering::Relaxed)
    }

    pub fn cs(&self) -> &Arc<ContentStore> {
        &self.cs
    }

    pub fn fib(&self) -> &Arc<ForwardingInformationBase> {
        &self.fib
    }

    pub fn pit(&self) -> &Arc<PendingInterestTable> {
        &self.pit
    }

    pub fn metrics(&self) -> &Arc<ForwarderMetrics> {
        &self.metrics
    }

    /* ---------------------------------------------------------------- *
     * Dispatch
     * ---------------------------------------------------------------- */

    pub async fn handle_from_lower(&self, frame: LowerFrame) -> Result<()> {
        let (face, packet) = match frame {
            LowerFrame::Packet(face, packet) => (face, packet),
            LowerFrame::Malformed(reason) => {
                self.metrics.malformed_frames.increment();
                warn!("Dropping frame from lower layer: {}", Error::MalformedEnvelope(reason));
                return Ok(());
            }
        };

        debug!("Received {} from lower on {}", packet, face);
        let result = match packet {
            Packet::Interest(interest) => self.handle_interest_from_lower(face, interest).await,
            Packet::Content(content) => self.handle_content(face, content, Side::Lower).await,
            Packet::Nack(nack) => self.handle_nack(face, nack, Side::Lower).await,
        };
        self.update_pit_gauge().await;
        result
    }

    pub async fn handle_from_higher(&self, face: FaceId, packet: Packet) -> Result<()> {
        debug!("Received {} from higher on {}", packet, face);
        let result = match packet {
            Packet::Interest(interest) => self.handle_interest_from_higher(face, interest).await,
            Packet::Content(content) => self.handle_content(face, content, Side::Higher).await,
            Packet::Nack(nack) => self.handle_nack(face, nack, Side::Higher).await,
        };
        self.update_pit_gauge().await;
        result
    }

    /* ---------------------------------------------------------------- *
     * Interest
     * ---------------------------------------------------------------- */

    async fn handle_interest_from_lower(&self, face: FaceId, interest: Interest) -> Result<()> {
        self.metrics.interests_from_lower.increment();
        let name = interest.name.clone();

        if let Some(entry) = self.cs.find_content_object(&name).await {
            debug!("{} found in content store", name);
            self.metrics.cs_hits.increment();
            self.send_lower(face, entry.content.into())?;
            self.cs.update_timestamp(&name).await;
            return Ok(());
        }

        if self.pit.find_pit_entry(&name).await.is_some() {
            debug!("{} found in PIT, appending {}", name, face);
            self.metrics.pit_aggregations.increment();
            self.pit.update_timestamp(&name).await;
            self.pit.add_interested_face(&name, face, false).await;
            return Ok(());
        }

        if self.interest_to_app() {
            debug!("Handing {} to the application", name);
            self.metrics.interests_to_app.increment();
            self.pit
                .add_pit_entry(&name, Requester::network(face), FaceId::LOCAL_APP, Some(interest.clone()))
                .await;
            return self.send_higher(face, interest.into());
        }

        match self.fib.find_fib_entry(&name, &[], &[face]).await {
            Some(fib_entry) => {
                self.forward_to_least_occupied(&fib_entry, Requester::network(face), interest)
                    .await
            }
            None => {
                debug!("No FIB entry for {}, sending Nack to {}", name, face);
                let nack = Nack::new(name, NackReason::NoRoute, Some(interest));
                self.metrics.nacks_sent.increment();
                self.send_lower(face, nack.into())
            }
        }
    }

    async fn handle_interest_from_higher(&self, face: FaceId, interest: Interest) -> Result<()> {
        self.metrics.interests_from_higher.increment();
        let name = interest.name.clone();

        if let Some(entry) = self.cs.find_content_object(&name).await {
            debug!("{} found in content store", name);
            self.metrics.cs_hits.increment();
            self.send_higher(face, entry.content.into())?;
            self.cs.update_timestamp(&name).await;
            return Ok(());
        }

        let pending = match self.pit.find_pit_entry(&name).await {
            Some(_) => {
                self.metrics.pit_aggregations.increment();
                self.pit.add_interested_face(&name, face, true).await;
                self.pit.find_pit_entry(&name).await
            }
            None => None,
        };

        let incoming = pending.as_ref().map(PitEntry::faceids).unwrap_or_default();
        match self.fib.find_fib_entry(&name, &[], &incoming).await {
            Some(fib_entry) => {
                self.pit.set_number_of_forwards(&name, 0).await;
                self.forward_to_least_occupied(&fib_entry, Requester::local(face), interest)
                    .await
            }
            None => {
                debug!("No FIB entry for {}, sending Nack", name);
                let nack = Nack::new(name.clone(), NackReason::NoRoute, Some(interest));
                match pending {
                    Some(entry) => {
                        self.pit.remove_pit_entry(&name).await;
                        let mut failed = None;
                        for requester in &entry.requesters {
                            note_failure(&mut failed, self.send_nack_to(requester, nack.clone()));
                        }
                        failed.map_or(Ok(()), Err)
                    }
                    None => {
                        self.metrics.nacks_sent.increment();
                        self.send_higher(face, nack.into())
                    }
                }
            }
        }
    }

    /// Send `interest` to the least loaded face of `fib_entry` that has
    /// not Nacked this name, recording the forward in the PIT.
    async fn forward_to_least_occupied(
        &self,
        fib_entry: &FibEntry,
        requester: Requester,
        interest: Interest,
    ) -> Result<()> {
        let name = interest.name.clone();

        for face in self.faces_by_occupancy(fib_entry).await {
            if self.pit.test_faceid_was_nacked(&name, face).await {
                continue;
            }

            self.pit
                .add_pit_entry(&name, requester, face, Some(interest.clone()))
                .await;
            self.pit.add_used_fib_face(&name, &[face]).await;
            self.pit.increase_number_of_forwards(&name).await;
            debug!("Forwarding {} to {}", name, face);
            self.metrics.interests_forwarded.increment();
            return self.send_lower(face, interest.into());
        }

        debug!("Every face for {} already Nacked, dropping", name);
        Ok(())
    }

    /// Faces of `fib_entry` ordered by ascending PIT occupancy, ties in FIB order.
    async fn faces_by_occupancy(&self, fib_entry: &FibEntry) -> Vec<FaceId> {
        let mut occupancy = self.pit.occupancy_available_faces_per_name(fib_entry).await;
        occupancy.sort_by_key(|(_, count)| *count);
        occupancy.into_iter().map(|(face, _)| face).collect()
    }

    /* ---------------------------------------------------------------- *
     * Content
     * ---------------------------------------------------------------- */

    async fn handle_content(&self, face: FaceId, content: Content, side: Side) -> Result<()> {
        let name = content.name.clone();
        let entry = match self.pit.find_pit_entry(&name).await {
            Some(entry) => entry,
            None => {
                debug!("No PIT entry for content {} from {} ({:?}), dropping", name, face, side);
                self.metrics.contents_unsolicited.increment();
                return Ok(());
            }
        };

        self.pit.remove_pit_entry(&name).await;
        self.cs.add_content_object(content.clone(), false).await;

        let mut failed = None;
        for requester in &entry.requesters {
            self.metrics.contents_delivered.increment();
            let sent = if requester.local_app {
                self.send_higher(requester.face, content.clone().into())
            } else {
                self.send_lower(requester.face, content.clone().into())
            };
            note_failure(&mut failed, sent);
        }
        failed.map_or(Ok(()), Err)
    }

    /* ---------------------------------------------------------------- *
     * Nack
     * ---------------------------------------------------------------- */

    async fn handle_nack(&self, face: FaceId, nack: Nack, side: Side) -> Result<()> {
        let name = nack.name.clone();
        debug!("Handling {} from {} ({:?})", Packet::Nack(nack.clone()), face, side);

        let entry = match self.pit.find_pit_entry(&name).await {
            Some(entry) => entry,
            None => {
                debug!("No PIT entry for Nack {}, dropping", name);
                return Ok(());
            }
        };
        self.metrics.nacks_received.increment();
        self.pit.add_nacked_faceid(&name, face).await;

        if entry.number_of_forwards > 1 {
            debug!(
                "Ignoring Nack from {} for {}, {} branches still pending",
                face, name, entry.number_of_forwards
            );
            self.pit.decrease_number_of_forwards(&name).await;
            return Ok(());
        }
        self.pit.set_number_of_forwards(&name, 0).await;

        let entry = match self.pit.find_pit_entry(&name).await {
            Some(entry) => entry,
            None => return Ok(()),
        };
        let next = self
            .fib
            .find_fib_entry(&name, &entry.fib_faces_already_used, &entry.faceids())
            .await;

        match next {
            Some(fib_entry) if fib_entry.faces != [face] => self.fail_over(&entry, &fib_entry).await,
            _ => self.propagate_nack(entry, nack).await,
        }
    }

    async fn fail_over(&self, entry: &PitEntry, fib_entry: &FibEntry) -> Result<()> {
        let name = &entry.name;

        for face in self.faces_by_occupancy(fib_entry).await {
            if self.pit.test_faceid_was_nacked(name, face).await {
                continue;
            }

            info!("Failing over {} to {}", name, face);
            self.pit.update_timestamp(name).await;
            self.pit.add_outgoing_face(name, face).await;
            self.pit.increase_number_of_forwards(name).await;
            self.pit.add_used_fib_face(name, &[face]).await;
            self.metrics.failovers.increment();
            self.metrics.interests_forwarded.increment();
            return self.send_lower(face, entry.interest_or_default().into());
        }

        Ok(())
    }

    /// Terminal Nack: local requesters are answered first. Network
    /// requesters only hear about it when no local requester was pending;
    /// otherwise they are put back into the PIT.
    async fn propagate_nack(&self, entry: PitEntry, nack: Nack) -> Result<()> {
        debug!("Sending Nack for {} to previous node(s)", entry.name);
        self.pit.remove_pit_entry(&entry.name).await;

        let local_first = entry.has_local_requester();
        let mut failed = None;
        for requester in &entry.requesters {
            if requester.local_app || !local_first {
                note_failure(&mut failed, self.send_nack_to(requester, nack.clone()));
            }
        }

        if local_first {
            let remaining: Vec<Requester> = entry
                .requesters
                .iter()
                .filter(|r| !r.local_app)
                .copied()
                .collect();
            if !remaining.is_empty() {
                debug!("Re-adding {} for {} network requesters", entry.name, remaining.len());
                self.pit
                    .append(PitEntry {
                        requesters: remaining,
                        ..entry
                    })
                    .await;
            }
        }
        failed.map_or(Ok(()), Err)
    }

    fn send_nack_to(&self, requester: &Requester, nack: Nack) -> Result<()> {
        self.metrics.nacks_sent.increment();
        if requester.local_app {
            self.send_higher(requester.face, nack.into())
        } else {
            self.send_lower(requester.face, nack.into())
        }
    }

    /* ---------------------------------------------------------------- *
     * Ageing
     * ---------------------------------------------------------------- */

    /// One ageing pass over the PIT and the Content Store.
    ///
    /// A failed send does not cut the pass short: every retransmission and
    /// timeout Nack is attempted and the Content Store is still aged. The
    /// first failure is returned afterwards.
    pub async fn ageing(&self) -> Result<()> {
        debug!("Ageing");
        let (retransmits, removed) = self.pit.ageing().await;
        let mut failed = None;

        for entry in retransmits {
            let fib_entry = match self
                .fib
                .find_fib_entry(&entry.name, &entry.fib_faces_already_used, &entry.faceids())
                .await
            {
                Some(fib_entry) => fib_entry,
                None => continue,
            };

            for face in fib_entry.faces {
                if entry.faces_already_nacked.contains(&face) {
                    continue;
                }
                debug!("Retransmitting {} to {}", entry.name, face);
                self.metrics.retransmissions.increment();
                note_failure(&mut failed, self.send_lower(face, entry.interest_or_default().into()));
            }
        }

        for entry in removed {
            self.metrics.pit_timeouts.increment();
            for requester in entry.requesters.iter().filter(|r| r.local_app) {
                let nack = Nack::new(
                    entry.name.clone(),
                    NackReason::PitTimeout,
                    entry.interest.clone(),
                );
                note_failure(&mut failed, self.send_nack_to(requester, nack));
            }
        }

        self.cs.ageing().await;
        self.update_pit_gauge().await;
        failed.map_or(Ok(()), Err)
    }

    /* ---------------------------------------------------------------- *
     * Tasks
     * ---------------------------------------------------------------- */

    /// Drain both inbound channels until shutdown or until both are closed.
    pub async fn run(
        self,
        mut from_lower: mpsc::UnboundedReceiver<LowerFrame>,
        mut from_higher: FaceReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("ICN layer started");
        let mut lower_open = true;
        let mut higher_open = true;

        while lower_open || higher_open {
            let result = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    Ok(())
                }
                frame = from_lower.recv(), if lower_open => match frame {
                    Some(frame) => self.handle_from_lower(frame).await,
                    None => {
                        lower_open = false;
                        Ok(())
                    }
                },
                item = from_higher.recv(), if higher_open => match item {
                    Some((face, packet)) => self.handle_from_higher(face, packet).await,
                    None => {
                        higher_open = false;
                        Ok(())
                    }
                },
            };

            if let Err(e) = result {
                warn!("Failed to handle packet: {}", e);
            }
        }
        info!("ICN layer stopped");
    }

    /// Run an ageing pass every `period` until shutdown.
    ///
    /// Each pass runs in its own task, so an error or a panic in one pass
    /// is logged and the next tick still fires.
    pub async fn run_ageing(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let layer = self.clone();
                    match tokio::spawn(async move { layer.ageing().await }).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("Exception during ageing: {}", e),
                        Err(e) => warn!("Ageing pass aborted: {}", e),
                    }
                }
            }
        }
        debug!("Ageing task stopped");
    }

    /* ---------------------------------------------------------------- *
     * Helpers
     * ---------------------------------------------------------------- */

    fn send_lower(&self, face: FaceId, packet: Packet) -> Result<()> {
        self.to_lower
            .send((face, packet))
            .map_err(|e| Error::ChannelClosed(format!("to lower: {} for {}", e.0 .1, e.0 .0)))
    }

    fn send_higher(&self, face: FaceId, packet: Packet) -> Result<()> {
        self.to_higher
            .send((face, packet))
            .map_err(|e| Error::ChannelClosed(format!("to higher: {} for {}", e.0 .1, e.0 .0)))
    }

    async fn update_pit_gauge(&self) {
        self.metrics.pit_size.set(self.pit.len().await as u64);
    }
}

/// Log a failed send and keep the first one for the caller.
fn note_failure(failed: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        warn!("Send failed: {}", e);
        failed.get_or_insert(e);
    }
}
