//! ICN forwarding node.
//!
//! This crate holds the three forwarding tables (Content Store, FIB, PIT),
//! the forwarding engine that drives them and [`Forwarder`], which wires a
//! configured node together and runs its packet and ageing tasks.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use log::{info, warn};
use rust_icn_common::{
    metrics::ForwarderMetrics,
    ndn::{Content, Name},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub mod config;
pub mod cs;
pub mod engine;
pub mod fib;
pub mod pit;

pub use config::ForwarderConfig;
pub use cs::ContentStore;
pub use engine::{FaceReceiver, FaceSender, IcnLayer, LowerFrame};
pub use fib::ForwardingInformationBase;
pub use pit::PendingInterestTable;

/// Channel ends a started forwarder exchanges packets through.
///
/// The link layer pushes into `from_lower` and drains `to_lower`; the
/// local application pushes into `from_higher` and drains `to_higher`.
pub struct ForwarderIo {
    pub from_lower: mpsc::UnboundedSender<LowerFrame>,
    pub to_lower: FaceReceiver,
    pub from_higher: FaceSender,
    pub to_higher: FaceReceiver,
}

/// A configured forwarding node.
pub struct Forwarder {
    config: ForwarderConfig,

    layer: IcnLayer,

    /// Outbound receivers, handed out once by `start()`
    outbound: Option<(FaceReceiver, FaceReceiver)>,

    shutdown: watch::Sender<bool>,

    tasks: Vec<JoinHandle<()>>,
}

impl Forwarder {
    /// Build the tables from `config`, including static routes and content.
    pub async fn new(config: ForwarderConfig) -> Result<Self> {
        config.validate()?;

        let cs = Arc::new(ContentStore::new(config.cs_timeout()));
        let fib = Arc::new(ForwardingInformationBase::new());
        let pit = Arc::new(PendingInterestTable::new(
            config.pit_timeout(),
            config.pit_retransmits,
        ));
        let metrics = Arc::new(ForwarderMetrics::new());

        for route in &config.routes {
            fib.add_fib_entry(Name::from(route.prefix.as_str()), route.face_ids(), route.static_route)
                .await;
        }
        for item in &config.static_content {
            let content = Content::new(item.name.as_str(), Bytes::from(item.payload.clone()));
            cs.add_content_object(content, true).await;
        }

        let (to_lower_tx, to_lower_rx) = mpsc::unbounded_channel();
        let (to_higher_tx, to_higher_rx) = mpsc::unbounded_channel();
        let layer = IcnLayer::new(cs, fib, pit, metrics, to_lower_tx, to_higher_tx);
        layer.set_interest_to_app(config.interest_to_app);

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            layer,
            outbound: Some((to_lower_rx, to_higher_rx)),
            shutdown,
            tasks: Vec::new(),
        })
    }

    /// Spawn the packet loop and the ageing loop.
    pub fn start(&mut self) -> Result<ForwarderIo> {
        let (to_lower, to_higher) = self
            .outbound
            .take()
            .ok_or_else(|| anyhow!("Forwarder already started"))?;

        let (from_lower, from_lower_rx) = mpsc::unbounded_channel();
        let (from_higher, from_higher_rx) = mpsc::unbounded_channel();

        let packets = self
            .layer
            .clone()
            .run(from_lower_rx, from_higher_rx, self.shutdown.subscribe());
        let ageing = self
            .layer
            .clone()
            .run_ageing(self.config.ageing_interval(), self.shutdown.subscribe());

        self.tasks.push(tokio::spawn(packets));
        self.tasks.push(tokio::spawn(ageing));
        info!(
            "Forwarder started (ageing every {} ms)",
            self.config.ageing_interval_ms
        );

        Ok(ForwarderIo {
            from_lower,
            to_lower,
            from_higher,
            to_higher,
        })
    }

    /// Stop both tasks. Pending Interests are discarded.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Forwarder task ended abnormally: {}", e);
            }
        }
        info!("Forwarder stopped");
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn layer(&self) -> &IcnLayer {
        &self.layer
    }

    pub fn cs(&self) -> &Arc<ContentStore> {
        self.layer.cs()
    }

    pub fn fib(&self) -> &Arc<ForwardingInformationBase> {
        self.layer.fib()
    }

    pub fn pit(&self) -> &Arc<PendingInterestTable> {
        self.layer.pit()
    }

    pub fn metrics(&self) -> &Arc<ForwarderMetrics> {
        self.layer.metrics()
    }
}
