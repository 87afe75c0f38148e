//! In-process link layer for running several forwarders together.
//!
//! The bus maps every `(node, face)` to the peer end of a link and moves
//! packets from one node's outbound channel into the peer's inbound one.

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use log::{debug, info, warn};
use rust_icn_common::{
    ndn::{Content, Interest, Name, Packet},
    types::FaceId,
};
use rust_icn_forwarder::{
    config::{RouteConfig, StaticContentConfig},
    FaceReceiver, FaceSender, Forwarder, ForwarderConfig, LowerFrame,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout, Instant},
};

type Endpoint = (String, FaceId);

/// Link layer shared by the simulated nodes.
#[derive(Default)]
pub struct SimulationBus {
    links: HashMap<Endpoint, Endpoint>,
    inboxes: HashMap<String, mpsc::UnboundedSender<LowerFrame>>,
    outboxes: Vec<(String, FaceReceiver)>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a node's link-layer channel ends into the bus.
    pub fn attach(
        &mut self,
        node: &str,
        from_lower: mpsc::UnboundedSender<LowerFrame>,
        to_lower: FaceReceiver,
    ) {
        self.inboxes.insert(node.to_string(), from_lower);
        self.outboxes.push((node.to_string(), to_lower));
    }

    /// Connect face `a_face` of node `a` with face `b_face` of node `b`.
    pub fn connect(&mut self, a: &str, a_face: FaceId, b: &str, b_face: FaceId) {
        self.links
            .insert((a.to_string(), a_face), (b.to_string(), b_face));
        self.links
            .insert((b.to_string(), b_face), (a.to_string(), a_face));
    }

    /// Start moving packets between the attached nodes.
    pub fn start(&mut self) {
        let links = Arc::new(self.links.clone());
        let inboxes = Arc::new(self.inboxes.clone());

        for (node, mut outbox) in self.outboxes.drain(..) {
            let links = links.clone();
            let inboxes = inboxes.clone();
            self.tasks.push(tokio::spawn(async move {
                while let Some((face, packet)) = outbox.recv().await {
                    let peer = links
                        .get(&(node.clone(), face))
                        .and_then(|(peer, peer_face)| inboxes.get(peer).map(|tx| (peer, *peer_face, tx)));

                    match peer {
                        Some((peer, peer_face, tx)) => {
                            debug!("{}:{} -> {}:{} {}", node, face.0, peer, peer_face.0, packet);
                            if tx.send(LowerFrame::Packet(peer_face, packet)).is_err() {
                                warn!("Node {} is gone, dropping packet", peer);
                            }
                        }
                        None => warn!("No link on {} face {}, dropping {}", node, face, packet),
                    }
                }
            }));
        }
        info!("Simulation bus started with {} links", self.links.len() / 2);
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SimulationBus {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Application answering every Interest it is handed after `delay`.
fn spawn_producer(
    node: String,
    mut requests: FaceReceiver,
    answers: FaceSender,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((face, packet)) = requests.recv().await {
            let Packet::Interest(interest) = packet else {
                continue;
            };
            let answers = answers.clone();
            let node = node.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                let payload = Bytes::from(format!("{} served {}", node, interest.name));
                let _ = answers.send((face, Content::new(interest.name, payload).into()));
            });
        }
    })
}

/// Parameters of the balanced forwarding scenario.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub interests: usize,
    pub producer_delay: Duration,
    pub timeout: Duration,
}

/// Answer received by the client for one name.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub name: Name,
    pub outcome: String,
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub results: Vec<FetchResult>,
    /// Interests each producer answered itself
    pub served: BTreeMap<String, u64>,
    /// Counters per node
    pub metrics: BTreeMap<String, Vec<(&'static str, u64)>>,
    pub elapsed: Duration,
}

fn producer_config() -> ForwarderConfig {
    ForwarderConfig {
        ageing_interval_ms: 1000,
        cs_timeout_ms: 30_000,
        interest_to_app: true,
        ..Default::default()
    }
}

/// Client <-> icn1 <-+-> nfn1 (/x)
///                   +-> nfn2 (/a)
///                   +-> nfn3 (/a)
///
/// The client fetches `/x/y` and `interests` names under `/a/b`; the
/// `/a` Interests are spread over nfn2 and nfn3 by PIT occupancy.
pub async fn run_balanced_scenario(options: &ScenarioOptions) -> Result<ScenarioReport> {
    let mut bus = SimulationBus::new();
    let mut nodes: Vec<(String, Forwarder)> = Vec::new();
    let mut producers = Vec::new();

    let icn1_config = ForwarderConfig {
        ageing_interval_ms: 1000,
        routes: vec![
            RouteConfig {
                prefix: "/x".into(),
                faces: vec![0],
                static_route: true,
            },
            RouteConfig {
                prefix: "/a".into(),
                faces: vec![1, 2],
                static_route: true,
            },
        ],
        ..Default::default()
    };
    let mut icn1 = Forwarder::new(icn1_config).await?;
    let client = icn1.start()?;
    bus.attach("icn1", client.from_lower, client.to_lower);
    let (client_tx, mut client_rx) = (client.from_higher, client.to_higher);
    nodes.push(("icn1".to_string(), icn1));

    for (face, node) in ["nfn1", "nfn2", "nfn3"].into_iter().enumerate() {
        let mut config = producer_config();
        if node == "nfn1" {
            config.static_content.push(StaticContentConfig {
                name: "/x/y".into(),
                payload: "x..y".into(),
            });
        }

        let mut forwarder = Forwarder::new(config)
            .await
            .with_context(|| format!("Failed to build {}", node))?;
        let io = forwarder.start()?;
        bus.attach(node, io.from_lower, io.to_lower);
        bus.connect("icn1", FaceId(face as i32), node, FaceId(0));
        producers.push(spawn_producer(
            node.to_string(),
            io.to_higher,
            io.from_higher,
            options.producer_delay,
        ));
        nodes.push((node.to_string(), forwarder));
    }
    bus.start();

    let started = Instant::now();
    let mut names = vec![Name::from("/x/y")];
    names.extend((0..options.interests).map(|i| Name::from("/a/b").child(&i.to_string())));

    // one application face per request
    for (i, name) in names.iter().enumerate() {
        client_tx
            .send((FaceId(1000 + i as i32), Interest::new(name.clone()).into()))
            .map_err(|_| anyhow!("icn1 stopped accepting Interests"))?;
    }

    let mut outcomes: HashMap<FaceId, String> = HashMap::new();
    let deadline = started + options.timeout;
    while outcomes.len() < names.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, client_rx.recv()).await {
            Ok(Some((face, Packet::Content(content)))) => {
                outcomes.insert(face, String::from_utf8_lossy(&content.payload).into_owned());
            }
            Ok(Some((face, Packet::Nack(nack)))) => {
                outcomes.insert(face, format!("Nack: {}", nack.reason));
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }
    let elapsed = started.elapsed();

    let results = names
        .iter()
        .enumerate()
        .map(|(i, name)| FetchResult {
            name: name.clone(),
            outcome: outcomes
                .remove(&FaceId(1000 + i as i32))
                .unwrap_or_else(|| "no answer".to_string()),
        })
        .collect();

    let mut served = BTreeMap::new();
    let mut metrics = BTreeMap::new();
    for (node, forwarder) in nodes.iter_mut() {
        if node.as_str() != "icn1" {
            served.insert(node.clone(), forwarder.metrics().interests_to_app.value());
        }
        metrics.insert(node.clone(), forwarder.metrics().snapshot());
        forwarder.stop().await;
    }
    for producer in producers {
        producer.abort();
    }
    bus.stop();

    Ok(ScenarioReport {
        results,
        served,
        metrics,
        elapsed,
    })
}
