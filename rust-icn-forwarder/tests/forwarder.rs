use rust_icn_common::{
    ndn::{Content, Interest, Nack, NackReason, Name, Packet},
    types::FaceId,
};
use rust_icn_forwarder::{
    config::{RouteConfig, StaticContentConfig},
    Forwarder, ForwarderConfig, ForwarderIo, LowerFrame,
};
use std::time::Duration;
use tokio::time::timeout;

fn config_with_route(prefix: &str, faces: &[i32]) -> ForwarderConfig {
    ForwarderConfig {
        ageing_interval_ms: 1000,
        routes: vec![RouteConfig {
            prefix: prefix.into(),
            faces: faces.to_vec(),
            static_route: true,
        }],
        ..Default::default()
    }
}

async fn next(rx: &mut rust_icn_forwarder::FaceReceiver) -> (FaceId, Packet) {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

async fn started(config: ForwarderConfig) -> (Forwarder, ForwarderIo) {
    let mut forwarder = Forwarder::new(config).await.unwrap();
    let io = forwarder.start().unwrap();
    (forwarder, io)
}

#[tokio::test]
async fn interest_and_content_flow_through_a_running_node() {
    let (mut forwarder, mut io) = started(config_with_route("/a", &[2])).await;

    let interest = Interest::new("/a/b");
    io.from_lower
        .send(LowerFrame::Packet(FaceId(1), interest.clone().into()))
        .unwrap();
    assert_eq!(next(&mut io.to_lower).await, (FaceId(2), interest.into()));

    let content = Content::new("/a/b", "payload");
    io.from_lower
        .send(LowerFrame::Packet(FaceId(2), content.clone().into()))
        .unwrap();
    assert_eq!(next(&mut io.to_lower).await, (FaceId(1), content.clone().into()));

    // now served from the cache
    io.from_higher
        .send((FaceId(100), Interest::new("/a/b").into()))
        .unwrap();
    assert_eq!(next(&mut io.to_higher).await, (FaceId(100), content.into()));

    assert_eq!(forwarder.metrics().cs_hits.value(), 1);
    assert!(forwarder.pit().is_empty().await);
    forwarder.stop().await;
}

#[tokio::test]
async fn static_content_is_pinned_at_startup() {
    let config = ForwarderConfig {
        static_content: vec![StaticContentConfig {
            name: "/x/y".into(),
            payload: "hello".into(),
        }],
        ..Default::default()
    };
    let (mut forwarder, mut io) = started(config).await;

    io.from_lower
        .send(LowerFrame::Packet(FaceId(3), Interest::new("/x/y").into()))
        .unwrap();
    match next(&mut io.to_lower).await {
        (FaceId(3), Packet::Content(c)) => assert_eq!(c.payload.as_ref(), b"hello"),
        other => panic!("unexpected {:?}", other),
    }

    let entries = forwarder.cs().entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].static_entry);
    forwarder.stop().await;
}

#[tokio::test]
async fn malformed_frames_do_not_stop_the_node() {
    let (mut forwarder, mut io) = started(ForwarderConfig::default()).await;

    io.from_lower
        .send(LowerFrame::Malformed("truncated envelope".into()))
        .unwrap();
    io.from_lower
        .send(LowerFrame::Packet(FaceId(1), Interest::new("/nowhere").into()))
        .unwrap();

    match next(&mut io.to_lower).await {
        (FaceId(1), Packet::Nack(n)) => assert_eq!(n.reason, NackReason::NoRoute),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(forwarder.metrics().malformed_frames.value(), 1);
    forwarder.stop().await;
}

#[tokio::test]
async fn start_twice_is_refused() {
    let mut forwarder = Forwarder::new(ForwarderConfig::default()).await.unwrap();
    let _io = forwarder.start().unwrap();
    assert!(forwarder.start().is_err());
    forwarder.stop().await;
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let config = ForwarderConfig {
        ageing_interval_ms: 0,
        ..Default::default()
    };
    assert!(Forwarder::new(config).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn ageing_task_times_out_application_interest() {
    let config = ForwarderConfig {
        ageing_interval_ms: 1000,
        pit_timeout_ms: 1500,
        pit_retransmits: 1,
        ..config_with_route("/slow", &[2])
    };
    let (mut forwarder, mut io) = started(config).await;

    let interest = Interest::new("/slow/item");
    io.from_higher
        .send((FaceId(100), interest.clone().into()))
        .unwrap();
    assert_eq!(next(&mut io.to_lower).await, (FaceId(2), interest.clone().into()));

    let (face, packet) = next(&mut io.to_higher).await;
    assert_eq!(face, FaceId(100));
    assert_eq!(
        packet,
        Packet::Nack(Nack::new("/slow/item", NackReason::PitTimeout, Some(interest)))
    );
    assert!(forwarder.pit().find_pit_entry(&Name::from("/slow/item")).await.is_none());
    assert_eq!(forwarder.metrics().pit_timeouts.value(), 1);
    forwarder.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_ageing_pass_does_not_stop_the_timer() {
    let config = ForwarderConfig {
        ageing_interval_ms: 1000,
        pit_timeout_ms: 60_000,
        ..Default::default()
    };
    let (mut forwarder, io) = started(config).await;
    let name = Name::from("/stuck");
    forwarder
        .fib()
        .add_fib_entry(name.clone(), vec![FaceId(5)], false)
        .await;
    forwarder
        .pit()
        .add_pit_entry(
            &name,
            rust_icn_forwarder::pit::Requester::network(FaceId(1)),
            FaceId(9),
            None,
        )
        .await;

    // every retransmission now fails
    drop(io.to_lower);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(forwarder.metrics().retransmissions.value() >= 3);
    forwarder.stop().await;
}

#[tokio::test]
async fn stop_ends_both_tasks() {
    let (mut forwarder, io) = started(ForwarderConfig::default()).await;
    forwarder.stop().await;

    // the packet loop is gone, so its receiver was dropped
    assert!(io
        .from_lower
        .send(LowerFrame::Packet(FaceId(1), Interest::new("/a").into()))
        .is_err());
}
