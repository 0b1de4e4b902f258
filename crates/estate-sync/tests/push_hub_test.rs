//! Push hub behavior over an in-memory STOMP broker.

use std::time::Duration;

use estate_core::{ChangeKind, EntityKind, Topic};
use estate_sync::mock::{MemoryConnector, MemoryPeer, MemoryServer};
use estate_sync::stomp::{Command, Frame};
use estate_sync::{PushConfig, PushHub};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn house_updates() -> Topic {
    Topic::new(ChangeKind::Updated, EntityKind::House)
}

fn house_creates() -> Topic {
    Topic::new(ChangeKind::Created, EntityKind::House)
}

async fn accept(server: &mut MemoryServer) -> MemoryPeer {
    timeout(WAIT, server.accept())
        .await
        .expect("no connection within timeout")
        .expect("connector dropped")
}

async fn expect(peer: &mut MemoryPeer, command: Command) -> Frame {
    timeout(WAIT, peer.expect(command))
        .await
        .expect("no frame within timeout")
}

fn collector() -> (
    impl Fn(&str) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<String>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |body: &str| {
            let _ = tx.send(body.to_string());
        },
        rx,
    )
}

async fn next_body(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(WAIT, rx.recv())
        .await
        .expect("no delivery within timeout")
        .expect("handler dropped")
}

#[tokio::test]
async fn test_shared_topic_is_subscribed_once() {
    let (connector, mut server) = MemoryConnector::new();
    let hub = PushHub::new(connector, PushConfig::default());

    let mut a = hub.connect();
    a.subscribe(house_updates(), |_| {});
    let mut b = hub.connect();
    b.subscribe(house_updates(), |_| {});
    b.subscribe(house_creates(), |_| {});
    a.activate();
    b.activate();
    assert_eq!(hub.active_channels(), 2);
    assert_eq!(hub.handler_count(house_updates()), 2);

    let mut peer = accept(&mut server).await;
    let connect = timeout(WAIT, peer.handshake()).await.unwrap();
    assert_eq!(connect.header("accept-version"), Some("1.2"));

    let mut destinations = vec![
        expect(&mut peer, Command::Subscribe).await,
        expect(&mut peer, Command::Subscribe).await,
    ]
    .into_iter()
    .map(|f| f.header("destination").unwrap_or_default().to_string())
    .collect::<Vec<_>>();
    destinations.sort();
    assert_eq!(
        destinations,
        vec!["/topic/creates/house", "/topic/updates/house"]
    );
    assert_eq!(server.attempts(), 1);

    // Another handler remains on /topic/updates/house: nothing goes out.
    a.deactivate();
    assert_eq!(hub.handler_count(house_updates()), 1);
    assert!(hub.is_connected());

    b.deactivate();
    expect(&mut peer, Command::Unsubscribe).await;
    expect(&mut peer, Command::Unsubscribe).await;
    expect(&mut peer, Command::Disconnect).await;
    assert!(timeout(WAIT, peer.recv()).await.unwrap().is_none());
    assert_eq!(hub.topic_count(), 0);
    assert!(!hub.is_connected());
}

#[tokio::test]
async fn test_subscribe_while_connected_goes_out_immediately() {
    let (connector, mut server) = MemoryConnector::new();
    let hub = PushHub::new(connector, PushConfig::default());

    let mut a = hub.connect();
    a.subscribe(house_updates(), |_| {});
    a.activate();
    let mut peer = accept(&mut server).await;
    peer.handshake().await;
    let first = expect(&mut peer, Command::Subscribe).await;

    let mut b = hub.connect();
    b.activate();
    b.subscribe(house_creates(), |_| {});
    let second = expect(&mut peer, Command::Subscribe).await;
    assert_eq!(second.header("destination"), Some("/topic/creates/house"));
    assert_ne!(first.header("id"), second.header("id"));
}

#[tokio::test]
async fn test_no_delivery_after_deactivate() {
    let (connector, mut server) = MemoryConnector::new();
    let hub = PushHub::new(connector, PushConfig::default());

    let (handler_a, mut rx_a) = collector();
    let (handler_b, mut rx_b) = collector();
    let mut a = hub.connect();
    a.subscribe(house_updates(), handler_a);
    let mut b = hub.connect();
    b.subscribe(house_updates(), handler_b);
    a.activate();
    b.activate();

    let mut peer = accept(&mut server).await;
    peer.handshake().await;
    let sub = expect(&mut peer, Command::Subscribe).await;
    let sub_id = sub.header("id").unwrap_or_default().to_string();

    peer.publish("/topic/updates/house", &sub_id, "first");
    assert_eq!(next_body(&mut rx_a).await, "first");
    assert_eq!(next_body(&mut rx_b).await, "first");

    a.deactivate();
    peer.publish("/topic/updates/house", &sub_id, "second");
    // Frames are dispatched in order, so once b has "second" a would have too.
    assert_eq!(next_body(&mut rx_b).await, "second");
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_destination_falls_back_to_subscription_id() {
    let (connector, mut server) = MemoryConnector::new();
    let hub = PushHub::new(connector, PushConfig::default());

    let (handler, mut rx) = collector();
    let mut channel = hub.connect();
    channel.subscribe(house_creates(), handler);
    channel.activate();

    let mut peer = accept(&mut server).await;
    peer.handshake().await;
    let sub = expect(&mut peer, Command::Subscribe).await;
    let sub_id = sub.header("id").unwrap_or_default().to_string();

    peer.publish("/topic/not-a-topic", "sub-unknown", "dropped");
    peer.publish("/topic/not-a-topic", &sub_id, "routed");
    assert_eq!(next_body(&mut rx).await, "routed");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_reconnect_resubscribes_live_topics() {
    let (connector, mut server) = MemoryConnector::new();
    let config = PushConfig::default().with_reconnect_delay(Duration::from_millis(20));
    let hub = PushHub::new(connector, config);

    let (handler, mut rx) = collector();
    let mut channel = hub.connect();
    channel.subscribe(house_updates(), handler);
    channel.activate();

    let mut peer = accept(&mut server).await;
    peer.handshake().await;
    let before = expect(&mut peer, Command::Subscribe).await;
    peer.close();

    let mut peer = accept(&mut server).await;
    peer.handshake().await;
    let after = expect(&mut peer, Command::Subscribe).await;
    assert_eq!(after.header("destination"), before.header("destination"));
    assert_eq!(after.header("id"), before.header("id"));
    assert_eq!(server.attempts(), 2);

    peer.publish(
        "/topic/updates/house",
        after.header("id").unwrap_or_default(),
        "again",
    );
    assert_eq!(next_body(&mut rx).await, "again");
}

#[tokio::test]
async fn test_refused_connection_is_retried() {
    let (connector, mut server) = MemoryConnector::new();
    server.refuse_next(1);
    let config = PushConfig::default().with_reconnect_delay(Duration::from_millis(20));
    let hub = PushHub::new(connector, config);

    let mut channel = hub.connect();
    channel.subscribe(house_updates(), |_| {});
    channel.activate();

    let mut peer = accept(&mut server).await;
    peer.handshake().await;
    expect(&mut peer, Command::Subscribe).await;
    assert_eq!(server.attempts(), 2);
    assert!(channel.is_active());
}

#[tokio::test]
async fn test_refused_connection_without_reconnect_gives_up_quietly() {
    let (connector, server) = MemoryConnector::new();
    server.refuse_next(1);
    let hub = PushHub::new(connector, PushConfig::default());

    let mut channel = hub.connect();
    channel.subscribe(house_updates(), |_| {});
    channel.activate();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.attempts(), 1);
    assert!(!hub.is_connected());
    // The view keeps working without live updates.
    assert!(channel.is_active());
    assert_eq!(hub.handler_count(house_updates()), 1);
}

#[tokio::test]
async fn test_error_frame_ends_session() {
    let (connector, mut server) = MemoryConnector::new();
    let hub = PushHub::new(connector, PushConfig::default());

    let mut channel = hub.connect();
    channel.subscribe(house_updates(), |_| {});
    channel.activate();

    let mut peer = accept(&mut server).await;
    peer.handshake().await;
    expect(&mut peer, Command::Subscribe).await;

    peer.send(Frame::new(Command::Error).with_header("message", "bad destination"));
    assert!(timeout(WAIT, peer.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_handshake_does_not_subscribe() {
    let (connector, mut server) = MemoryConnector::new();
    let hub = PushHub::new(connector, PushConfig::default());

    let mut channel = hub.connect();
    channel.subscribe(house_updates(), |_| {});
    channel.activate();

    let mut peer = accept(&mut server).await;
    expect(&mut peer, Command::Connect).await;
    peer.send(Frame::new(Command::Error).with_header("message", "unauthorized"));
    assert!(timeout(WAIT, peer.recv()).await.unwrap().is_none());
    assert!(!hub.is_connected());
}
