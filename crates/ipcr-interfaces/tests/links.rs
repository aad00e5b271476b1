//! Routers talking to each other over real streams.

use std::future::Future;
use std::time::Duration;

use ipcr_core::{ControlPacket, PacketType, SockAddr, WireVersion};
use ipcr_interfaces::memory::duplex_pair;
use ipcr_interfaces::tcp::{self, TcpClient, TcpClientConfig, TcpListenerLink, TcpServerConfig};
use ipcr_interfaces::{InterfaceError, LinkOptions, attach};
use ipcr_router::testing::frame;
use ipcr_router::{Message, Router, RouterConfig, Socket};
use tokio::io::AsyncWriteExt;

const WAIT: Duration = Duration::from_secs(5);

fn router(local_node: u32) -> Router {
    Router::new(RouterConfig {
        local_node,
        ..RouterConfig::default()
    })
    .unwrap()
}

async fn ctrl(router: &Router) -> Socket {
    let s = router.open_socket(true);
    s.bind(SockAddr::ctrl(router.local_node())).await.unwrap();
    s
}

async fn recv(sock: &Socket) -> Message {
    tokio::time::timeout(WAIT, sock.recv())
        .await
        .expect("timed out waiting for a message")
        .unwrap()
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

async fn say_hello(from: &Socket, to: &Socket) {
    let to_addr = to.local_addr().unwrap();
    from.send_to(to_addr, &ControlPacket::Hello.encode()).await.unwrap();
    let hello = recv(to).await;
    assert_eq!(hello.kind, PacketType::Hello);
    assert_eq!(hello.src, from.local_addr().unwrap());
}

#[tokio::test]
async fn duplex_hello_then_data() {
    let (ra, rb) = (router(1), router(2));
    let (_a, _b) = duplex_pair(
        &ra,
        LinkOptions::new("a-to-b").node_id(Some(2)),
        &rb,
        LinkOptions::new("b-to-a").node_id(Some(1)),
    )
    .await
    .unwrap();
    let (ctrl_a, ctrl_b) = (ctrl(&ra).await, ctrl(&rb).await);

    say_hello(&ctrl_a, &ctrl_b).await;
    say_hello(&ctrl_b, &ctrl_a).await;

    let server = rb.open_socket(true);
    server.bind(SockAddr::new(2, 0x4100)).await.unwrap();
    let client = ra.open_socket(false);
    client
        .send_to(SockAddr::new(2, 0x4100), b"ping")
        .await
        .unwrap();

    let got = recv(&server).await;
    assert_eq!(got.kind, PacketType::Data);
    assert_eq!(got.payload, b"ping");
    assert_eq!(got.src, client.local_addr().unwrap());

    server.send_to(got.src, b"pong").await.unwrap();
    let reply = recv(&client).await;
    assert_eq!(reply.payload, b"pong");
    assert_eq!(reply.src, SockAddr::new(2, 0x4100));
}

#[tokio::test]
async fn data_before_hello_is_refused() {
    let (ra, rb) = (router(1), router(2));
    let (_a, _b) = duplex_pair(
        &ra,
        LinkOptions::new("a-to-b").node_id(Some(2)),
        &rb,
        LinkOptions::new("b-to-a").node_id(Some(1)),
    )
    .await
    .unwrap();

    let client = ra.open_socket(false);
    assert!(client.send_to(SockAddr::new(2, 0x4100), b"early").await.is_err());
}

#[tokio::test]
async fn peer_stop_unregisters_node_with_bye() {
    let (ra, rb) = (router(1), router(2));
    let (a, b) = duplex_pair(
        &ra,
        LinkOptions::new("a-to-b").node_id(Some(2)),
        &rb,
        LinkOptions::new("b-to-a").node_id(Some(1)),
    )
    .await
    .unwrap();
    let ctrl_a = ctrl(&ra).await;
    assert!(ra.lookup_node(2).is_some());

    b.stop().await;
    assert!(!b.is_up());
    assert!(rb.lookup_node(1).is_none());

    tokio::time::timeout(WAIT, a.closed()).await.unwrap();
    assert!(!a.is_up());
    assert!(!a.node().is_connected());
    assert!(ra.lookup_node(2).is_none());

    let bye = recv(&ctrl_a).await;
    assert_eq!(bye.kind, PacketType::Bye);
    assert_eq!(bye.src, SockAddr::ctrl(2));
}

#[tokio::test]
async fn stream_resyncs_after_garbage() {
    let ra = router(1);
    let (near, mut far) = tokio::io::duplex(4096);
    let link = attach(&ra, near, LinkOptions::new("raw").node_id(Some(5)))
        .await
        .unwrap();
    let sink = ra.open_socket(true);
    sink.bind(SockAddr::new(1, 0x4200)).await.unwrap();

    far.write_all(&[0x55; 40]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let msg = Message::data(SockAddr::new(5, 0x4000), SockAddr::new(1, 0x4200), b"after".to_vec());
    far.write_all(&frame(WireVersion::V2, &msg)).await.unwrap();

    let got = recv(&sink).await;
    assert_eq!(got.payload, b"after");
    assert_eq!(got.src, SockAddr::new(5, 0x4000));
    assert!(link.is_up());

    drop(far);
    tokio::time::timeout(WAIT, link.closed()).await.unwrap();
    assert!(ra.lookup_node(5).is_none());
}

#[tokio::test]
async fn tcp_listener_learns_node_from_hello() {
    let (ra, rb) = (router(1), router(2));
    let listener = TcpListenerLink::bind(
        ra.clone(),
        TcpServerConfig::new("listen", "127.0.0.1:0".parse().unwrap()),
    )
    .await
    .unwrap();
    let listener = &listener;
    let (ctrl_a, ctrl_b) = (ctrl(&ra).await, ctrl(&rb).await);

    let mut config = TcpClientConfig::new("uplink", listener.local_addr().to_string());
    config.node_id = Some(1);
    let link = tcp::connect(&rb, &config).await.unwrap();
    eventually(move || async move { listener.link_count().await == 1 }).await;

    say_hello(&ctrl_b, &ctrl_a).await;
    let ra = &ra;
    let learned = ra.lookup_node(2).expect("node id learned from HELLO");
    assert!(learned.is_connected());

    say_hello(&ctrl_a, &ctrl_b).await;
    let server = rb.open_socket(true);
    server.bind(SockAddr::new(2, 0x4300)).await.unwrap();
    let client = ra.open_socket(false);
    client.send_to(SockAddr::new(2, 0x4300), b"over tcp").await.unwrap();
    assert_eq!(recv(&server).await.payload, b"over tcp");

    link.stop().await;
    eventually(move || async move { listener.link_count().await == 0 }).await;
    eventually(move || async move { ra.lookup_node(2).is_none() }).await;
    listener.stop().await;
}

#[tokio::test]
async fn tcp_client_supervisor_connects_and_stops() {
    let (ra, rb) = (router(1), router(2));
    let listener = TcpListenerLink::bind(
        ra.clone(),
        TcpServerConfig::new("listen", "127.0.0.1:0".parse().unwrap()),
    )
    .await
    .unwrap();

    let mut config = TcpClientConfig::new("uplink", listener.local_addr().to_string());
    config.node_id = Some(1);
    config.reconnect_wait = Duration::from_millis(20);
    let listener = &listener;
    let client = &TcpClient::spawn(rb.clone(), config).await;
    assert_eq!(client.name(), "uplink");

    eventually(move || async move { client.is_connected() }).await;
    eventually(move || async move { listener.link_count().await == 1 }).await;
    assert!(rb.lookup_node(1).is_some());

    client.stop().await;
    assert!(!client.is_connected());
    assert!(rb.lookup_node(1).is_none());
    eventually(move || async move { listener.link_count().await == 0 }).await;
    listener.stop().await;
}

#[tokio::test]
async fn tcp_connect_refused() {
    let spare = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = spare.local_addr().unwrap();
    drop(spare);

    let config = TcpClientConfig::new("dead", addr.to_string());
    let err = tcp::connect(&router(2), &config).await.unwrap_err();
    assert!(matches!(err, InterfaceError::Io(_)));
}

#[tokio::test]
async fn duplicate_node_id_is_rejected() {
    let (ra, rb, rc) = (router(1), router(2), router(3));
    let (_ab, _ba) = duplex_pair(
        &ra,
        LinkOptions::new("a-to-b").node_id(Some(2)),
        &rb,
        LinkOptions::new("b-to-a"),
    )
    .await
    .unwrap();

    let err = duplex_pair(
        &ra,
        LinkOptions::new("a-to-c").node_id(Some(2)),
        &rc,
        LinkOptions::new("c-to-a"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, InterfaceError::Router(_)));
}
