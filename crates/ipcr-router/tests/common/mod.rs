#![allow(dead_code)]

use std::sync::Arc;

use ipcr_core::{ControlPacket, SockAddr, WireVersion};
use ipcr_router::testing::{RecordingEndpoint, frame};
use ipcr_router::{Message, NodeHandle, Router, RouterConfig, Socket};

pub const LOCAL: u32 = 1;

pub fn router() -> Router {
    Router::new(RouterConfig::default()).unwrap()
}

pub async fn ctrl_socket(router: &Router) -> Socket {
    let s = router.open_socket(true);
    s.bind(SockAddr::ctrl(LOCAL)).await.unwrap();
    s
}

pub async fn bound(router: &Router, port: u32) -> Socket {
    let s = router.open_socket(true);
    s.bind(SockAddr::new(LOCAL, port)).await.unwrap();
    s
}

/// Register a peer as `nid` on segment `net` and greet it from `ctrl`.
pub async fn attach(
    router: &Router,
    ctrl: &Socket,
    nid: u32,
    net: u32,
) -> (NodeHandle, Arc<RecordingEndpoint>) {
    let ep = RecordingEndpoint::new(&format!("node{nid}"));
    let handle = router.register_endpoint_as(ep.clone(), net, nid).unwrap();
    ctrl.send_to(SockAddr::ctrl(nid), &ControlPacket::Hello.encode())
        .await
        .unwrap();
    assert!(handle.hello_sent());
    assert_eq!(ep.take_messages().len(), 1);
    (handle, ep)
}

pub async fn inject(router: &Router, handle: &NodeHandle, msg: &Message) {
    router
        .deliver(handle, &frame(WireVersion::V1, msg))
        .await
        .unwrap();
}
