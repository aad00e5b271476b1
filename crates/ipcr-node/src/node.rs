//! Daemon runtime: one router, its TCP links and the HELLO responder.

use std::net::SocketAddr;
use std::time::Duration;

use ipcr_core::{ControlPacket, PacketType, SockAddr};
use ipcr_interfaces::tcp::{TcpClient, TcpListenerLink};
use ipcr_router::{Message, Router, RouterError, Socket};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::error::NodeError;

/// How often peers with a configured id are greeted until they answer.
const GREET_INTERVAL: Duration = Duration::from_secs(1);

/// Cloneable trigger for [`Node::run`] to return.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct Node {
    config: NodeConfig,
    router: Router,
    clients: Vec<TcpClient>,
    listeners: Vec<TcpListenerLink>,
    responder: Option<JoinHandle<()>>,
    started: bool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let router = Router::new(config.router_config()?)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            router,
            clients: Vec::new(),
            listeners: Vec::new(),
            responder: None,
            started: false,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Addresses the TCP listeners are bound to, in configuration order.
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(TcpListenerLink::local_addr).collect()
    }

    /// Bind the control port and bring up every configured link.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.started {
            return Err(NodeError::AlreadyRunning);
        }
        self.started = true;
        let local = self.router.local_node();
        tracing::info!(node = local, "starting router");

        if self.config.router.answer_hello {
            let ctrl = self.router.open_socket(true);
            ctrl.bind(SockAddr::ctrl(local)).await?;
            let known: Vec<u32> = self
                .config
                .links
                .tcp_client
                .iter()
                .filter_map(|e| e.node_id)
                .collect();
            let task = hello_responder(self.router.clone(), ctrl, known, self.shutdown_rx.clone());
            self.responder = Some(tokio::spawn(task));
        }

        for entry in &self.config.links.tcp_server {
            let link_config = entry.to_link_config()?;
            let listener = TcpListenerLink::bind(self.router.clone(), link_config)
                .await
                .inspect_err(|e| tracing::error!(link = %entry.name, "failed to bind: {e}"))?;
            tracing::info!(link = %entry.name, addr = %listener.local_addr(), "listener started");
            self.listeners.push(listener);
        }

        for entry in &self.config.links.tcp_client {
            let client = TcpClient::spawn(self.router.clone(), entry.to_link_config()).await;
            tracing::info!(link = %entry.name, target = %entry.target, "client started");
            self.clients.push(client);
        }

        Ok(())
    }

    /// Wait for a shutdown request.
    pub async fn run(&mut self) {
        tracing::info!("router running");
        let _ = self.shutdown_rx.wait_for(|stop| *stop).await;
        tracing::info!("shutdown signal received");
    }

    pub async fn shutdown(mut self) {
        tracing::info!("shutting down router");
        let _ = self.shutdown_tx.send(true);

        for client in self.clients.drain(..) {
            client.stop().await;
        }
        for listener in self.listeners.drain(..) {
            listener.stop().await;
        }
        if let Some(responder) = self.responder.take() {
            let _ = responder.await;
        }

        tracing::info!(nodes = self.router.node_count(), "router shutdown complete");
    }
}

async fn hello_responder(
    router: Router,
    ctrl: Socket,
    known: Vec<u32>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut greet = tokio::time::interval(GREET_INTERVAL);

    loop {
        tokio::select! {
            msg = ctrl.recv() => match msg {
                Ok(msg) => on_control(&router, &ctrl, msg).await,
                Err(RouterError::NetworkReset) => {
                    tracing::debug!("control socket reset");
                }
                Err(e) => {
                    tracing::error!("control socket failed: {e}");
                    break;
                }
            },
            _ = greet.tick() => {
                for &nid in &known {
                    greet_if_needed(&router, &ctrl, nid).await;
                }
            }
            _ = stop_rx.changed() => break,
        }
    }

    ctrl.close().await;
}

async fn on_control(router: &Router, ctrl: &Socket, msg: Message) {
    match msg.kind {
        PacketType::Hello => {
            tracing::debug!(node = msg.src.node, "HELLO received");
            greet_if_needed(router, ctrl, msg.src.node).await;
        }
        PacketType::Bye => {
            tracing::info!(node = msg.src.node, "node said BYE");
        }
        kind => {
            tracing::trace!(?kind, src = ?msg.src, "control message ignored");
        }
    }
}

/// Send HELLO to `nid` unless its registration has already been greeted.
async fn greet_if_needed(router: &Router, ctrl: &Socket, nid: u32) {
    let Some(node) = router.lookup_node(nid) else {
        return;
    };
    if node.hello_sent() || !node.is_connected() {
        return;
    }
    match ctrl.send_to(SockAddr::ctrl(nid), &ControlPacket::Hello.encode()).await {
        Ok(_) => tracing::info!(node = nid, endpoint = node.name(), "HELLO sent"),
        Err(e) => tracing::debug!(node = nid, "HELLO not sent: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;

    #[tokio::test]
    async fn start_twice_is_rejected() {
        logging::init_for_tests();
        let mut node = Node::new(NodeConfig::default()).unwrap();
        node.start().await.unwrap();
        assert!(matches!(node.start().await, Err(NodeError::AlreadyRunning)));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_config_fails_construction() {
        let config = NodeConfig::parse("[router]\nnode_backlog = 0\n").unwrap();
        assert!(matches!(Node::new(config), Err(NodeError::Config(_))));
    }

    #[tokio::test]
    async fn answer_hello_binds_control_port() {
        let mut node = Node::new(NodeConfig::default()).unwrap();
        node.start().await.unwrap();
        assert_eq!(node.router().bound_ports(), 1);

        let other = node.router().open_socket(true);
        assert!(matches!(
            other.bind(SockAddr::ctrl(1)).await,
            Err(RouterError::PortInUse)
        ));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn control_port_left_free_when_disabled() {
        let config = NodeConfig::parse("[router]\nanswer_hello = false\n").unwrap();
        let mut node = Node::new(config).unwrap();
        node.start().await.unwrap();
        assert_eq!(node.router().bound_ports(), 0);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn run_returns_on_shutdown_handle() {
        let mut node = Node::new(NodeConfig::default()).unwrap();
        node.start().await.unwrap();
        let handle = node.shutdown_handle();
        tokio::spawn(async move { handle.shutdown() });
        tokio::time::timeout(Duration::from_secs(5), node.run())
            .await
            .unwrap();
        node.shutdown().await;
    }
}
