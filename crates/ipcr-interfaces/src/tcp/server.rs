//! Listening TCP link: every accepted connection becomes a router node.

use std::net::SocketAddr;
use std::sync::Arc;

use ipcr_router::Router;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::TcpServerConfig;
use crate::error::InterfaceError;
use crate::shutdown::ShutdownToken;
use crate::stream::{Link, LinkOptions, attach};

pub struct TcpListenerLink {
    config: TcpServerConfig,
    local_addr: SocketAddr,
    links: Arc<Mutex<Vec<Link>>>,
    shutdown: ShutdownToken,
}

impl TcpListenerLink {
    /// Bind the listener and start accepting.
    pub async fn bind(router: Router, config: TcpServerConfig) -> Result<Self, InterfaceError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("{}: listening on {}", config.name, local_addr);

        let links = Arc::new(Mutex::new(Vec::new()));
        let shutdown = ShutdownToken::new();
        shutdown.set_up();

        let task = accept_loop(
            router,
            listener,
            Arc::clone(&links),
            shutdown.subscribe(),
            config.clone(),
        );
        shutdown.add_task(tokio::spawn(task)).await;

        Ok(Self {
            config,
            local_addr,
            links,
            shutdown,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepted links whose streams are still up.
    pub async fn link_count(&self) -> usize {
        self.links.lock().await.iter().filter(|l| l.is_up()).count()
    }

    /// Stop accepting and tear down every accepted link.
    pub async fn stop(&self) {
        self.shutdown.signal_stop();
        self.shutdown.join_all().await;

        let links: Vec<Link> = self.links.lock().await.drain(..).collect();
        for link in &links {
            link.stop().await;
        }
    }
}

async fn accept_loop(
    router: Router,
    listener: TcpListener,
    links: Arc<Mutex<Vec<Link>>>,
    mut stop_rx: watch::Receiver<bool>,
    config: TcpServerConfig,
) {
    loop {
        let (stream, peer_addr) = tokio::select! {
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("{}: accept error: {}", config.name, e);
                    continue;
                }
            },
            _ = stop_rx.changed() => {
                debug!("{}: accept loop stopping", config.name);
                break;
            }
        };
        info!("{}: accepted connection from {}", config.name, peer_addr);
        let _ = stream.set_nodelay(true);

        let opts = LinkOptions::new(format!("{}[{}]", config.name, peer_addr)).net_id(config.net_id);
        match attach(&router, stream, opts).await {
            Ok(link) => {
                let mut links = links.lock().await;
                links.retain(Link::is_up);
                links.push(link);
            }
            Err(e) => warn!("{}: failed to attach {}: {}", config.name, peer_addr, e),
        }
    }
}
