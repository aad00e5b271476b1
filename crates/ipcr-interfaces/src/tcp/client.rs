//! Outbound TCP links with automatic reconnection.

use std::sync::Arc;

use ipcr_router::Router;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::TcpClientConfig;
use crate::error::InterfaceError;
use crate::shutdown::ShutdownToken;
use crate::stream::{Link, LinkOptions, attach};

/// Dial `config.target` once and attach the stream to `router`.
pub async fn connect(router: &Router, config: &TcpClientConfig) -> Result<Link, InterfaceError> {
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&*config.target))
        .await
        .map_err(|_| InterfaceError::ConnectTimeout(config.target.clone()))??;
    let _ = stream.set_nodelay(true);
    info!("{}: connected to {}", config.name, config.target);

    let opts = LinkOptions::new(config.name.clone())
        .net_id(config.net_id)
        .node_id(config.node_id);
    attach(router, stream, opts).await
}

/// A supervised outbound link: reconnects whenever the stream drops.
pub struct TcpClient {
    config: TcpClientConfig,
    shutdown: Arc<ShutdownToken>,
}

impl TcpClient {
    /// Start dialing in the background.
    pub async fn spawn(router: Router, config: TcpClientConfig) -> Self {
        let shutdown = Arc::new(ShutdownToken::new());
        let task = supervise(
            router,
            config.clone(),
            Arc::clone(&shutdown),
            shutdown.subscribe(),
        );
        shutdown.add_task(tokio::spawn(task)).await;
        Self { config, shutdown }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether a stream is currently attached.
    pub fn is_connected(&self) -> bool {
        self.shutdown.is_up()
    }

    /// Stop redialing and tear down the current link.
    pub async fn stop(&self) {
        self.shutdown.signal_stop();
        self.shutdown.join_all().await;
    }
}

async fn supervise(
    router: Router,
    config: TcpClientConfig,
    state: Arc<ShutdownToken>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        if *stop_rx.borrow() {
            break;
        }

        match connect(&router, &config).await {
            Ok(link) => {
                failures = 0;
                state.set_up();
                tokio::select! {
                    _ = link.closed() => {
                        info!("{}: disconnected, reconnecting in {:?}", config.name, config.reconnect_wait);
                    }
                    _ = stop_rx.changed() => {
                        link.stop().await;
                        state.set_down();
                        break;
                    }
                }
                state.set_down();
            }
            Err(e) => {
                debug!("{}: connection failed: {}", config.name, e);
                failures += 1;
                if let Some(max) = config.max_reconnect_tries
                    && failures > max
                {
                    warn!("{}: max reconnect attempts ({}) reached", config.name, max);
                    break;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_wait) => {}
            _ = stop_rx.changed() => break,
        }
    }
}
