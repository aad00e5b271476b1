//! Any byte stream as a router endpoint.
//!
//! [`attach`] splits the stream: the write half becomes a [`StreamLink`]
//! registered with the router, and a spawned read loop cuts frames out of
//! the read half and hands them to [`Router::deliver`]. When the stream
//! ends, fails, or the link is stopped, the node is unregistered.

use std::sync::Arc;

use ipcr_router::{BoxFuture, Endpoint, EndpointError, NodeHandle, Router, RouterError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::InterfaceError;
use crate::framing::{DEFAULT_MAX_PAYLOAD, FrameAccumulator};
use crate::shutdown::ShutdownToken;

const READ_BUFFER: usize = 16 * 1024;

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write side of a stream link.
pub struct StreamLink {
    name: String,
    writer: Mutex<Option<BoxWriter>>,
}

impl StreamLink {
    pub fn new<W>(name: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            writer: Mutex::new(Some(Box::new(writer))),
        }
    }

    /// Close the write half. Later transmits fail with `Disconnected`.
    pub async fn shutdown_writer(&self) {
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = w.shutdown().await;
        }
    }

    pub async fn is_writable(&self) -> bool {
        self.writer.lock().await.is_some()
    }
}

impl Endpoint for StreamLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn transmit(&self, frame: Vec<u8>) -> BoxFuture<'_, Result<(), EndpointError>> {
        Box::pin(async move {
            let mut guard = self.writer.lock().await;
            let Some(w) = guard.as_mut() else {
                return Err(EndpointError::Disconnected);
            };
            let result = async {
                w.write_all(&frame).await?;
                w.flush().await
            }
            .await;
            if let Err(e) = result {
                debug!(link = %self.name, error = %e, "write failed, closing writer");
                *guard = None;
                return Err(e.into());
            }
            Ok(())
        })
    }
}

/// How a stream is registered with the router.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub name: String,
    pub net_id: u32,
    /// Known id of the remote node; learned from its first frame when `None`.
    pub node_id: Option<u32>,
    pub max_payload: usize,
}

impl LinkOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            net_id: 0,
            node_id: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    #[must_use]
    pub fn net_id(mut self, net_id: u32) -> Self {
        self.net_id = net_id;
        self
    }

    #[must_use]
    pub fn node_id(mut self, node_id: Option<u32>) -> Self {
        self.node_id = node_id;
        self
    }

    #[must_use]
    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

/// A running stream link.
pub struct Link {
    node: NodeHandle,
    endpoint: Arc<StreamLink>,
    shutdown: Arc<ShutdownToken>,
}

impl Link {
    /// The router's view of the remote node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    /// Whether the read loop is still running.
    pub fn is_up(&self) -> bool {
        self.shutdown.is_up()
    }

    /// Stop the read loop and wait until the node is unregistered.
    pub async fn stop(&self) {
        self.shutdown.signal_stop();
        self.shutdown.join_all().await;
    }

    /// Resolve once the link has gone down for any reason.
    pub async fn closed(&self) {
        self.shutdown.stopped().await;
        self.shutdown.join_all().await;
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name())
            .field("node", &self.node.node_id())
            .field("up", &self.is_up())
            .finish()
    }
}

/// Register `stream` with `router` and start its read loop.
pub async fn attach<S>(router: &Router, stream: S, opts: LinkOptions) -> Result<Link, InterfaceError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    if opts.max_payload == 0 {
        return Err(InterfaceError::Configuration(format!(
            "{}: max_payload must be positive",
            opts.name
        )));
    }
    let (reader, writer) = tokio::io::split(stream);
    let endpoint = Arc::new(StreamLink::new(opts.name.clone(), writer));
    let dyn_ep: Arc<dyn Endpoint> = endpoint.clone();
    let node = match opts.node_id {
        Some(id) => router.register_endpoint_as(dyn_ep, opts.net_id, id)?,
        None => router.register_endpoint(dyn_ep, opts.net_id)?,
    };

    let shutdown = Arc::new(ShutdownToken::new());
    shutdown.set_up();

    let task = read_loop(
        router.clone(),
        node.clone(),
        reader,
        Arc::clone(&endpoint),
        Arc::clone(&shutdown),
        FrameAccumulator::with_max_payload(opts.max_payload),
    );
    shutdown.add_task(tokio::spawn(task)).await;

    info!(link = %opts.name, net_id = opts.net_id, node = ?opts.node_id, "link attached");
    Ok(Link {
        node,
        endpoint,
        shutdown,
    })
}

async fn read_loop<R>(
    router: Router,
    node: NodeHandle,
    mut reader: ReadHalf<R>,
    endpoint: Arc<StreamLink>,
    shutdown: Arc<ShutdownToken>,
    mut acc: FrameAccumulator,
) where
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    let name = endpoint.name().to_string();
    let mut stop_rx: watch::Receiver<bool> = shutdown.subscribe();
    let mut buf = vec![0u8; READ_BUFFER];

    'read: loop {
        if *stop_rx.borrow() {
            break;
        }
        let n = tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    debug!(link = %name, "stream closed (EOF)");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(link = %name, error = %e, "read error");
                    break;
                }
            },
            _ = stop_rx.changed() => break,
        };

        acc.extend(&buf[..n]);
        loop {
            match acc.next_frame() {
                Ok(Some(frame)) => match router.deliver(&node, &frame).await {
                    Ok(()) => {}
                    Err(RouterError::PeerGone) => break 'read,
                    // Already logged by the router; the stream stays usable.
                    Err(_) => {}
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(link = %name, error = %e, "lost frame sync, discarding buffer");
                    break;
                }
            }
        }
    }

    shutdown.signal_stop();
    endpoint.shutdown_writer().await;
    router.unregister_endpoint(&node).await;
    info!(link = %name, node = ?node.node_id(), "link down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transmit_writes_whole_frame() {
        let (a, mut b) = tokio::io::duplex(64);
        let link = StreamLink::new("t", a);
        link.transmit(vec![1, 2, 3, 4]).await.unwrap();

        let mut got = [0u8; 4];
        b.read_exact(&mut got).await.unwrap();
        assert_eq!(got, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn transmit_after_shutdown_is_disconnected() {
        let (a, _b) = tokio::io::duplex(64);
        let link = StreamLink::new("t", a);
        assert!(link.is_writable().await);
        link.shutdown_writer().await;
        assert!(!link.is_writable().await);
        assert!(matches!(
            link.transmit(vec![0; 4]).await,
            Err(EndpointError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn write_error_drops_writer() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let link = StreamLink::new("t", a);
        assert!(matches!(
            link.transmit(vec![0; 4]).await,
            Err(EndpointError::Io(_))
        ));
        assert!(!link.is_writable().await);
    }

    #[tokio::test]
    async fn attach_rejects_zero_payload_limit() {
        let router = Router::new(ipcr_router::RouterConfig::default()).unwrap();
        let (a, _b) = tokio::io::duplex(64);
        let opts = LinkOptions::new("z").net_id(1).max_payload(0);
        match attach(&router, a, opts).await {
            Err(InterfaceError::Configuration(msg)) => assert!(msg.starts_with("z:")),
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert_eq!(router.node_count(), 0);
    }

    #[test]
    fn options_builder() {
        let opts = LinkOptions::new("l").net_id(2).node_id(Some(7)).max_payload(128);
        assert_eq!(opts.name, "l");
        assert_eq!(opts.net_id, 2);
        assert_eq!(opts.node_id, Some(7));
        assert_eq!(opts.max_payload, 128);
    }
}
