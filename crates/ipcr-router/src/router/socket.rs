//! Local datagram sockets.

use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ipcr_core::{ControlPacket, NODE_BROADCAST, PORT_CTRL, PacketType, SockAddr};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

use super::{Origin, Router};
use crate::error::RouterError;
use crate::message::{Message, copy_payload};
use crate::sync::lock;

/// Which peers a socket has sent to, deciding how its departure is announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Nothing sent yet.
    Init,
    /// Every send so far went to this node.
    Single(u32),
    /// Sends went to several nodes, or to the broadcast address.
    Multi,
}

impl PeerState {
    fn after_send(self, node: u32) -> Self {
        match self {
            _ if node == NODE_BROADCAST => PeerState::Multi,
            PeerState::Init => PeerState::Single(node),
            PeerState::Single(n) if n != node => PeerState::Multi,
            s => s,
        }
    }
}

/// The half of a socket reachable through the port table.
pub(crate) struct SocketShared {
    tx: mpsc::Sender<Message>,
    reset: AtomicBool,
    reset_notify: Notify,
}

impl SocketShared {
    pub(crate) fn push(&self, msg: Message) -> Result<(), RouterError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => RouterError::NoBufferSpace,
            TrySendError::Closed(_) => RouterError::UnknownDestination,
        })
    }

    fn raise_reset(&self) {
        self.reset.store(true, Ordering::SeqCst);
        self.reset_notify.notify_waiters();
    }

    fn take_reset(&self) -> bool {
        self.reset.swap(false, Ordering::SeqCst)
    }
}

struct SocketState {
    port: Option<u32>,
    peer: Option<SockAddr>,
    peers: PeerState,
}

/// A local endpoint addressed by (local node, port).
///
/// Dropping a bound socket releases its port and announces DEL_CLIENT from a
/// spawned task; [`Socket::close`] does the same inline.
pub struct Socket {
    router: Router,
    shared: Arc<SocketShared>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    state: Mutex<SocketState>,
    privileged: bool,
    nonblocking: AtomicBool,
}

impl Router {
    /// Open an unbound socket. Privileged sockets may bind ports below the
    /// ephemeral range.
    #[must_use]
    pub fn open_socket(&self, privileged: bool) -> Socket {
        let (tx, rx) = mpsc::channel(self.inner.config.socket_queue);
        Socket {
            router: self.clone(),
            shared: Arc::new(SocketShared {
                tx,
                reset: AtomicBool::new(false),
                reset_notify: Notify::new(),
            }),
            rx: tokio::sync::Mutex::new(rx),
            state: Mutex::new(SocketState {
                port: None,
                peer: None,
                peers: PeerState::Init,
            }),
            privileged,
            nonblocking: AtomicBool::new(false),
        }
    }

    /// Tell the network that `port` is gone.
    async fn announce_departure(&self, port: u32, peers: PeerState) {
        let local = self.local_node();
        let me = SockAddr::new(local, port);
        let msg = Message::control(
            ControlPacket::DelClient(me.into()),
            me,
            SockAddr::broadcast_ctrl(),
        );
        let origin = Origin::Local { nonblocking: false };

        match peers {
            PeerState::Single(n) if n != local => {
                if let Some(node) = self.inner.nodes.lookup(n)
                    && let Err(e) = self.node_enqueue(&node, msg.clone(), origin).await
                {
                    debug!(node = n, port, error = %e, "DEL_CLIENT not sent");
                }
                if let Err(e) = self.local_enqueue(msg, None) {
                    debug!(port, error = %e, "DEL_CLIENT not delivered locally");
                }
            }
            _ => self.broadcast_enqueue(msg, None, origin).await,
        }
    }

    /// Ask the sender of a confirm-flagged message for more.
    async fn send_resume_tx(&self, me: SockAddr, to: SockAddr) {
        let Some(node) = self.inner.nodes.lookup(to.node) else {
            debug!(dst = %to, "RESUME_TX target unknown");
            return;
        };
        let msg = Message::control(ControlPacket::ResumeTx(me.into()), me, to);
        if let Err(e) = self
            .node_enqueue(&node, msg, Origin::Local { nonblocking: false })
            .await
        {
            debug!(dst = %to, error = %e, "RESUME_TX not sent");
        }
    }

    /// Raise a network reset on every socket but `owner`.
    fn reset_sockets(&self, owner: &Arc<SocketShared>) {
        for (_, sock) in self.inner.ports.snapshot() {
            if !Arc::ptr_eq(&sock, owner) {
                sock.raise_reset();
            }
        }
    }
}

impl Socket {
    #[must_use]
    pub fn local_addr(&self) -> Option<SockAddr> {
        lock(&self.state)
            .port
            .map(|port| SockAddr::new(self.router.local_node(), port))
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SockAddr> {
        lock(&self.state).peer
    }

    #[must_use]
    pub fn peer_state(&self) -> PeerState {
        lock(&self.state).peers
    }

    /// In non-blocking mode sends fail with [`RouterError::WouldBlock`]
    /// instead of waiting for flow-control credit, and receives fail the same
    /// way on an empty queue.
    pub fn set_nonblocking(&self, nonblocking: bool) {
        self.nonblocking.store(nonblocking, Ordering::SeqCst);
    }

    fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::SeqCst)
    }

    fn autobind(&self) -> Result<u32, RouterError> {
        let mut st = lock(&self.state);
        if let Some(port) = st.port {
            return Ok(port);
        }
        let port = self
            .router
            .inner
            .ports
            .allocate(0, self.privileged, Arc::clone(&self.shared))?;
        st.port = Some(port);
        Ok(port)
    }

    /// Bind to `addr`, whose node must be the local node. Port 0 picks an
    /// ephemeral port. Rebinding announces the old port's departure; binding
    /// the control port resets every other socket.
    pub async fn bind(&self, addr: SockAddr) -> Result<(), RouterError> {
        if addr.node != self.router.local_node() {
            return Err(RouterError::InvalidAddress);
        }

        let (old, peers) = {
            let mut st = lock(&self.state);
            if addr.port != 0 && st.port == Some(addr.port) {
                return Ok(());
            }
            let port =
                self.router
                    .inner
                    .ports
                    .allocate(addr.port, self.privileged, Arc::clone(&self.shared))?;
            (st.port.replace(port), st.peers)
        };

        if let Some(old) = old {
            self.router.inner.ports.release(old);
            self.router.announce_departure(old, peers).await;
        }
        if addr.port == PORT_CTRL {
            info!("control port bound, resetting sockets");
            self.router.reset_sockets(&self.shared);
        }
        Ok(())
    }

    /// Set the default destination for [`send`](Self::send).
    pub fn connect(&self, addr: SockAddr) -> Result<(), RouterError> {
        self.autobind()?;
        lock(&self.state).peer = Some(addr);
        Ok(())
    }

    /// Send to the connected peer.
    pub async fn send(&self, payload: &[u8]) -> Result<usize, RouterError> {
        self.send_inner(None, payload).await
    }

    pub async fn send_to(&self, dst: SockAddr, payload: &[u8]) -> Result<usize, RouterError> {
        self.send_inner(Some(dst), payload).await
    }

    async fn send_inner(&self, dst: Option<SockAddr>, payload: &[u8]) -> Result<usize, RouterError> {
        if self.shared.take_reset() {
            return Err(RouterError::NetworkReset);
        }
        if payload.is_empty() {
            return Err(RouterError::InvalidArgument("empty payload"));
        }
        let port = self.autobind()?;
        let dst = match dst {
            Some(dst) => dst,
            None => self.peer_addr().ok_or(RouterError::NotConnected)?,
        };

        let router = &self.router;
        let local = router.local_node();
        let node = if dst.node == NODE_BROADCAST {
            if dst.port != PORT_CTRL {
                return Err(RouterError::NotConnected);
            }
            None
        } else if dst.node == local {
            None
        } else {
            Some(
                router
                    .inner
                    .nodes
                    .lookup(dst.node)
                    .ok_or(RouterError::ConnectionReset)?,
            )
        };

        let kind = if port == PORT_CTRL {
            ControlPacket::peek_cmd(payload)
                .map_err(|_| RouterError::InvalidArgument("bad control command"))?
        } else {
            PacketType::Data
        };

        {
            let mut st = lock(&self.state);
            st.peers = st.peers.after_send(dst.node);
        }

        let msg = Message {
            kind,
            src: SockAddr::new(local, port),
            dst,
            confirm_rx: false,
            payload: copy_payload(payload)?,
        };
        let origin = Origin::Local {
            nonblocking: self.is_nonblocking(),
        };
        match node {
            Some(node) => router.node_enqueue(&node, msg, origin).await?,
            None if dst.node == NODE_BROADCAST => {
                router.broadcast_enqueue(msg, Some(&self.shared), origin).await;
            }
            None => router.local_enqueue(msg, Some(&self.shared))?,
        }
        Ok(payload.len())
    }

    /// Receive the next message. A message that asked for confirmation
    /// triggers a RESUME_TX back to its sender once dequeued.
    pub async fn recv(&self) -> Result<Message, RouterError> {
        let nonblocking = self.is_nonblocking();
        let mut rx = if nonblocking {
            self.rx.try_lock().map_err(|_| RouterError::WouldBlock)?
        } else {
            self.rx.lock().await
        };

        let msg = loop {
            let mut reset = pin!(self.shared.reset_notify.notified());
            reset.as_mut().enable();
            if self.shared.take_reset() {
                return Err(RouterError::NetworkReset);
            }
            if nonblocking {
                match rx.try_recv() {
                    Ok(msg) => break msg,
                    Err(TryRecvError::Empty) => return Err(RouterError::WouldBlock),
                    Err(TryRecvError::Disconnected) => return Err(RouterError::Closed),
                }
            }
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => break msg,
                    None => return Err(RouterError::Closed),
                },
                () = &mut reset => {}
            }
        };
        drop(rx);

        if msg.confirm_rx
            && let Some(me) = self.local_addr()
        {
            self.router.send_resume_tx(me, msg.src).await;
        }
        Ok(msg)
    }

    /// Release the port and announce DEL_CLIENT before returning.
    pub async fn close(self) {
        if let Some((port, peers)) = self.unbind() {
            self.router.announce_departure(port, peers).await;
        }
    }

    fn unbind(&self) -> Option<(u32, PeerState)> {
        let (port, peers) = {
            let mut st = lock(&self.state);
            (st.port.take()?, st.peers)
        };
        self.router.inner.ports.release(port);
        Some((port, peers))
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let Some((port, peers)) = self.unbind() else {
            return;
        };
        let router = self.router.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move { router.announce_departure(port, peers).await });
            }
            Err(_) => debug!(port, "socket dropped outside a runtime, DEL_CLIENT skipped"),
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("local", &self.local_addr())
            .field("peer", &self.peer_addr())
            .finish()
    }
}
