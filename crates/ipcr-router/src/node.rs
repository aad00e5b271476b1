//! Remote nodes and the node registry.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use ipcr_core::NODE_UNASSIGNED;

use crate::endpoint::Endpoint;
use crate::error::RouterError;
use crate::flow::FlowTable;
use crate::message::Message;
use crate::sync::{lock, read, write};

/// One remote processor reachable through a registered endpoint.
pub struct Node {
    nid: AtomicU32,
    net_id: u32,
    name: String,
    hello_sent: AtomicBool,
    /// Transmission lock. `None` once the endpoint is unregistered.
    endpoint: tokio::sync::Mutex<Option<Arc<dyn Endpoint>>>,
    /// Mirrors `endpoint.is_some()` for readers that cannot await.
    connected: AtomicBool,
    pub(crate) flows: FlowTable,
    backlog: Mutex<VecDeque<Message>>,
    backlog_capacity: usize,
    /// Held by whichever delivering caller is draining `backlog`.
    pub(crate) drain: tokio::sync::Mutex<()>,
}

impl Node {
    pub(crate) fn new(endpoint: Arc<dyn Endpoint>, net_id: u32, backlog_capacity: usize) -> Self {
        Self {
            nid: AtomicU32::new(NODE_UNASSIGNED),
            net_id,
            name: endpoint.name().to_string(),
            hello_sent: AtomicBool::new(false),
            endpoint: tokio::sync::Mutex::new(Some(endpoint)),
            connected: AtomicBool::new(true),
            flows: FlowTable::new(),
            backlog: Mutex::new(VecDeque::new()),
            backlog_capacity,
            drain: tokio::sync::Mutex::new(()),
        }
    }

    /// The node's own id, if learned.
    #[must_use]
    pub fn nid(&self) -> Option<u32> {
        match self.nid.load(Ordering::SeqCst) {
            NODE_UNASSIGNED => None,
            nid => Some(nid),
        }
    }

    #[must_use]
    pub fn net_id(&self) -> u32 {
        self.net_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn hello_sent(&self) -> bool {
        self.hello_sent.load(Ordering::SeqCst)
    }

    pub(crate) fn set_hello_sent(&self) {
        self.hello_sent.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Set the node's own id if it has none yet.
    fn claim_nid(&self, nid: u32) {
        let _ = self
            .nid
            .compare_exchange(NODE_UNASSIGNED, nid, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub(crate) async fn endpoint(
        &self,
    ) -> tokio::sync::MutexGuard<'_, Option<Arc<dyn Endpoint>>> {
        self.endpoint.lock().await
    }

    /// Clear the endpoint under the transmission lock. Returns false if it
    /// was already cleared.
    pub(crate) async fn detach(&self) -> bool {
        let mut ep = self.endpoint.lock().await;
        let was = ep.take().is_some();
        self.connected.store(false, Ordering::SeqCst);
        was
    }

    /// Queue an inbound message for in-order processing.
    pub(crate) fn push_inbound(&self, msg: Message) -> Result<(), RouterError> {
        let mut q = lock(&self.backlog);
        if q.len() >= self.backlog_capacity {
            return Err(RouterError::NoBufferSpace);
        }
        q.push_back(msg);
        Ok(())
    }

    pub(crate) fn pop_inbound(&self) -> Option<Message> {
        lock(&self.backlog).pop_front()
    }

    pub(crate) fn has_inbound(&self) -> bool {
        !lock(&self.backlog).is_empty()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("nid", &self.nid())
            .field("net_id", &self.net_id)
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// A transport's reference to its registration.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    pub(crate) node: Arc<Node>,
}

impl NodeHandle {
    #[must_use]
    pub fn node_id(&self) -> Option<u32> {
        self.node.nid()
    }

    #[must_use]
    pub fn net_id(&self) -> u32 {
        self.node.net_id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.node.name()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.node.is_connected()
    }

    #[must_use]
    pub fn hello_sent(&self) -> bool {
        self.node.hello_sent()
    }
}

/// Node id to node map plus the list of every registered node.
///
/// One node may answer for several ids when it bridges distant processors.
#[derive(Default)]
pub struct NodeRegistry {
    by_id: RwLock<HashMap<u32, Arc<Node>>>,
    all: RwLock<Vec<Arc<Node>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, node: Arc<Node>) {
        write(&self.all).push(node);
    }

    #[must_use]
    pub fn lookup(&self, nid: u32) -> Option<Arc<Node>> {
        read(&self.by_id).get(&nid).cloned()
    }

    /// Map `nid` to `node`. The first mapping for an id wins, and the node
    /// keeps the first id it was given.
    pub fn assign(&self, node: &Arc<Node>, nid: u32) {
        if nid == NODE_UNASSIGNED {
            return;
        }
        write(&self.by_id)
            .entry(nid)
            .or_insert_with(|| Arc::clone(node));
        node.claim_nid(nid);
    }

    /// Every id currently resolving to `node`.
    #[must_use]
    pub fn ids_of(&self, node: &Arc<Node>) -> Vec<u32> {
        let mut ids: Vec<u32> = read(&self.by_id)
            .iter()
            .filter(|(_, n)| Arc::ptr_eq(n, node))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drop every index entry for `node`.
    pub fn remove(&self, node: &Arc<Node>) {
        write(&self.by_id).retain(|_, n| !Arc::ptr_eq(n, node));
        write(&self.all).retain(|n| !Arc::ptr_eq(n, node));
    }

    /// Registered nodes, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Node>> {
        read(&self.all).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.all).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.all).is_empty()
    }
}
