//! In-memory endpoints for exercising a [`Router`](crate::Router) without a
//! transport.
//!
//! ```rust,ignore
//! let ep = RecordingEndpoint::new("peer");
//! let handle = router.register_endpoint_as(ep.clone(), 0, 2)?;
//! // ... send something to node 2 ...
//! let sent = ep.take_messages();
//! ```

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ipcr_core::WireVersion;
use tokio::sync::Notify;

use crate::endpoint::{BoxFuture, Endpoint};
use crate::error::EndpointError;
use crate::message::Message;
use crate::sync::lock;

/// An endpoint that keeps every frame it is asked to transmit.
pub struct RecordingEndpoint {
    name: String,
    frames: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
    can_transmit: bool,
    sent: Notify,
}

impl RecordingEndpoint {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, true))
    }

    /// An endpoint reporting it cannot transmit; registration refuses it.
    pub fn receive_only(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, false))
    }

    fn build(name: &str, can_transmit: bool) -> Self {
        Self {
            name: name.to_string(),
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            can_transmit,
            sent: Notify::new(),
        }
    }

    /// Make subsequent transmits fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock(&self.frames).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode and drain everything transmitted so far.
    pub fn take_messages(&self) -> Vec<Message> {
        std::mem::take(&mut *lock(&self.frames))
            .iter()
            .map(|raw| {
                let frame = ipcr_core::decode(raw).expect("router transmitted a malformed frame");
                Message::from_frame(&frame)
            })
            .collect()
    }

    /// Wait until at least `n` frames have been transmitted.
    pub async fn wait_for(&self, n: usize) {
        loop {
            let mut sent = pin!(self.sent.notified());
            sent.as_mut().enable();
            if self.len() >= n {
                return;
            }
            sent.await;
        }
    }
}

impl Endpoint for RecordingEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_transmit(&self) -> bool {
        self.can_transmit
    }

    fn transmit(&self, frame: Vec<u8>) -> BoxFuture<'_, Result<(), EndpointError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EndpointError::TransmitFailed("injected failure".into()));
            }
            lock(&self.frames).push(frame);
            self.sent.notify_waiters();
            Ok(())
        })
    }
}

/// Frame `msg` the way a peer router would put it on the wire.
pub fn frame(version: WireVersion, msg: &Message) -> Vec<u8> {
    ipcr_core::encode(&msg.header(version), &msg.payload).expect("message does not fit the header")
}
