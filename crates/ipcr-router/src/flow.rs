//! Per-destination transmit credit.
//!
//! Every remote (node, port) a local sender talks to gets a [`FlowEntry`].
//! A sender takes one credit per DATA message; once [`FLOW_HIGH`] credits are
//! outstanding it waits for the receiver's RESUME_TX. The send that brings the
//! count to [`FLOW_LOW`] asks the receiver for that RESUME_TX.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Mutex};

use ipcr_core::{ClientRecord, PacketType};
use tokio::sync::Notify;

use crate::error::RouterError;
use crate::sync::lock;

/// Outstanding messages at which senders start waiting.
pub const FLOW_HIGH: u32 = 10;

/// Outstanding count whose send requests confirmation.
pub const FLOW_LOW: u32 = 5;

/// Destination key: (node, port).
pub type FlowKey = (u32, u32);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlowState {
    pub pending: u32,
    pub tx_failed: bool,
}

#[derive(Default)]
pub struct FlowEntry {
    state: Mutex<FlowState>,
    resume: Notify,
}

impl FlowEntry {
    #[must_use]
    pub fn state(&self) -> FlowState {
        *lock(&self.state)
    }
}

/// Flow entries of one node.
#[derive(Default)]
pub struct FlowTable {
    entries: Mutex<HashMap<FlowKey, Arc<FlowEntry>>>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: FlowKey) -> Arc<FlowEntry> {
        Arc::clone(lock(&self.entries).entry(key).or_default())
    }

    #[must_use]
    pub fn get(&self, key: FlowKey) -> Option<Arc<FlowEntry>> {
        lock(&self.entries).get(&key).cloned()
    }

    /// Take one credit towards `key`, returning whether the message must
    /// request confirmation.
    ///
    /// Non-DATA messages bypass flow control. `gone` is consulted before
    /// every check; once it reports true the wait fails with
    /// [`RouterError::PeerGone`]. With `nonblocking`, a full window fails with
    /// [`RouterError::WouldBlock`] instead of waiting.
    pub async fn wait(
        &self,
        key: FlowKey,
        kind: PacketType,
        nonblocking: bool,
        gone: impl Fn() -> bool,
    ) -> Result<bool, RouterError> {
        if kind != PacketType::Data {
            return Ok(false);
        }

        let entry = self.entry(key);
        loop {
            let mut notified = pin!(entry.resume.notified());
            notified.as_mut().enable();

            if gone() {
                return Err(RouterError::PeerGone);
            }
            {
                let mut st = lock(&entry.state);
                if st.tx_failed {
                    st.tx_failed = false;
                    return Ok(true);
                }
                if st.pending < FLOW_HIGH {
                    st.pending += 1;
                    return Ok(st.pending == FLOW_LOW);
                }
            }
            if nonblocking {
                return Err(RouterError::WouldBlock);
            }
            notified.await;
        }
    }

    /// Apply a RESUME_TX: reset the credit towards the confirming client and
    /// wake its senders.
    pub fn resume(&self, client: ClientRecord) {
        let Some(entry) = self.get((client.node, client.port)) else {
            return;
        };
        lock(&entry.state).pending = 0;
        entry.resume.notify_waiters();
    }

    /// Record that a confirm-requesting send never reached the wire, so the
    /// next send asks again.
    pub fn mark_failed(&self, key: FlowKey) {
        if let Some(entry) = self.get(key) {
            lock(&entry.state).tx_failed = true;
        }
    }

    /// Wake every waiter so it re-checks its exit condition.
    pub fn wake_all(&self) {
        for entry in lock(&self.entries).values() {
            entry.resume.notify_waiters();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const KEY: FlowKey = (2, 0x4000);

    fn never_gone() -> bool {
        false
    }

    #[tokio::test]
    async fn non_data_bypasses_credit() {
        let flows = FlowTable::new();
        for _ in 0..50 {
            let confirm = flows
                .wait(KEY, PacketType::NewServer, true, never_gone)
                .await
                .unwrap();
            assert!(!confirm);
        }
        assert!(flows.is_empty());
    }

    #[tokio::test]
    async fn only_low_watermark_send_confirms() {
        let flows = FlowTable::new();
        let mut confirms = Vec::new();
        for _ in 0..FLOW_HIGH {
            confirms.push(flows.wait(KEY, PacketType::Data, true, never_gone).await.unwrap());
        }
        let flagged: Vec<usize> = confirms
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(flagged, vec![FLOW_LOW as usize]);
        assert!(matches!(
            flows.wait(KEY, PacketType::Data, true, never_gone).await,
            Err(RouterError::WouldBlock)
        ));
        assert_eq!(flows.get(KEY).unwrap().state().pending, FLOW_HIGH);
    }

    #[tokio::test]
    async fn resume_resets_and_wakes() {
        let flows = Arc::new(FlowTable::new());
        for _ in 0..FLOW_HIGH {
            flows.wait(KEY, PacketType::Data, false, never_gone).await.unwrap();
        }

        let waiter = {
            let flows = Arc::clone(&flows);
            tokio::spawn(async move { flows.wait(KEY, PacketType::Data, false, never_gone).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        flows.resume(ClientRecord {
            node: KEY.0,
            port: KEY.1,
        });
        let confirm = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!confirm);
        assert_eq!(flows.get(KEY).unwrap().state().pending, 1);
    }

    #[tokio::test]
    async fn resume_for_unknown_client_is_ignored() {
        let flows = FlowTable::new();
        flows.resume(ClientRecord { node: 9, port: 9 });
        assert!(flows.is_empty());
    }

    #[tokio::test]
    async fn failed_send_confirms_next() {
        let flows = FlowTable::new();
        flows.wait(KEY, PacketType::Data, true, never_gone).await.unwrap();
        flows.mark_failed(KEY);
        assert!(flows.wait(KEY, PacketType::Data, true, never_gone).await.unwrap());
        let st = flows.get(KEY).unwrap().state();
        assert!(!st.tx_failed);
        assert_eq!(st.pending, 1, "a retried confirm does not take credit");
    }

    #[tokio::test]
    async fn wake_all_fails_waiters_once_gone() {
        let flows = Arc::new(FlowTable::new());
        let gone = Arc::new(AtomicBool::new(false));
        let mut keys = Vec::new();
        for port in 0..3u32 {
            let key = (2, 0x4000 + port);
            for _ in 0..FLOW_HIGH {
                flows.wait(key, PacketType::Data, true, never_gone).await.unwrap();
            }
            keys.push(key);
        }

        let waiters: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let flows = Arc::clone(&flows);
                let gone = Arc::clone(&gone);
                tokio::spawn(async move {
                    flows
                        .wait(key, PacketType::Data, false, move || gone.load(Ordering::SeqCst))
                        .await
                })
            })
            .collect();
        tokio::task::yield_now().await;

        gone.store(true, Ordering::SeqCst);
        flows.wake_all();
        for w in waiters {
            let res = tokio::time::timeout(Duration::from_secs(1), w).await.unwrap().unwrap();
            assert!(matches!(res, Err(RouterError::PeerGone)));
        }
    }

    #[tokio::test]
    async fn gone_is_checked_before_credit() {
        let flows = FlowTable::new();
        let res = flows.wait(KEY, PacketType::Data, false, || true).await;
        assert!(matches!(res, Err(RouterError::PeerGone)));
    }
}
