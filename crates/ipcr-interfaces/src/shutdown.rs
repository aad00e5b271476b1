//! Stop signal and task bookkeeping shared by a link and its background tasks.
//!
//! A link owns one [`ShutdownToken`]. Its read loop and any supervisor task
//! subscribe to the stop signal; the link flips the `up` flag as the
//! underlying stream comes and goes.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ShutdownToken {
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    up: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownToken {
    /// New token: not stopped, link down.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            stop_tx,
            stop_rx,
            up: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Receiver to watch in a task's `tokio::select!` loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Resolve once the stop signal has been raised.
    pub async fn stopped(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so `wait_for` only fails if it is dropped.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    pub fn set_up(&self) {
        self.up.store(true, Ordering::SeqCst);
    }

    pub fn set_down(&self) {
        self.up.store(false, Ordering::SeqCst);
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Track a background task so [`join_all`](Self::join_all) can await it.
    pub async fn add_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Raise the stop signal and mark the link down. Idempotent.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.set_down();
    }

    /// Await every tracked task, emptying the list. Panicked tasks are ignored.
    pub async fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}
