//! Local port table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ipcr_core::PORT_CTRL;
use ipcr_core::constants::{MAX_EPHEMERAL_PORT, MIN_EPHEMERAL_PORT};

use crate::error::RouterError;
use crate::sync::{read, write};

/// Storage slot for a port. The control port lives in slot 0, which no
/// ordinary allocation can reach.
fn slot(port: u32) -> Option<u32> {
    match port {
        PORT_CTRL => Some(0),
        0 => None,
        p => Some(p),
    }
}

fn port_of(slot: u32) -> u32 {
    if slot == 0 { PORT_CTRL } else { slot }
}

struct Inner<T> {
    slots: HashMap<u32, Arc<T>>,
    /// Where the next ephemeral search starts.
    cursor: u32,
}

/// Maps bound local ports to their owners.
///
/// Each bound port holds one `Arc` of its owner until released.
pub struct PortTable<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> PortTable<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                slots: HashMap::new(),
                cursor: MIN_EPHEMERAL_PORT,
            }),
        }
    }

    /// Bind `owner` to `requested`, or to a free ephemeral port when
    /// `requested` is 0. Returns the port actually bound.
    pub fn allocate(
        &self,
        requested: u32,
        privileged: bool,
        owner: Arc<T>,
    ) -> Result<u32, RouterError> {
        let mut inner = write(&self.inner);

        if requested == 0 {
            let span = MAX_EPHEMERAL_PORT - MIN_EPHEMERAL_PORT + 1;
            let start = inner.cursor;
            for i in 0..span {
                let port = MIN_EPHEMERAL_PORT + (start - MIN_EPHEMERAL_PORT + i) % span;
                if !inner.slots.contains_key(&port) {
                    inner.slots.insert(port, owner);
                    inner.cursor = if port == MAX_EPHEMERAL_PORT {
                        MIN_EPHEMERAL_PORT
                    } else {
                        port + 1
                    };
                    return Ok(port);
                }
            }
            return Err(RouterError::PortInUse);
        }

        if requested < MIN_EPHEMERAL_PORT && !privileged {
            return Err(RouterError::PermissionDenied);
        }

        let key = slot(requested).ok_or(RouterError::InvalidArgument("port 0"))?;
        if inner.slots.contains_key(&key) {
            return Err(RouterError::PortInUse);
        }
        inner.slots.insert(key, owner);
        Ok(requested)
    }

    #[must_use]
    pub fn lookup(&self, port: u32) -> Option<Arc<T>> {
        let key = slot(port)?;
        read(&self.inner).slots.get(&key).cloned()
    }

    /// Unbind `port`, returning the table's reference to its owner.
    pub fn release(&self, port: u32) -> Option<Arc<T>> {
        let key = slot(port)?;
        write(&self.inner).slots.remove(&key)
    }

    /// Every bound (port, owner) pair.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(u32, Arc<T>)> {
        read(&self.inner)
            .slots
            .iter()
            .map(|(k, v)| (port_of(*k), Arc::clone(v)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner).slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.inner).slots.is_empty()
    }
}

impl<T> Default for PortTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
