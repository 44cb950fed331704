//! Client-keyed registry of buffers
//!
//! Ordered map from [`ClientKey`] to a shared [`Channel`]. The structural
//! lock is held only for the map operation itself; callers wait on the
//! returned channel after the lock is gone.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::key::ClientKey;

/// Registry of buffers, at most one per key
#[derive(Debug, Default)]
pub struct Registry {
    channels: Mutex<BTreeMap<ClientKey, Arc<Channel>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(BTreeMap::new()),
        }
    }

    /// Get the buffer for `key`, creating an empty one if absent
    pub fn add(&self, key: ClientKey) -> Arc<Channel> {
        let mut channels = self.channels.lock();
        let channel = channels.entry(key).or_insert_with(|| {
            log::debug!("registry.add: new buffer for {key}");
            Arc::new(Channel::new(key))
        });
        Arc::clone(channel)
    }

    /// Get or create the buffer for `key` and count one session in
    ///
    /// Both happen under the structural lock, so a concurrent
    /// [`Registry::release`] can not remove the buffer in between.
    pub fn attach(&self, key: ClientKey) -> Arc<Channel> {
        let mut channels = self.channels.lock();
        let channel = channels.entry(key).or_insert_with(|| {
            log::debug!("registry.attach: new buffer for {key}");
            Arc::new(Channel::new(key))
        });
        channel.attach();
        Arc::clone(channel)
    }

    /// Count one session out of `channel`, returning how many stay attached
    ///
    /// With `remove_when_unused`, a buffer left without sessions is erased,
    /// but only if it is still the one registered under `key`.
    pub fn release(
        &self,
        key: ClientKey,
        channel: &Arc<Channel>,
        remove_when_unused: bool,
    ) -> usize {
        let mut channels = self.channels.lock();
        let remaining = channel.detach_session();
        if remaining == 0 && remove_when_unused {
            let registered = channels
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, channel));
            if registered {
                channels.remove(&key);
                channel.detach();
                log::debug!("registry.release: {key} has no sessions left, removed");
            }
        }
        remaining
    }

    /// Look up the buffer for `key` without creating it
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no buffer is registered.
    pub fn get(&self, key: ClientKey) -> Result<Arc<Channel>> {
        self.channels
            .lock()
            .get(&key)
            .cloned()
            .ok_or(Error::NotFound(key))
    }

    /// Erase the buffer for `key` and release its bytes
    ///
    /// Waiters still blocked on the buffer are woken and fail with
    /// [`Error::NotFound`].
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no buffer is registered.
    pub fn remove(&self, key: ClientKey) -> Result<()> {
        let removed = self.channels.lock().remove(&key);
        match removed {
            Some(channel) => {
                log::debug!("registry.remove: {key}");
                channel.detach();
                Ok(())
            }
            None => {
                log::warn!("registry.remove: no buffer for {key}");
                Err(Error::NotFound(key))
            }
        }
    }

    /// Remove every buffer in key order, returning the keys drained
    pub fn drain(&self) -> Vec<ClientKey> {
        let channels = std::mem::take(&mut *self.channels.lock());
        channels
            .into_iter()
            .map(|(key, channel)| {
                log::debug!("registry.drain: {key}");
                channel.detach();
                key
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    /// Registered keys in order
    #[must_use]
    pub fn keys(&self) -> Vec<ClientKey> {
        self.channels.lock().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InterruptFlag;
    use crate::key::ClientId;

    fn client(id: u32) -> ClientKey {
        ClientKey::Client(ClientId::new(id))
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = Registry::new();
        let a = registry.add(client(1));
        let b = registry.add(client(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_does_not_create() {
        let registry = Registry::new();
        assert_eq!(registry.get(client(3)).unwrap_err(), Error::NotFound(client(3)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_then_get_is_not_found() {
        let registry = Registry::new();
        let channel = registry.add(client(1));
        channel.write(b"left over", &InterruptFlag::default()).unwrap();

        registry.remove(client(1)).unwrap();
        assert_eq!(registry.get(client(1)).unwrap_err(), Error::NotFound(client(1)));
        assert_eq!(channel.stats().len, 0);
        assert_eq!(registry.remove(client(1)), Err(Error::NotFound(client(1))));
    }

    #[test]
    fn test_attach_counts_sessions() {
        let registry = Registry::new();
        let a = registry.attach(client(1));
        let b = registry.attach(client(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.stats().sessions, 2);
    }

    #[test]
    fn test_release_removes_unused_buffer() {
        let registry = Registry::new();
        let channel = registry.attach(client(1));
        registry.attach(client(1));

        assert_eq!(registry.release(client(1), &channel, true), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.release(client(1), &channel, true), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_keeps_buffer_when_asked() {
        let registry = Registry::new();
        let channel = registry.attach(client(1));
        assert_eq!(registry.release(client(1), &channel, false), 0);
        assert!(Arc::ptr_eq(&registry.get(client(1)).unwrap(), &channel));
    }

    #[test]
    fn test_release_spares_a_replacement_buffer() {
        let registry = Registry::new();
        let old = registry.attach(ClientKey::Shared);
        registry.drain();
        let fresh = registry.add(ClientKey::Shared);

        assert_eq!(registry.release(ClientKey::Shared, &old, true), 0);
        assert!(Arc::ptr_eq(&registry.get(ClientKey::Shared).unwrap(), &fresh));
    }

    #[test]
    fn test_drain_in_key_order() {
        let registry = Registry::new();
        registry.add(client(9));
        registry.add(ClientKey::Shared);
        registry.add(client(2));

        assert_eq!(registry.drain(), vec![ClientKey::Shared, client(2), client(9)]);
        assert!(registry.is_empty());
    }
}
