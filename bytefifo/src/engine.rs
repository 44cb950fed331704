//! The engine object
//!
//! Everything process-wide lives here: the configured mode, the buffer
//! registry, the `single`-mode gate and the session id generator. An
//! [`Engine`] is a cheap handle; clones share the same state, and every
//! [`Session`] keeps one.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelStats};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::key::{ClientId, ClientKey, IdGen, SessionId};
use crate::mode::{Gate, Mode, Retention};
use crate::registry::Registry;
use crate::session::Session;

struct Inner {
    config: EngineConfig,
    registry: Registry,
    gate: Gate,
    ids: IdGen,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            let drained = self.registry.drain();
            debug!(buffers = drained.len(), "engine: released remaining buffers");
        }
    }
}

/// Handle to a running FIFO engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        info!(mode = %config.mode, retention = ?config.retention, "engine: started");
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Registry::new(),
                gate: Gate::new(),
                ids: IdGen::new(),
            }),
        }
    }

    /// Start an engine from a mode name
    ///
    /// # Errors
    /// Returns [`Error::Configuration`](crate::Error::Configuration) for an
    /// unknown mode. Nothing is allocated in that case.
    pub fn from_mode_name(name: &str) -> Result<Self> {
        Ok(Self::new(EngineConfig::from_mode_name(name)?))
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.config.mode
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.inner.config
    }

    /// Open a session for `client`
    ///
    /// Attaches the session to the buffer its mode resolves to, creating the
    /// buffer if needed.
    ///
    /// # Errors
    /// Returns [`Error::Busy`](crate::Error::Busy) in `single` mode while
    /// another session is open. This never waits.
    pub fn open(&self, client: ClientId) -> Result<Session> {
        let mode = self.mode();

        if mode == Mode::Single {
            if let Err(e) = self.inner.gate.try_acquire() {
                warn!(client = client.id(), "engine: open refused, device busy");
                return Err(e);
            }
        }

        let key = mode.key_for(client);
        let channel = self.inner.registry.attach(key);

        let id = self.inner.ids.get_next();
        info!(session = %id, client = client.id(), %key, "engine: session opened");
        Ok(Session::new(self.clone(), client, key, id, channel))
    }

    /// Close hook of a session
    ///
    /// Shared modes mark the buffer finished so blocked readers see end of
    /// stream, and destroy it once its last session is gone. In `multiple`
    /// mode the retention policy decides. `single` also releases the gate.
    pub(crate) fn close_session(&self, key: ClientKey, id: SessionId, channel: &Arc<Channel>) {
        let mode = self.mode();

        if mode.is_shared() {
            channel.finish();
        }
        let remove = mode.is_shared() || self.inner.config.retention == Retention::LastClose;
        let remaining = self.inner.registry.release(key, channel, remove);

        if mode == Mode::Single {
            self.inner.gate.release();
        }
        info!(session = %id, %key, remaining, "engine: session closed");
    }

    /// Drain every buffer in key order
    ///
    /// Blocked readers and writers are woken and fail with
    /// [`Error::NotFound`](crate::Error::NotFound). Sessions stay usable: in
    /// shared modes the next write registers a fresh buffer.
    pub fn shutdown(&self) {
        let drained = self.inner.registry.drain();
        info!(buffers = drained.len(), "engine: shut down");
    }

    /// Snapshot of the buffer registered under `key`
    ///
    /// # Errors
    /// Returns [`Error::NotFound`](crate::Error::NotFound) if there is none.
    pub fn stats(&self, key: ClientKey) -> Result<ChannelStats> {
        Ok(self.inner.registry.get(key)?.stats())
    }

    /// Number of registered buffers
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Engine(mode={}, retention={:?}, buffers={:?}, gate_held={})",
            self.inner.config.mode,
            self.inner.config.retention,
            self.inner.registry.keys(),
            self.inner.gate.is_held()
        )
    }
}
