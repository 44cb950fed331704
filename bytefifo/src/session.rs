//! Open sessions
//!
//! A [`Session`] is what `open` hands out. It remembers the key its mode
//! resolved to and looks the buffer up again on every call, so a session
//! outliving its buffer gets [`Error::NotFound`] instead of a stale buffer.
//!
//! # Thread Safety
//!
//! `read` and `write` take `&self`: one session may be shared between a
//! reading and a writing thread (e.g. via `Arc`). Blocking calls never hold
//! the registry lock, and never hold the buffer lock while suspended or while
//! copying caller storage.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::caller::{ByteSink, ByteSource};
use crate::channel::{Channel, InterruptFlag};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::key::{ClientId, ClientKey, SessionId};
use crate::queue::CAPACITY;

pub struct Session {
    engine: Engine,
    client: ClientId,
    key: ClientKey,
    id: SessionId,
    /// Buffer counted at open, released at close
    attached: Arc<Channel>,
    interrupt: Arc<InterruptFlag>,
    closed: bool,
}

impl Session {
    pub(crate) fn new(
        engine: Engine,
        client: ClientId,
        key: ClientKey,
        id: SessionId,
        attached: Arc<Channel>,
    ) -> Self {
        Self {
            engine,
            client,
            key,
            id,
            attached,
            interrupt: Arc::new(InterruptFlag::default()),
            closed: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Registry key this session resolves to
    #[must_use]
    pub fn key(&self) -> ClientKey {
        self.key
    }

    /// Read up to `buf.len()` bytes, blocking while the buffer is empty
    ///
    /// Returns:
    /// - positive value: number of bytes read
    /// - 0: end of stream (the buffer is finished and empty) or an empty `buf`
    ///
    /// # Errors
    /// See [`Session::read_into`].
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_into(buf)
    }

    /// Read up to `sink.len()` bytes into caller storage
    ///
    /// # Errors
    /// - [`Error::NotFound`] if the buffer is gone
    /// - [`Error::Interrupted`] if the wait was interrupted; nothing is read
    /// - [`Error::InvalidArgument`] if storing into `sink` faults. Bytes
    ///   removed from the buffer by this call stay consumed.
    pub fn read_into<S: ByteSink + ?Sized>(&self, sink: &mut S) -> Result<usize> {
        let max_len = sink.len();
        let channel = self.engine.registry().get(self.key)?;

        let mut taken = Vec::with_capacity(max_len.min(CAPACITY));
        let n = channel.read(max_len, &mut taken, &self.interrupt)?;
        drop(channel);

        for (offset, byte) in taken.into_iter().enumerate() {
            if sink.put(offset, byte).is_err() {
                warn!(session = %self.id, offset, read = n, "session: can't put data to caller");
                return Err(Error::InvalidArgument);
            }
        }

        debug!(session = %self.id, bytes = n, "session: read");
        Ok(n)
    }

    /// Write bytes, blocking while the buffer is full
    ///
    /// Returns the number of bytes accepted. It can be short of `data.len()`
    /// when the buffer fills up; the caller writes the rest again.
    ///
    /// # Errors
    /// See [`Session::write_from`].
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.write_from(data)
    }

    /// Write bytes taken from caller storage
    ///
    /// Bytes are staged out of `src` before the buffer is touched, so every
    /// failure commits nothing.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if reading from `src` faults
    /// - [`Error::ResourceExhausted`] if staging or queue storage can not be
    ///   allocated
    /// - [`Error::NotFound`] if the buffer is gone (`multiple` mode)
    /// - [`Error::Interrupted`] if the wait was interrupted
    pub fn write_from<S: ByteSource + ?Sized>(&self, src: &S) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }

        // More than a full buffer can never be accepted in one call
        let len = src.len().min(CAPACITY);
        let mut staged = Vec::new();
        staged
            .try_reserve_exact(len)
            .map_err(|_| Error::ResourceExhausted)?;
        for offset in 0..len {
            match src.get(offset) {
                Ok(byte) => staged.push(byte),
                Err(_) => {
                    warn!(session = %self.id, offset, "session: can't get data from caller");
                    return Err(Error::InvalidArgument);
                }
            }
        }

        let registry = self.engine.registry();
        let channel = if self.engine.mode().is_shared() {
            registry.add(self.key)
        } else {
            registry.get(self.key)?
        };

        let n = channel.write(&staged, &self.interrupt)?;
        debug!(session = %self.id, bytes = n, requested = src.len(), "session: write");
        Ok(n)
    }

    /// Handle that can cancel this session's blocking waits from elsewhere
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            engine: self.engine.clone(),
            key: self.key,
            flag: Arc::clone(&self.interrupt),
        }
    }

    /// Close the session
    ///
    /// Dropping an open session closes it too.
    pub fn close(mut self) {
        self.close_inner();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn close_inner(&mut self) {
        if self.closed {
            warn!(session = %self.id, "session: close called on already closed session");
            return;
        }
        self.closed = true;
        self.engine.close_session(self.key, self.id, &self.attached);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session(id={}, client={}, key={}, closed={})",
            self.id,
            self.client.id(),
            self.key,
            self.closed
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close_inner();
        }
    }
}

impl embedded_io::ErrorType for Session {
    type Error = Error;
}

impl embedded_io::Read for Session {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Session::read(self, buf)
    }
}

impl embedded_io::Write for Session {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Session::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Cancels blocking waits of one session
///
/// The interrupted call returns [`Error::Interrupted`] and leaves the buffer
/// untouched. An interrupt raised while the session is not waiting fails the
/// next call that would have to wait.
#[derive(Clone)]
pub struct Interrupter {
    engine: Engine,
    key: ClientKey,
    flag: Arc<InterruptFlag>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.flag.raise();
        // Waiters re-check their predicates; only the flagged session gives up
        if let Ok(channel) = self.engine.registry().get(self.key) {
            channel.wake_all();
        }
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interrupter(key={}, raised={})", self.key, self.flag.is_raised())
    }
}
