//! One buffer with its blocking coordination
//!
//! A [`Channel`] pairs a [`ByteQueue`] with the flags and the two wait sets
//! (condition variables) that let readers block on "has data" and writers
//! block on "has space".
//!
//! # Waiting protocol
//!
//! ```text
//! lock state
//! loop {
//!     check predicate        -- under the lock
//!     if satisfied: break
//!     wait on condvar        -- releases the lock while suspended,
//!                               re-acquires it before returning
//! }
//! mutate queue, update flags
//! notify the other side      -- still under the lock, no lost wakeups
//! unlock
//! ```
//!
//! A wake never implies the predicate holds. Every waiter re-checks after
//! waking, so spurious wakeups and wakes that lost the race for the lock are
//! harmless.
//!
//! Writers get one waiter woken per read and readers one waiter per write.
//! When a woken waiter leaves data (or space) behind, it passes the wake on
//! to the next waiter of the same side.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::key::ClientKey;
use crate::queue::ByteQueue;

/// Pending-interrupt mark of one session
#[derive(Debug, Default)]
pub struct InterruptFlag(AtomicBool);

impl InterruptFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consume the mark, returning whether it was raised
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of a buffer, for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub key: ClientKey,
    pub len: usize,
    pub capacity: usize,
    pub read_ready: bool,
    pub write_ready: bool,
    pub finished: bool,
    pub sessions: usize,
}

struct ChannelState {
    queue: ByteQueue,
    read_ready: bool,
    write_ready: bool,
    /// Producer side closed
    finished: bool,
    /// Bumped by every close, so a reader woken by one still sees it after a
    /// later open clears `finished`
    closes: u64,
    /// Removed from the registry
    detached: bool,
    sessions: usize,
}

/// Action to take when checking if a caller should wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitAction {
    /// Predicate is false, suspend
    Wait,
    /// Predicate holds, proceed
    DontWait,
    /// Empty and finished: end of stream (reads only)
    Closed,
    /// The buffer left the registry
    Detached,
}

impl ChannelState {
    fn read_action(&self, closes_seen: u64) -> WaitAction {
        if self.detached {
            WaitAction::Detached
        } else if !self.queue.is_empty() {
            WaitAction::DontWait
        } else if self.finished || self.closes != closes_seen {
            WaitAction::Closed
        } else {
            WaitAction::Wait
        }
    }

    fn write_action(&self) -> WaitAction {
        if self.detached {
            WaitAction::Detached
        } else if self.queue.is_full() {
            WaitAction::Wait
        } else {
            WaitAction::DontWait
        }
    }
}

/// A bounded FIFO buffer shared by the sessions that resolve to `key`
pub struct Channel {
    key: ClientKey,
    state: Mutex<ChannelState>,
    /// Read-wait set
    readable: Condvar,
    /// Write-wait set
    writable: Condvar,
}

impl Channel {
    #[must_use]
    pub fn new(key: ClientKey) -> Self {
        Self {
            key,
            state: Mutex::new(ChannelState {
                queue: ByteQueue::new(),
                read_ready: false,
                write_ready: true,
                finished: false,
                closes: 0,
                detached: false,
                sessions: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> ClientKey {
        self.key
    }

    /// Remove up to `max_len` bytes into `out`, blocking while empty
    ///
    /// Returns `Ok(0)` at end of stream (empty and finished). A zero
    /// `max_len` returns immediately.
    ///
    /// # Errors
    /// - [`Error::Interrupted`] if `interrupt` is raised while waiting
    /// - [`Error::NotFound`] if the buffer is detached
    pub fn read(
        &self,
        max_len: usize,
        out: &mut Vec<u8>,
        interrupt: &InterruptFlag,
    ) -> Result<usize> {
        if max_len == 0 {
            return Ok(0);
        }

        let mut state = self.state.lock();
        let closes_seen = state.closes;
        loop {
            match state.read_action(closes_seen) {
                WaitAction::DontWait => break,
                WaitAction::Closed => {
                    log::debug!("channel.read: {} finished and empty, end of stream", self.key);
                    return Ok(0);
                }
                WaitAction::Detached => return Err(Error::NotFound(self.key)),
                WaitAction::Wait => {
                    if interrupt.take() {
                        log::debug!("channel.read: {} wait interrupted", self.key);
                        return Err(Error::Interrupted);
                    }
                    state.read_ready = false;
                    log::debug!("channel.read: {} empty, waiting for data", self.key);
                    self.readable.wait(&mut state);
                }
            }
        }

        let n = state.queue.dequeue_upto(max_len, out);
        if state.queue.is_empty() {
            state.read_ready = false;
        } else {
            self.readable.notify_one();
        }
        state.write_ready = true;
        self.writable.notify_one();

        log::debug!("channel.read: {} gave {n} bytes, {} left", self.key, state.queue.len());
        Ok(n)
    }

    /// Commit as much of `staged` as fits, blocking while full
    ///
    /// Returns the number of bytes committed, which may be short of
    /// `staged.len()`. An empty `staged` returns 0 without waking anybody.
    ///
    /// # Errors
    /// - [`Error::Interrupted`] if `interrupt` is raised while waiting
    /// - [`Error::NotFound`] if the buffer is detached
    /// - [`Error::ResourceExhausted`] if queue storage can not grow; nothing
    ///   is committed in that case
    pub fn write(&self, staged: &[u8], interrupt: &InterruptFlag) -> Result<usize> {
        if staged.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock();
        loop {
            match state.write_action() {
                WaitAction::DontWait => break,
                WaitAction::Detached => return Err(Error::NotFound(self.key)),
                WaitAction::Wait | WaitAction::Closed => {
                    if interrupt.take() {
                        log::debug!("channel.write: {} wait interrupted", self.key);
                        return Err(Error::Interrupted);
                    }
                    state.write_ready = false;
                    log::debug!("channel.write: {} full, waiting for space", self.key);
                    self.writable.wait(&mut state);
                }
            }
        }

        let n = state.queue.commit(staged)?;
        state.read_ready = true;
        self.readable.notify_one();
        if state.queue.is_full() {
            state.write_ready = false;
        } else {
            self.writable.notify_one();
        }

        log::debug!("channel.write: {} took {n} bytes, now {}", self.key, state.queue.len());
        Ok(n)
    }

    /// Count a session in and clear the end-of-stream mark
    pub(crate) fn attach(&self) {
        let mut state = self.state.lock();
        state.sessions += 1;
        state.finished = false;
    }

    /// Count a session out, returning how many stay attached
    pub(crate) fn detach_session(&self) -> usize {
        let mut state = self.state.lock();
        if state.sessions == 0 {
            log::warn!("channel.detach_session: {} has no attached sessions", self.key);
        }
        state.sessions = state.sessions.saturating_sub(1);
        state.sessions
    }

    /// Mark the producer side closed and release every blocked reader
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        state.closes = state.closes.wrapping_add(1);
        self.readable.notify_all();
    }

    /// Wake every waiter so that each re-checks its predicate
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Drop every queued byte and fail all current and future waits
    pub(crate) fn detach(&self) {
        let mut state = self.state.lock();
        state.detached = true;
        state.queue.clear();
        state.read_ready = false;
        state.write_ready = false;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        let state = self.state.lock();
        ChannelStats {
            key: self.key,
            len: state.queue.len(),
            capacity: state.queue.capacity(),
            read_ready: state.read_ready,
            write_ready: state.write_ready,
            finished: state.finished,
            sessions: state.sessions,
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Channel(key={}, len={}, finished={}, detached={}, sessions={})",
            self.key,
            state.queue.len(),
            state.finished,
            state.detached,
            state.sessions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ClientId;
    use crate::queue::CAPACITY;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn channel() -> Arc<Channel> {
        Arc::new(Channel::new(ClientKey::Client(ClientId::new(1))))
    }

    #[test]
    fn test_write_then_read() {
        let ch = channel();
        let flag = InterruptFlag::default();
        assert_eq!(ch.write(b"AB", &flag).unwrap(), 2);

        let mut out = Vec::new();
        assert_eq!(ch.read(10, &mut out, &flag).unwrap(), 2);
        assert_eq!(out, b"AB");
    }

    #[test]
    fn test_flags_follow_queue_state() {
        let ch = channel();
        let flag = InterruptFlag::default();
        let stats = ch.stats();
        assert!(!stats.read_ready);
        assert!(stats.write_ready);

        ch.write(&[7u8; CAPACITY], &flag).unwrap();
        let stats = ch.stats();
        assert!(stats.read_ready);
        assert!(!stats.write_ready);
        assert_eq!(stats.len, CAPACITY);

        let mut out = Vec::new();
        ch.read(CAPACITY, &mut out, &flag).unwrap();
        let stats = ch.stats();
        assert!(!stats.read_ready);
        assert!(stats.write_ready);
        assert_eq!(stats.len, 0);
    }

    #[test]
    fn test_zero_length_calls_do_not_block() {
        let ch = channel();
        let flag = InterruptFlag::default();
        let mut out = Vec::new();
        assert_eq!(ch.read(0, &mut out, &flag).unwrap(), 0);
        assert_eq!(ch.write(b"", &flag).unwrap(), 0);
    }

    #[test]
    fn test_finished_and_empty_is_end_of_stream() {
        let ch = channel();
        ch.finish();
        let mut out = Vec::new();
        assert_eq!(ch.read(4, &mut out, &InterruptFlag::default()).unwrap(), 0);
    }

    #[test]
    fn test_finished_with_data_still_delivers() {
        let ch = channel();
        let flag = InterruptFlag::default();
        ch.write(b"tail", &flag).unwrap();
        ch.finish();

        let mut out = Vec::new();
        assert_eq!(ch.read(10, &mut out, &flag).unwrap(), 4);
        assert_eq!(ch.read(10, &mut out, &flag).unwrap(), 0);
        assert_eq!(out, b"tail");
    }

    #[test]
    fn test_attach_clears_finished() {
        let ch = channel();
        ch.finish();
        ch.attach();
        let stats = ch.stats();
        assert!(!stats.finished);
        assert_eq!(stats.sessions, 1);
        assert_eq!(ch.detach_session(), 0);
    }

    #[test]
    fn test_blocked_reader_sees_close_followed_by_open() {
        let ch = channel();
        ch.attach();
        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                let mut out = Vec::new();
                ch.read(8, &mut out, &InterruptFlag::default())
            })
        };

        thread::sleep(Duration::from_millis(50));
        // Reopen before the woken reader gets the lock back
        ch.finish();
        ch.attach();

        assert_eq!(reader.join().unwrap(), Ok(0));
        assert!(!ch.stats().finished);
    }

    #[test]
    fn test_pending_interrupt_fails_the_wait() {
        let ch = channel();
        let flag = InterruptFlag::default();
        flag.raise();

        let mut out = Vec::new();
        assert_eq!(ch.read(1, &mut out, &flag), Err(Error::Interrupted));
        assert!(!flag.is_raised());
    }

    #[test]
    fn test_pending_interrupt_ignored_when_no_wait_needed() {
        let ch = channel();
        let flag = InterruptFlag::default();
        ch.write(b"x", &flag).unwrap();
        flag.raise();

        let mut out = Vec::new();
        assert_eq!(ch.read(1, &mut out, &flag).unwrap(), 1);
        assert!(flag.is_raised());
    }

    #[test]
    fn test_blocked_reader_woken_by_writer() {
        let ch = channel();
        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                let mut out = Vec::new();
                let n = ch.read(8, &mut out, &InterruptFlag::default()).unwrap();
                (n, out)
            })
        };

        thread::sleep(Duration::from_millis(50));
        ch.write(b"wake", &InterruptFlag::default()).unwrap();

        let (n, out) = reader.join().unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, b"wake");
    }

    #[test]
    fn test_detach_fails_blocked_reader() {
        let ch = channel();
        let reader = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                let mut out = Vec::new();
                ch.read(8, &mut out, &InterruptFlag::default())
            })
        };

        thread::sleep(Duration::from_millis(50));
        ch.detach();

        assert_eq!(reader.join().unwrap(), Err(Error::NotFound(ch.key())));
    }
}
