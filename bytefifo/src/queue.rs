//! Bounded FIFO byte queue
//!
//! The storage behind one buffer. Not synchronized: the owning
//! [`Channel`](crate::channel::Channel) keeps it behind its lock.

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Number of bytes one buffer can hold
pub const CAPACITY: usize = 1000;

/// Returned by [`ByteQueue::enqueue`] when no slot is left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

/// Bounded FIFO of single-byte elements
#[derive(Debug)]
pub struct ByteQueue {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl ByteQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    /// Storage is allocated on demand, not up front
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.bytes.len() >= self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots left
    #[must_use]
    pub fn space(&self) -> usize {
        self.capacity.saturating_sub(self.bytes.len())
    }

    /// Append one byte at the tail
    ///
    /// # Errors
    /// Returns [`Full`] when the queue holds `capacity` bytes.
    pub fn enqueue(&mut self, byte: u8) -> std::result::Result<(), Full> {
        if self.is_full() {
            return Err(Full);
        }
        self.bytes.push_back(byte);
        Ok(())
    }

    /// Append as many of `staged` as fit, all-or-nothing w.r.t. allocation
    ///
    /// Storage for the accepted prefix is reserved before any byte is queued,
    /// so an allocation failure leaves the queue unchanged.
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] if the reservation fails.
    pub fn commit(&mut self, staged: &[u8]) -> Result<usize> {
        let n = staged.len().min(self.space());
        if n == 0 {
            return Ok(0);
        }
        if let Err(e) = self.bytes.try_reserve(n) {
            log::warn!("queue.commit: cannot reserve {n} bytes: {e}");
            return Err(Error::ResourceExhausted);
        }
        self.bytes.extend(&staged[..n]);
        Ok(n)
    }

    /// Remove up to `n` bytes from the head, appending them to `out`
    ///
    /// Returns the number of bytes removed, which is less than `n` when the
    /// queue holds fewer.
    pub fn dequeue_upto(&mut self, n: usize, out: &mut Vec<u8>) -> usize {
        let take = n.min(self.bytes.len());
        out.extend(self.bytes.drain(..take));
        take
    }

    /// Drop every queued byte
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bytes.shrink_to_fit();
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_queue_is_empty() {
        let queue = ByteQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.space(), CAPACITY);
    }

    #[test]
    fn test_dequeue_keeps_arrival_order() {
        let mut queue = ByteQueue::new();
        for b in b"hello" {
            queue.enqueue(*b).unwrap();
        }

        let mut out = Vec::new();
        assert_eq!(queue.dequeue_upto(2, &mut out), 2);
        assert_eq!(out, b"he");
        assert_eq!(queue.dequeue_upto(10, &mut out), 3);
        assert_eq!(out, b"hello");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_refused_when_full() {
        let mut queue = ByteQueue::with_capacity(2);
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.enqueue(3), Err(Full));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_commit_accepts_prefix_that_fits() {
        let mut queue = ByteQueue::with_capacity(4);
        assert_eq!(queue.commit(b"abc").unwrap(), 3);
        assert_eq!(queue.commit(b"xyz").unwrap(), 1);
        assert_eq!(queue.commit(b"!").unwrap(), 0);

        let mut out = Vec::new();
        queue.dequeue_upto(4, &mut out);
        assert_eq!(out, b"abcx");
    }

    #[test]
    fn test_dequeue_on_empty_queue() {
        let mut queue = ByteQueue::new();
        let mut out = Vec::new();
        assert_eq!(queue.dequeue_upto(5, &mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_clear_releases_bytes() {
        let mut queue = ByteQueue::new();
        queue.commit(&[0u8; 100]).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.space(), CAPACITY);
    }
}
