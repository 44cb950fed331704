//! Caller-supplied storage
//!
//! Reads and writes move bytes one element at a time between the engine and
//! storage owned by the caller. Any single copy may fault, like a copy from
//! an unmapped user address would.

/// A single byte copy into or out of caller storage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFault;

/// Storage the engine copies written bytes from
pub trait ByteSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    /// Returns [`CopyFault`] if the byte at `offset` can not be read.
    fn get(&self, offset: usize) -> Result<u8, CopyFault>;
}

/// Storage the engine copies read bytes into
pub trait ByteSink {
    /// Largest number of bytes the sink accepts
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    /// Returns [`CopyFault`] if the byte at `offset` can not be stored.
    fn put(&mut self, offset: usize, byte: u8) -> Result<(), CopyFault>;
}

impl ByteSource for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn get(&self, offset: usize) -> Result<u8, CopyFault> {
        <[u8]>::get(self, offset).copied().ok_or(CopyFault)
    }
}

impl ByteSink for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn put(&mut self, offset: usize, byte: u8) -> Result<(), CopyFault> {
        let slot = self.get_mut(offset).ok_or(CopyFault)?;
        *slot = byte;
        Ok(())
    }
}
