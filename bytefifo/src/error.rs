//! Error type shared by every engine operation

use std::io;

use crate::key::ClientKey;

/// Errors reported by the engine
///
/// No variant is retried internally. Retrying is the caller's decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No buffer is registered for the key
    #[error("no buffer for {0}")]
    NotFound(ClientKey),

    /// The exclusive session slot is already taken
    #[error("device is busy")]
    Busy,

    /// Storage for queued bytes could not be allocated
    #[error("out of buffer memory")]
    ResourceExhausted,

    /// Copying into or out of caller storage failed
    #[error("bad caller buffer")]
    InvalidArgument,

    /// A blocking wait was cancelled by an interrupt
    #[error("interrupted while waiting")]
    Interrupted,

    /// The engine cannot start with the given options
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::NotFound(_) => embedded_io::ErrorKind::NotFound,
            Error::Busy => embedded_io::ErrorKind::AddrInUse,
            Error::ResourceExhausted => embedded_io::ErrorKind::OutOfMemory,
            Error::InvalidArgument | Error::Configuration(_) => {
                embedded_io::ErrorKind::InvalidInput
            }
            Error::Interrupted => embedded_io::ErrorKind::Interrupted,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match e {
            Error::NotFound(_) => io::ErrorKind::NotFound,
            Error::Busy => io::ErrorKind::ResourceBusy,
            Error::ResourceExhausted => io::ErrorKind::OutOfMemory,
            Error::InvalidArgument | Error::Configuration(_) => io::ErrorKind::InvalidInput,
            Error::Interrupted => io::ErrorKind::Interrupted,
        };
        io::Error::new(kind, e)
    }
}
