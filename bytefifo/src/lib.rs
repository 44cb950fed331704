//! Bounded FIFO byte streams behind an open/read/write/close contract
//!
//! ```
//! use bytefifo::{ClientId, Engine, EngineConfig, Mode};
//!
//! let engine = Engine::new(EngineConfig::new(Mode::Multiple));
//! let session = engine.open(ClientId::new(100)).unwrap();
//! assert_eq!(session.write(b"AB").unwrap(), 2);
//!
//! let mut buf = [0u8; 10];
//! assert_eq!(session.read(&mut buf).unwrap(), 2);
//! assert_eq!(&buf[..2], b"AB");
//! ```

pub mod caller;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod mode;
pub mod queue;
pub mod registry;
pub mod session;

pub use caller::{ByteSink, ByteSource, CopyFault};
pub use channel::{Channel, ChannelStats};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use key::{ClientId, ClientKey, SessionId};
pub use mode::{Mode, Retention};
pub use queue::CAPACITY;
pub use registry::Registry;
pub use session::{Interrupter, Session};
