//! Access modes
//!
//! The mode is chosen once at startup and never changes. It decides which
//! registry key a client resolves to and whether `open` is gated.
//!
//! | mode       | key               | admission          |
//! |------------|-------------------|--------------------|
//! | `default`  | shared sentinel   | everybody          |
//! | `single`   | shared sentinel   | one session at once|
//! | `multiple` | the client's own  | everybody          |

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

use crate::error::Error;
use crate::key::{ClientId, ClientKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Mode {
    /// One buffer, multiple access
    #[default]
    Default,
    /// One buffer, single access
    Single,
    /// One buffer per client
    Multiple,
}

impl Mode {
    /// Registry key a client of this mode resolves to
    #[must_use]
    pub fn key_for(self, client: ClientId) -> ClientKey {
        match self {
            Mode::Default | Mode::Single => ClientKey::Shared,
            Mode::Multiple => ClientKey::Client(client),
        }
    }

    #[must_use]
    pub fn is_shared(self) -> bool {
        !matches!(self, Mode::Multiple)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Default => "default",
            Mode::Single => "single",
            Mode::Multiple => "multiple",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Mode::Default),
            "single" => Ok(Mode::Single),
            "multiple" => Ok(Mode::Multiple),
            other => Err(Error::Configuration(format!(
                "wrong mode '{other}', only default/single/multiple are supported"
            ))),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// When a per-client buffer of `multiple` mode is destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Keep the buffer, and its bytes, until engine shutdown
    #[default]
    UntilTeardown,
    /// Destroy the buffer when the client's last session closes
    LastClose,
}

/// Non-blocking exclusivity gate for `single` mode
#[derive(Debug, Default)]
pub struct Gate {
    held: AtomicBool,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate without waiting
    ///
    /// # Errors
    /// Returns [`Error::Busy`] if it is already held.
    pub fn try_acquire(&self) -> Result<(), Error> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::Busy)
    }

    pub fn release(&self) {
        if !self.held.swap(false, Ordering::AcqRel) {
            log::warn!("gate.release: gate was not held");
        }
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}
