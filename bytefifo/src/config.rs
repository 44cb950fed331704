//! Startup options

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mode::{Mode, Retention};

/// Options read once when the engine starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub mode: Mode,
    /// Only consulted in [`Mode::Multiple`]
    pub retention: Retention,
}

impl EngineConfig {
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            retention: Retention::default(),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Build a config from a mode name alone
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for anything but
    /// `default`, `single` or `multiple`.
    pub fn from_mode_name(name: &str) -> Result<Self> {
        Ok(Self::new(name.parse()?))
    }

    /// Parse a JSON object such as `{"mode": "single"}`
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the JSON is malformed, has unknown
    /// fields or names an unknown mode.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        serde_json::from_slice(json)
            .map_err(|e| Error::Configuration(format!("failed to parse engine options: {e}")))
    }

    /// Read JSON options until end of stream, then parse them
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] on read failures or bad options.
    pub fn from_reader(mut reader: impl embedded_io::Read) -> Result<Self> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            match embedded_io::Read::read(&mut reader, &mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    return Err(Error::Configuration(format!(
                        "failed to read engine options: {e:?}"
                    )))
                }
            }
        }
        Self::from_json(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = EngineConfig::from_json(b"{}").unwrap();
        assert_eq!(config.mode, Mode::Default);
        assert_eq!(config.retention, Retention::UntilTeardown);
    }

    #[test]
    fn test_full_options() {
        let config =
            EngineConfig::from_json(br#"{"mode": "multiple", "retention": "last_close"}"#).unwrap();
        assert_eq!(config, EngineConfig::new(Mode::Multiple).with_retention(Retention::LastClose));
    }

    #[test]
    fn test_unknown_mode_is_configuration_error() {
        let err = EngineConfig::from_json(br#"{"mode": "multi"}"#).unwrap_err();
        match err {
            Error::Configuration(msg) => assert!(msg.contains("multi"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            EngineConfig::from_json(br#"{"depth": 10}"#),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_from_reader() {
        let json: &[u8] = br#"{"mode": "single"}"#;
        let config = EngineConfig::from_reader(json).unwrap();
        assert_eq!(config.mode, Mode::Single);
    }

    #[test]
    fn test_from_mode_name() {
        assert_eq!(EngineConfig::from_mode_name("single").unwrap().mode, Mode::Single);
        assert!(EngineConfig::from_mode_name("bogus").is_err());
    }
}
