//! Error types for the onboarding runner
//!
//! Only configuration and bootstrap problems are errors. A flow that fails
//! on the device is a normal outcome and is reported through
//! [`crate::flow::FlowResult`] instead.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the onboarding runner
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Invalid test mode '{0}'. Valid values are: UGS, BCS, ZTS and Matter")]
    InvalidMode(String),

    #[error("Matter mode requires --pairing_code_11d")]
    MissingPairingCode,

    #[error("Invalid pairing code '{0}': expected exactly 11 digits")]
    InvalidPairingCode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid screen script: {0}")]
    ScriptParse(String),

    // === Bootstrap Errors ===
    #[error("adb not found. Searched: {0}")]
    AdbNotFound(String),

    #[error("Failed to initialize logging: {0}")]
    LogInit(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },
}

impl Error {
    /// Create a file read error for a path
    pub fn file_read(path: &std::path::Path, error: &io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Whether this error is a configuration problem detected before any
    /// device interaction
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::InvalidMode(_)
                | Error::MissingPairingCode
                | Error::InvalidPairingCode(_)
                | Error::Config(_)
                | Error::ConfigParse(_)
                | Error::ScriptParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_errors_are_not_config() {
        assert!(Error::MissingPairingCode.is_config());
        assert!(Error::ScriptParse("bad".to_string()).is_config());
        assert!(!Error::AdbNotFound("PATH".to_string()).is_config());
        assert!(!Error::LogInit("busy".to_string()).is_config());
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(!Error::file_read(std::path::Path::new("x.toml"), &io).is_config());
    }
}
