//! # Core Error Types
//!
//! Most "failures" in this crate are not errors at all: an absent
//! component, a released reference and a rejected setting change are
//! ordinary return values. What remains is lifecycle and configuration.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Core Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Lifecycle      │  │  Configuration  │  │  Executor               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  SessionClosed  │  │  InvalidConfig  │  │  Executor(..)           │ │
//! │  │                 │  │  ConfigLoad/Save│  │  (threading contract)   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use aerolink_tasks::ExecutorError;
use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// A reference was requested from a session that is already closed.
    #[error("session is closed")]
    SessionClosed,

    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Executor
    // =========================================================================
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::ConfigSaveFailed(err.to_string())
    }
}

impl CoreError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidConfig(_) | CoreError::ConfigLoadFailed(_) | CoreError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error signals a violated threading contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, CoreError::Executor(err) if err.is_contract_violation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert!(CoreError::InvalidConfig("x".into()).is_config_error());
        assert!(!CoreError::SessionClosed.is_config_error());

        let err: CoreError = ExecutorError::NotOnMainThread.into();
        assert!(err.is_contract_violation());
        assert!(!CoreError::from(ExecutorError::Disposed).is_contract_violation());
    }

    #[test]
    fn test_toml_error_maps_to_load_failure() {
        let err: CoreError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(matches!(err, CoreError::ConfigLoadFailed(_)));
    }
}
