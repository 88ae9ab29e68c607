//! # Core Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     AEROLINK_MAIN_THREAD_NAME, AEROLINK_BACKGROUND_THREADS,             │
//! │     AEROLINK_SHUTDOWN_TIMEOUT_MS, AEROLINK_ROLLBACK_TIMEOUT_MS          │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/aerolink/aerolink.toml (Linux)                            │
//! │     ~/Library/Application Support/io.aerolink.aerolink/... (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [executor]
//! main_thread_name = "aerolink-main"
//! background_threads = 4
//! shutdown_timeout_ms = 1000
//!
//! [settings]
//! rollback_timeout_ms = 5000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use aerolink_tasks::ExecutorConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Executor Section
// =============================================================================

/// `[executor]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_main_thread_name")]
    pub main_thread_name: String,

    /// Upper bound on worker threads used for background jobs.
    #[serde(default = "default_background_threads")]
    pub background_threads: usize,

    /// How long dispose waits for running background jobs.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_main_thread_name() -> String {
    aerolink_tasks::config::DEFAULT_MAIN_THREAD_NAME.to_string()
}

fn default_background_threads() -> usize {
    aerolink_tasks::config::DEFAULT_BACKGROUND_THREADS
}

fn default_shutdown_timeout() -> u64 {
    1000
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        ExecutorSettings {
            main_thread_name: default_main_thread_name(),
            background_threads: default_background_threads(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

// =============================================================================
// Settings Section
// =============================================================================

/// `[settings]` section: behavior of optimistic setting changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSettings {
    /// Time a user change waits for the device to confirm before it is
    /// rolled back.
    #[serde(default = "default_rollback_timeout")]
    pub rollback_timeout_ms: u64,
}

fn default_rollback_timeout() -> u64 {
    5000
}

impl Default for RollbackSettings {
    fn default() -> Self {
        RollbackSettings {
            rollback_timeout_ms: default_rollback_timeout(),
        }
    }
}

impl RollbackSettings {
    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_millis(self.rollback_timeout_ms)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete core configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub executor: ExecutorSettings,

    #[serde(default)]
    pub settings: RollbackSettings,
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (aerolink.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> CoreResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> CoreResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| CoreError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| CoreError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.executor.main_thread_name.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "main_thread_name must not be empty".into(),
            ));
        }

        if self.executor.background_threads == 0 {
            return Err(CoreError::InvalidConfig(
                "background_threads must be greater than 0".into(),
            ));
        }

        if self.settings.rollback_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "rollback_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("AEROLINK_MAIN_THREAD_NAME") {
            debug!(name = %name, "Overriding main thread name from environment");
            self.executor.main_thread_name = name;
        }

        if let Ok(threads) = std::env::var("AEROLINK_BACKGROUND_THREADS") {
            match threads.parse::<usize>() {
                Ok(n) => self.executor.background_threads = n,
                Err(_) => warn!(value = %threads, "Ignoring invalid AEROLINK_BACKGROUND_THREADS"),
            }
        }

        if let Ok(timeout) = std::env::var("AEROLINK_SHUTDOWN_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.executor.shutdown_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid AEROLINK_SHUTDOWN_TIMEOUT_MS"),
            }
        }

        if let Ok(timeout) = std::env::var("AEROLINK_ROLLBACK_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => {
                    debug!(ms, "Overriding rollback timeout from environment");
                    self.settings.rollback_timeout_ms = ms;
                }
                Err(_) => warn!(value = %timeout, "Ignoring invalid AEROLINK_ROLLBACK_TIMEOUT_MS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "aerolink", "aerolink")
            .map(|dirs| dirs.config_dir().join("aerolink.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Runtime parameters for [`aerolink_tasks::Executor::start`].
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_main_thread_name(self.executor.main_thread_name.clone())
            .with_background_threads(self.executor.background_threads)
            .with_shutdown_timeout(Duration::from_millis(self.executor.shutdown_timeout_ms))
    }

    pub fn rollback_timeout(&self) -> Duration {
        self.settings.rollback_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Serializes tests that read or write `AEROLINK_*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 4] = [
        "AEROLINK_MAIN_THREAD_NAME",
        "AEROLINK_BACKGROUND_THREADS",
        "AEROLINK_SHUTDOWN_TIMEOUT_MS",
        "AEROLINK_ROLLBACK_TIMEOUT_MS",
    ];

    /// Holds the env lock with every `AEROLINK_*` variable cleared, and
    /// clears them again on drop.
    struct CleanEnv {
        _guard: MutexGuard<'static, ()>,
    }

    impl CleanEnv {
        fn acquire() -> Self {
            let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for var in ENV_VARS {
                std::env::remove_var(var);
            }
            CleanEnv { _guard: guard }
        }
    }

    impl Drop for CleanEnv {
        fn drop(&mut self) {
            for var in ENV_VARS {
                std::env::remove_var(var);
            }
        }
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("aerolink.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.executor.main_thread_name, "aerolink-main");
        assert_eq!(config.rollback_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CoreConfig::default();
        config.executor.background_threads = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.executor.background_threads = 2;
        config.settings.rollback_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.settings.rollback_timeout_ms = 100;
        config.executor.main_thread_name = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CoreConfig = toml::from_str("[settings]\nrollback_timeout_ms = 250\n").unwrap();
        assert_eq!(config.rollback_timeout(), Duration::from_millis(250));
        assert_eq!(config.executor, ExecutorSettings::default());
    }

    #[test]
    fn test_executor_config_conversion() {
        let mut config = CoreConfig::default();
        config.executor.main_thread_name = "drone-main".into();
        config.executor.shutdown_timeout_ms = 50;
        let exec = config.executor_config();
        assert_eq!(exec.main_thread_name, "drone-main");
        assert_eq!(exec.shutdown_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("aerolink.toml");

        let mut config = CoreConfig::default();
        config.executor.background_threads = 7;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[executor]"));
        assert!(contents.contains("[settings]"));

        assert_eq!(CoreConfig::load(Some(path)).unwrap(), config);
    }

    #[test]
    fn test_load_reads_file() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[executor]\nbackground_threads = 3\n\n[settings]\nrollback_timeout_ms = 750\n",
        );

        let config = CoreConfig::load(Some(path)).unwrap();
        assert_eq!(config.executor.background_threads, 3);
        assert_eq!(config.executor.main_thread_name, "aerolink-main");
        assert_eq!(config.rollback_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[settings]\nrollback_timeout_ms = 750\n");
        std::env::set_var("AEROLINK_ROLLBACK_TIMEOUT_MS", "1200");
        std::env::set_var("AEROLINK_MAIN_THREAD_NAME", "drone-main");

        let config = CoreConfig::load(Some(path)).unwrap();
        assert_eq!(config.rollback_timeout(), Duration::from_millis(1200));
        assert_eq!(config.executor.main_thread_name, "drone-main");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[executor]\nshutdown_timeout_ms = 300\n\n[settings]\nrollback_timeout_ms = 750\n",
        );
        std::env::set_var("AEROLINK_ROLLBACK_TIMEOUT_MS", "soon");
        std::env::set_var("AEROLINK_SHUTDOWN_TIMEOUT_MS", "-1");
        std::env::set_var("AEROLINK_BACKGROUND_THREADS", "many");

        let config = CoreConfig::load(Some(path)).unwrap();
        assert_eq!(config.settings.rollback_timeout_ms, 750);
        assert_eq!(config.executor.shutdown_timeout_ms, 300);
        assert_eq!(config.executor.background_threads, 4);
    }

    #[test]
    fn test_env_override_is_validated() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[settings]\nrollback_timeout_ms = 750\n");
        std::env::set_var("AEROLINK_BACKGROUND_THREADS", "0");

        let err = CoreConfig::load(Some(path)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[settings]\nrollback_timeout_ms = 0\n");

        assert!(CoreConfig::load(Some(path.clone())).unwrap_err().is_config_error());
        assert_eq!(CoreConfig::load_or_default(Some(path)), CoreConfig::default());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let _env = CleanEnv::acquire();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[settings\nrollback_timeout_ms = \"fast\"\n");

        assert!(matches!(
            CoreConfig::load(Some(path.clone())),
            Err(CoreError::ConfigLoadFailed(_))
        ));
        assert_eq!(CoreConfig::load_or_default(Some(path)), CoreConfig::default());
    }
}
