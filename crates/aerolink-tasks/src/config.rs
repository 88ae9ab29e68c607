//! # Executor Configuration
//!
//! Plain runtime parameters for [`crate::Executor::start`]. Loading them from
//! files and the environment is the job of the embedding application.

use std::time::Duration;

/// Default name given to the main-loop thread.
pub const DEFAULT_MAIN_THREAD_NAME: &str = "aerolink-main";

/// Default upper bound on background worker threads.
pub const DEFAULT_BACKGROUND_THREADS: usize = 4;

/// Default time `dispose` waits for running background jobs.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runtime parameters of an [`crate::Executor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Name of the main-loop thread (shows up in logs and debuggers).
    pub main_thread_name: String,

    /// Maximum number of worker threads used by `run_in_background`.
    pub background_threads: usize,

    /// How long `dispose` waits for workers still running a job.
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            main_thread_name: DEFAULT_MAIN_THREAD_NAME.to_string(),
            background_threads: DEFAULT_BACKGROUND_THREADS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    /// Sets the main-loop thread name.
    pub fn with_main_thread_name(mut self, name: impl Into<String>) -> Self {
        self.main_thread_name = name.into();
        self
    }

    /// Sets the worker thread limit (clamped to at least one).
    pub fn with_background_threads(mut self, threads: usize) -> Self {
        self.background_threads = threads.max(1);
        self
    }

    /// Sets the dispose timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Name prefix for worker threads.
    pub(crate) fn worker_thread_name(&self) -> String {
        format!("{}-worker", self.main_thread_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.main_thread_name, "aerolink-main");
        assert_eq!(config.background_threads, 4);
        assert_eq!(config.worker_thread_name(), "aerolink-main-worker");
    }

    #[test]
    fn test_builder_clamps_threads() {
        let config = ExecutorConfig::default()
            .with_main_thread_name("ui")
            .with_background_threads(0)
            .with_shutdown_timeout(Duration::from_millis(10));
        assert_eq!(config.main_thread_name, "ui");
        assert_eq!(config.background_threads, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(10));
    }
}
