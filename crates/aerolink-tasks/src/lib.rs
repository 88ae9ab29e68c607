//! # aerolink-tasks: Task Executor
//!
//! The scheduling primitive the rest of Aerolink is built on: a single
//! designated main context, a pool of blocking workers, one-shot timers
//! and a `Task<T>` whose completion is always delivered back on main.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Executor Architecture                           │
//! │                                                                         │
//! │  ┌───────────────────────┐        ┌──────────────────────────────────┐  │
//! │  │ Executor (Send+Sync)  │ post   │ MainContext (!Send)              │  │
//! │  │                       │ ─────► │                                  │  │
//! │  │ post_on_main          │        │ run_in_background ─► Task<T>     │  │
//! │  │ dispose               │        │ schedule / unschedule            │  │
//! │  │ main_context()        │        │ stats                            │  │
//! │  └───────────────────────┘        └────────────────┬─────────────────┘  │
//! │                                                    │                    │
//! │                                   ┌────────────────┴─────────────────┐  │
//! │                                   │ Scheduler trait                  │  │
//! │                                   │  MainContext   (tokio timers)    │  │
//! │                                   │  ManualScheduler (tests)         │  │
//! │                                   └──────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Executor runtime parameters
//! - [`error`] - Executor and task error types
//! - [`executor`] - Main loop, worker pool, `Executor` and `MainContext`
//! - [`group`] - `TaskGroup` for canceling related tasks together
//! - [`scheduler`] - `Scheduler` trait, `TimerHandle`, `ManualScheduler`
//! - [`task`] - `Task<T>`, `TaskOutcome`, `CancelToken`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aerolink_tasks::{Executor, ExecutorConfig};
//!
//! let executor = Executor::start(ExecutorConfig::default())?;
//! let ex = executor.clone();
//! executor.post_on_main(move || {
//!     if let Ok(task) = ex.run_in_background("checksum", || Ok(compute())) {
//!         task.when_complete(|outcome| println!("{:?}", outcome.value()));
//!     }
//! })?;
//! executor.dispose();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod executor;
pub mod group;
pub mod scheduler;
pub mod task;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::ExecutorConfig;
pub use error::{BoxError, ExecutorError, ExecutorResult, TaskError};
pub use executor::{Executor, ExecutorStats, MainContext};
pub use group::{TaskGroup, DEFAULT_SUBSET};
pub use scheduler::{Scheduler, TimerCallback, TimerHandle};
pub use task::{CancelToken, Task, TaskOutcome};

#[cfg(any(test, feature = "testing"))]
pub use scheduler::ManualScheduler;
