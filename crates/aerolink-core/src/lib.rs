//! # aerolink-core: Reactive Component State
//!
//! Publishes device capabilities as components, lets consumers hold
//! auto-refreshing references to them, and lets settings on those
//! components change optimistically with automatic rollback.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Aerolink Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │              Device backends (protocol decoders)                │    │
//! │  │      update_* ──► notify_updated        publish / unpublish     │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │ main context only                      │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ aerolink-core (THIS CRATE) ★                    │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐    │    │
//! │  │   │ component │  │   store   │  │  session  │  │  setting  │    │    │
//! │  │   │   kinds   │  │ observers │  │ reference │  │ rollback  │    │    │
//! │  │   │   cores   │  │  hierarchy│  │   arena   │  │ controller│    │    │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘    │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │ rollback timers                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               aerolink-tasks (Task Executor)                    │    │
//! │  │        main loop, background workers, one-shot timers           │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`component`] - Component kinds, the `Component` union and the cores
//! - [`store`] - `ComponentStore`, the hierarchy-aware registry
//! - [`session`] - `Session`, owner of issued references
//! - [`reference`] - `ComponentRef`, the auto-refreshing handle
//! - [`setting`] - Setting controller and typed settings
//! - [`config`] - TOML configuration
//! - [`error`] - Error types
//!
//! ## Threading
//!
//! Nothing in this crate is `Send`. Every type lives on the executor's main
//! context, and moving one to another thread is a compile error.
//!
//! ## Example Usage
//!
//! ```rust
//! use aerolink_core::component::{ComponentKind, GpsCore};
//! use aerolink_core::session::Session;
//! use aerolink_core::store::ComponentStore;
//!
//! let store = ComponentStore::new();
//! let session = Session::new();
//! let gps_ref = session
//!     .component_ref(&store, ComponentKind::Gps, |gps| {
//!         println!("gps present: {}", gps.is_some());
//!     })
//!     .unwrap();
//!
//! let gps = GpsCore::new(&store);
//! gps.update_fixed(true).update_satellite_count(11);
//! gps.publish();
//!
//! assert_eq!(gps_ref.get_as::<GpsCore>().unwrap().satellite_count(), 11);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod component;
pub mod config;
pub mod error;
pub mod reference;
pub mod session;
pub mod setting;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use component::{Component, ComponentApi, ComponentKind};
pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use reference::ComponentRef;
pub use session::{Session, SessionState};
pub use setting::{RollbackPolicy, SettingController, SettingValue};
pub use store::{ComponentStore, ObserverId};
