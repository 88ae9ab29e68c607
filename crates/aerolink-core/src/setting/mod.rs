//! # Settings
//!
//! Optimistic device settings with automatic rollback.
//!
//! ## Setting Controller State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │                user set, backend accepts                                │
//! │   ┌──────────┐ ─────────────────────────────► ┌──────────────────┐      │
//! │   │ UpToDate │                                │ Updating         │ ─┐   │
//! │   │          │ ◄───────────────────────────── │ (timer armed,    │  │   │
//! │   └──────────┘  backend confirms / timeout /  │  rollback saved) │  │   │
//! │        ▲        cancel_rollback               └──────────────────┘  │   │
//! │        │                                           ▲   user set     │   │
//! │        │ backend rejects: no change                └────────────────┘   │
//! │        └─── (no transition, no notification)       (re-arm, keep the    │
//! │                                                     first rollback)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`controller`] - `SettingController`, the per-setting state machine
//! - [`value`] - `ValueSetting<T>`, the generic optimistic setting
//! - [`numeric`] - bounded `IntSetting` and `DoubleSetting`
//! - [`enumerated`] - `EnumSetting<E>` with a set of available values
//!
//! Equality is exact: `f64` values compare by bit pattern, so `0.0` and
//! `-0.0` are different values and a NaN equals an identical NaN.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use aerolink_tasks::Scheduler;

pub mod controller;
pub mod enumerated;
pub mod numeric;
pub mod value;

pub use controller::{ChangeListener, SettingController};
pub use enumerated::EnumSetting;
pub use numeric::{DoubleRange, DoubleSetting, IntRange, IntSetting};
pub use value::{BooleanSetting, ValueSetting};

// =============================================================================
// Exact Equality
// =============================================================================

/// A value a setting can hold.
pub trait SettingValue: Clone + fmt::Debug + 'static {
    /// Exact equality used to decide whether a change is observable.
    fn same_as(&self, other: &Self) -> bool;
}

/// Implements [`SettingValue`] through `PartialEq` for types with exact
/// equality.
macro_rules! exact_setting_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::setting::SettingValue for $ty {
                fn same_as(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}
pub(crate) use exact_setting_value;

exact_setting_value!(bool, i32, i64, u8, u16, u32, u64, String);

impl SettingValue for f64 {
    fn same_as(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl SettingValue for f32 {
    fn same_as(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl<T: SettingValue> SettingValue for Option<T> {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_as(b),
            (None, None) => true,
            _ => false,
        }
    }
}

// =============================================================================
// Rollback Policy
// =============================================================================

/// Default time a user change waits for confirmation.
pub const DEFAULT_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Where rollback timers are armed, and for how long.
#[derive(Clone)]
pub struct RollbackPolicy {
    scheduler: Rc<dyn Scheduler>,
    timeout: Duration,
}

impl RollbackPolicy {
    pub fn new(scheduler: Rc<dyn Scheduler>, timeout: Duration) -> Self {
        RollbackPolicy { scheduler, timeout }
    }

    pub fn with_default_timeout(scheduler: Rc<dyn Scheduler>) -> Self {
        Self::new(scheduler, DEFAULT_ROLLBACK_TIMEOUT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }
}

impl fmt::Debug for RollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackPolicy")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_is_bit_exact() {
        assert!(!0.0_f64.same_as(&-0.0));
        assert!(f64::NAN.same_as(&f64::NAN));
        assert!(!0.1_f64.same_as(&(0.1 + f64::EPSILON)));
        assert!(1.5_f64.same_as(&1.5));
    }

    #[test]
    fn test_exact_types() {
        assert!(String::from("a").same_as(&"a".to_string()));
        assert!(!3_i32.same_as(&4));
        assert!(Some(2.0_f64).same_as(&Some(2.0)));
        assert!(!Some(1_u8).same_as(&None));
        assert!(None::<bool>.same_as(&None));
    }
}
