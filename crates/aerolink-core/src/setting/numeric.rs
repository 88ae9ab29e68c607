//! Bounded numeric settings.
//!
//! User values are clamped into the current bounds before being sent.
//! Bounds come from the device and changing them reports a backend-side
//! change.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{SettingController, SettingValue, ValueSetting};

// =============================================================================
// Ranges
// =============================================================================

/// Inclusive integer bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: i32,
    pub max: i32,
}

impl IntRange {
    /// Builds a range, swapping the ends if given in reverse.
    pub fn new(min: i32, max: i32) -> Self {
        if min <= max {
            IntRange { min, max }
        } else {
            IntRange { min: max, max: min }
        }
    }

    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Inclusive floating point bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DoubleRange {
    pub min: f64,
    pub max: f64,
}

impl DoubleRange {
    /// Builds a range, swapping the ends if given in reverse.
    pub fn new(min: f64, max: f64) -> Self {
        if max < min {
            DoubleRange { min: max, max: min }
        } else {
            DoubleRange { min, max }
        }
    }

    /// Clamps `value` into the range. NaN passes through unchanged.
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn same_as(&self, other: &DoubleRange) -> bool {
        self.min.same_as(&other.min) && self.max.same_as(&other.max)
    }
}

// =============================================================================
// IntSetting
// =============================================================================

pub struct IntSetting {
    setting: ValueSetting<i32>,
    bounds: Cell<IntRange>,
}

impl fmt::Debug for IntSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntSetting")
            .field("value", &self.value())
            .field("bounds", &self.bounds.get())
            .field("updating", &self.is_updating())
            .finish()
    }
}

impl IntSetting {
    pub fn new(
        initial: i32,
        bounds: IntRange,
        controller: SettingController,
        backend: impl Fn(&i32) -> bool + 'static,
    ) -> Self {
        IntSetting {
            setting: ValueSetting::new(initial, controller, backend),
            bounds: Cell::new(bounds),
        }
    }

    pub fn value(&self) -> i32 {
        self.setting.value()
    }

    pub fn bounds(&self) -> IntRange {
        self.bounds.get()
    }

    pub fn is_updating(&self) -> bool {
        self.setting.is_updating()
    }

    /// User-side change, clamped into bounds.
    pub fn set_value(&self, value: i32) -> bool {
        self.setting.set_value(self.bounds.get().clamp(value))
    }

    pub fn update_value(&self, value: i32) -> &Self {
        self.setting.update_value(value);
        self
    }

    /// Device-side bounds change. Notifies only if the bounds differ.
    pub fn update_bounds(&self, bounds: IntRange) -> &Self {
        if self.bounds.replace(bounds) != bounds {
            self.setting.controller().notify_change(false);
        }
        self
    }

    pub fn cancel_rollback(&self) {
        self.setting.cancel_rollback();
    }
}

// =============================================================================
// DoubleSetting
// =============================================================================

pub struct DoubleSetting {
    setting: ValueSetting<f64>,
    bounds: Cell<DoubleRange>,
}

impl fmt::Debug for DoubleSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleSetting")
            .field("value", &self.value())
            .field("bounds", &self.bounds.get())
            .field("updating", &self.is_updating())
            .finish()
    }
}

impl DoubleSetting {
    pub fn new(
        initial: f64,
        bounds: DoubleRange,
        controller: SettingController,
        backend: impl Fn(&f64) -> bool + 'static,
    ) -> Self {
        DoubleSetting {
            setting: ValueSetting::new(initial, controller, backend),
            bounds: Cell::new(bounds),
        }
    }

    pub fn value(&self) -> f64 {
        self.setting.value()
    }

    pub fn bounds(&self) -> DoubleRange {
        self.bounds.get()
    }

    pub fn is_updating(&self) -> bool {
        self.setting.is_updating()
    }

    /// User-side change, clamped into bounds.
    pub fn set_value(&self, value: f64) -> bool {
        self.setting.set_value(self.bounds.get().clamp(value))
    }

    pub fn update_value(&self, value: f64) -> &Self {
        self.setting.update_value(value);
        self
    }

    /// Device-side bounds change. Bounds compare bit-exact.
    pub fn update_bounds(&self, bounds: DoubleRange) -> &Self {
        if !self.bounds.replace(bounds).same_as(&bounds) {
            self.setting.controller().notify_change(false);
        }
        self
    }

    pub fn cancel_rollback(&self) {
        self.setting.cancel_rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setting::value::tests::Harness;

    #[test]
    fn test_range_normalizes_reversed_ends() {
        assert_eq!(IntRange::new(10, 0), IntRange { min: 0, max: 10 });
        let range = DoubleRange::new(5.0, -5.0);
        assert_eq!(range.min, -5.0);
        assert_eq!(range.max, 5.0);
        assert!(range.clamp(f64::NAN).is_nan());
    }

    #[test]
    fn test_int_user_value_is_clamped() {
        let h = Harness::new();
        let setting = IntSetting::new(5, IntRange::new(0, 10), h.controller(), h.recording_backend(true));

        assert!(setting.set_value(42));
        assert_eq!(setting.value(), 10);
        assert_eq!(*h.sent.borrow(), vec!["10"]);

        // already at the upper bound
        setting.update_value(10);
        assert!(!setting.set_value(11));
    }

    #[test]
    fn test_int_bounds_change_notifies_once() {
        let h = Harness::new();
        let setting = IntSetting::new(5, IntRange::new(0, 10), h.controller(), h.recording_backend(true));

        setting.update_bounds(IntRange::new(0, 10));
        assert_eq!(h.change_count(), 0);
        setting.update_bounds(IntRange::new(0, 20));
        assert_eq!(*h.changes.borrow(), vec![false]);
        assert_eq!(setting.bounds().max, 20);
    }

    #[test]
    fn test_double_clamp_and_rollback() {
        let h = Harness::new();
        let setting = DoubleSetting::new(
            50.0,
            DoubleRange::new(10.0, 150.0),
            h.controller(),
            h.recording_backend(true),
        );

        assert!(setting.set_value(500.0));
        assert_eq!(setting.value(), 150.0);
        h.scheduler.fire_all();
        assert_eq!(setting.value(), 50.0);
        assert_eq!(*h.changes.borrow(), vec![true, true]);
    }

    #[test]
    fn test_double_bounds_compare_bit_exact() {
        let h = Harness::new();
        let setting = DoubleSetting::new(
            0.0,
            DoubleRange::new(0.0, 1.0),
            h.controller(),
            h.recording_backend(true),
        );

        setting.update_bounds(DoubleRange::new(0.0, 1.0));
        assert_eq!(h.change_count(), 0);
        setting.update_bounds(DoubleRange::new(-0.0, 1.0));
        assert_eq!(h.change_count(), 1);
    }
}
