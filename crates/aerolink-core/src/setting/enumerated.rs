//! Enumerated setting with a device-provided set of available values.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use super::{SettingController, SettingValue, ValueSetting};

pub struct EnumSetting<E: SettingValue + Ord> {
    setting: ValueSetting<E>,
    available: RefCell<BTreeSet<E>>,
}

impl<E: SettingValue + Ord> fmt::Debug for EnumSetting<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumSetting")
            .field("value", &self.value())
            .field("available", &*self.available.borrow())
            .field("updating", &self.is_updating())
            .finish()
    }
}

impl<E: SettingValue + Ord> EnumSetting<E> {
    /// `initial` is always part of the available values.
    pub fn new(
        initial: E,
        available: impl IntoIterator<Item = E>,
        controller: SettingController,
        backend: impl Fn(&E) -> bool + 'static,
    ) -> Self {
        let mut available: BTreeSet<E> = available.into_iter().collect();
        available.insert(initial.clone());
        EnumSetting {
            setting: ValueSetting::new(initial, controller, backend),
            available: RefCell::new(available),
        }
    }

    pub fn value(&self) -> E {
        self.setting.value()
    }

    pub fn available_values(&self) -> BTreeSet<E> {
        self.available.borrow().clone()
    }

    pub fn is_available(&self, value: &E) -> bool {
        self.available.borrow().contains(value)
    }

    pub fn is_updating(&self) -> bool {
        self.setting.is_updating()
    }

    /// User-side change. Values the device does not offer are rejected.
    pub fn set_value(&self, value: E) -> bool {
        if !self.is_available(&value) {
            return false;
        }
        self.setting.set_value(value)
    }

    pub fn update_value(&self, value: E) -> &Self {
        self.setting.update_value(value);
        self
    }

    /// Device-side change of the offered values. Notifies only if the set
    /// differs.
    pub fn update_available_values(&self, values: impl IntoIterator<Item = E>) -> &Self {
        let values: BTreeSet<E> = values.into_iter().collect();
        let changed = *self.available.borrow() != values;
        if changed {
            *self.available.borrow_mut() = values;
            self.setting.controller().notify_change(false);
        }
        self
    }

    pub fn cancel_rollback(&self) {
        self.setting.cancel_rollback();
    }
}
