//! Generic optimistic setting.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{SettingController, SettingValue};

/// Forwards a user change to the device. Returns false if the device
/// refused it, in which case nothing changes locally.
pub type SettingBackend<T> = Box<dyn Fn(&T) -> bool>;

/// A setting whose user changes apply locally at once and roll back unless
/// the device confirms them in time.
pub struct ValueSetting<T: SettingValue> {
    controller: SettingController,
    value: Rc<RefCell<T>>,
    backend: SettingBackend<T>,
}

/// On/off setting.
pub type BooleanSetting = ValueSetting<bool>;

impl<T: SettingValue> fmt::Debug for ValueSetting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSetting")
            .field("name", &self.controller.name())
            .field("value", &*self.value.borrow())
            .field("updating", &self.is_updating())
            .finish()
    }
}

impl<T: SettingValue> ValueSetting<T> {
    pub fn new(initial: T, controller: SettingController, backend: impl Fn(&T) -> bool + 'static) -> Self {
        ValueSetting {
            controller,
            value: Rc::new(RefCell::new(initial)),
            backend: Box::new(backend),
        }
    }

    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    /// True while a user change awaits confirmation.
    pub fn is_updating(&self) -> bool {
        self.controller.has_pending_rollback()
    }

    /// User-side change.
    ///
    /// Returns false, without notifying, when `value` equals the current
    /// value or the backend rejects it. Otherwise the value applies at once
    /// and a rollback to the previous value is armed.
    pub fn set_value(&self, value: T) -> bool {
        let unchanged = self.value.borrow().same_as(&value);
        if unchanged || !(self.backend)(&value) {
            return false;
        }
        let previous = self.value.replace(value);
        let cell = Rc::clone(&self.value);
        self.controller.post_rollback(move || {
            cell.replace(previous);
        });
        true
    }

    /// Device-side change. Confirms any pending user change.
    ///
    /// Notifies if a rollback was canceled or the value differs.
    pub fn update_value(&self, value: T) -> &Self {
        let canceled = self.controller.cancel_rollback();
        let differs = !self.value.borrow().same_as(&value);
        if canceled || differs {
            self.value.replace(value);
            self.controller.notify_change(false);
        }
        self
    }

    /// Keeps the current value and stops waiting for confirmation.
    pub fn cancel_rollback(&self) {
        if self.controller.cancel_rollback() {
            self.controller.notify_change(false);
        }
    }

    pub(crate) fn controller(&self) -> &SettingController {
        &self.controller
    }
}

impl BooleanSetting {
    /// Requests the opposite of the current value.
    pub fn toggle(&self) -> bool {
        let next = !self.value();
        self.set_value(next)
    }
}
