//! Thread-safe handle to a published device.
//!
//! Every write runs as one sequence: the change is applied, then the
//! resulting event is delivered to all subscribers before the call returns.
//! The per-device [`ReentrantMutex`] is held for that whole sequence, so
//! writers on other threads are serialized, while a handler running on the
//! dispatching thread may re-enter the device (read, or even write) and sees
//! the value that was just applied.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use hmvirt_domain::channel::{Notification, Notify};
use hmvirt_domain::device::Device;
use hmvirt_domain::error::DeviceError;
use hmvirt_domain::parameter::ParamValue;

use crate::error::BridgeError;

type Inner = ReentrantMutex<RefCell<Device>>;

/// Cloneable, `Send + Sync` handle to one [`Device`].
#[derive(Clone)]
pub struct SharedDevice {
    inner: Arc<Inner>,
    address: Arc<str>,
}

impl std::fmt::Debug for SharedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDevice")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl SharedDevice {
    #[must_use]
    pub fn new(device: Device) -> Self {
        let address = Arc::from(device.address());
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(device))),
            address,
        }
    }

    /// Address of the device, fixed once it is built.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run `f` with shared access to the device.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Busy`] when called from inside [`write`](Self::write)
    /// on the same thread.
    pub fn read<R>(&self, f: impl FnOnce(&Device) -> R) -> Result<R, BridgeError> {
        let guard = self.inner.lock();
        let device = guard.try_borrow().map_err(|_| BridgeError::Busy)?;
        Ok(f(&device))
    }

    /// Run `f` with exclusive access to the device.
    ///
    /// Meant for changes that raise no events (paramset writes,
    /// subscriptions). Value writes go through [`set_value`](Self::set_value)
    /// and [`update_value`](Self::update_value), which release the borrow
    /// before notifying.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Busy`] when the device is already borrowed on
    /// this thread.
    pub fn write<R>(&self, f: impl FnOnce(&mut Device) -> R) -> Result<R, BridgeError> {
        let guard = self.inner.lock();
        let mut device = guard.try_borrow_mut().map_err(|_| BridgeError::Busy)?;
        Ok(f(&mut device))
    }

    /// Local-origin write, announced to the device's subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Device`] when the channel or parameter is
    /// unknown or the value is rejected, [`BridgeError::Busy`] when the
    /// device is borrowed further up the stack.
    pub fn set_value(
        &self,
        channel: &str,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), BridgeError> {
        let value = value.into();
        self.apply(|device| device.stage_set_value(channel, name, value).map(Some))
    }

    /// Controller-origin write, announced according to `notify`.
    ///
    /// # Errors
    ///
    /// Same as [`set_value`](Self::set_value).
    pub fn update_value(
        &self,
        channel: &str,
        name: &str,
        value: impl Into<ParamValue>,
        notify: Notify,
    ) -> Result<(), BridgeError> {
        let value = value.into();
        self.apply(|device| device.stage_update_value(channel, name, value, notify))
    }

    /// Current value of a parameter.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Busy`] when called from inside
    /// [`write`](Self::write) on the same thread.
    pub fn get_value(&self, channel: &str, name: &str) -> Result<Option<ParamValue>, BridgeError> {
        self.read(|device| device.get_value(channel, name).cloned())
    }

    /// A handle that does not keep the device alive, for use inside the
    /// device's own event handlers.
    #[must_use]
    pub fn downgrade(&self) -> WeakDevice {
        WeakDevice {
            inner: Arc::downgrade(&self.inner),
            address: Arc::clone(&self.address),
        }
    }

    /// Whether both handles point at the same device.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn apply(
        &self,
        stage: impl FnOnce(&mut Device) -> Result<Option<Notification>, DeviceError>,
    ) -> Result<(), BridgeError> {
        let guard = self.inner.lock();
        let notification = {
            let mut device = guard.try_borrow_mut().map_err(|_| BridgeError::Busy)?;
            stage(&mut device)?
        };
        if let Some(notification) = notification {
            notification.deliver();
        }
        drop(guard);
        Ok(())
    }
}

/// Non-owning counterpart of [`SharedDevice`].
#[derive(Clone)]
pub struct WeakDevice {
    inner: Weak<Inner>,
    address: Arc<str>,
}

impl std::fmt::Debug for WeakDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakDevice")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl WeakDevice {
    /// The device, unless it has been dropped.
    #[must_use]
    pub fn upgrade(&self) -> Option<SharedDevice> {
        Some(SharedDevice {
            inner: self.inner.upgrade()?,
            address: Arc::clone(&self.address),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmvirt_domain::event::DeviceEventKind;
    use hmvirt_domain::template::StaticTemplates;
    use std::sync::Mutex;

    const SWITCH: &str = r#"{
        "type": "HM-LC-Sw1-Pl",
        "channels": [
            {"adress": 0, "type": "MAINTENANCE", "paramsets": [
                {"name": "VALUES", "id": "maint_ch_values", "parameter": [
                    {"name": "UNREACH", "type": "BOOL", "operations": 5}
                ]}
            ]},
            {"adress": 1, "type": "SWITCH", "paramsets": [
                {"name": "VALUES", "id": "switch_ch_values", "parameter": [
                    {"name": "STATE", "type": "BOOL", "operations": 7},
                    {"name": "WORKING", "type": "BOOL", "operations": 5}
                ]}
            ]}
        ],
        "paramsets": []
    }"#;

    fn switch() -> SharedDevice {
        let templates = StaticTemplates::new().with("HM-LC-Sw1-Pl", SWITCH);
        let mut device = Device::new(None);
        assert!(device.init_with_type(&templates, "HM-LC-Sw1-Pl", "SW01"));
        SharedDevice::new(device)
    }

    #[test]
    fn should_let_handlers_read_the_applied_value() {
        let shared = switch();
        let seen = Arc::new(Mutex::new(None));
        let weak = shared.downgrade();
        let sink = Arc::clone(&seen);
        shared
            .read(|d| {
                d.subscribe(DeviceEventKind::DeviceChannelValueChange, move |_| {
                    let device = weak.upgrade().unwrap();
                    *sink.lock().unwrap() = device.get_value("SW01:1", "STATE").unwrap();
                })
            })
            .unwrap();

        shared.set_value("SW01:1", "STATE", true).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(ParamValue::Bool(true)));
    }

    #[test]
    fn should_let_handlers_write_back() {
        let shared = switch();
        let weak = shared.downgrade();
        shared
            .read(|d| {
                d.subscribe(DeviceEventKind::DeviceChannelValueChange, move |event| {
                    if event.name == "STATE" {
                        let device = weak.upgrade().unwrap();
                        device
                            .update_value("SW01:1", "WORKING", true, Notify::Silent)
                            .unwrap();
                    }
                })
            })
            .unwrap();

        shared.set_value("SW01:1", "STATE", true).unwrap();

        assert_eq!(
            shared.get_value("SW01:1", "WORKING").unwrap(),
            Some(ParamValue::Bool(true))
        );
    }

    #[test]
    fn should_report_busy_on_nested_write() {
        let shared = switch();
        let inner = shared.clone();
        let result = shared.write(|_| inner.read(|d| d.address().to_string()));
        assert!(matches!(result, Ok(Err(BridgeError::Busy))));
    }

    #[test]
    fn should_serialize_writers_across_threads() {
        let shared = switch();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        shared
            .read(|d| {
                d.subscribe(DeviceEventKind::DeviceChannelValueChange, move |event| {
                    sink.lock().unwrap().push(event.new_value.clone());
                })
            })
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let device = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        device.set_value("SW01:1", "STATE", i % 2 == 0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(events.lock().unwrap().len(), 100);
    }

    #[test]
    fn should_propagate_unknown_channel() {
        let shared = switch();
        let result = shared.set_value("SW01:7", "STATE", true);
        assert!(matches!(result, Err(BridgeError::Device(_))));
    }

    #[test]
    fn should_drop_weak_handle_with_device() {
        let shared = switch();
        let weak = shared.downgrade();
        assert!(weak.upgrade().is_some());
        drop(shared);
        assert!(weak.upgrade().is_none());
    }
}
