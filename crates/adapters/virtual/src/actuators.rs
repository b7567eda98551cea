//! Simulated dimmers and switches.
//!
//! The controller drives these through channel 1 (`LEVEL` for a dimmer,
//! `STATE` for a switch). The simulated backend applies the value and
//! reports progress through `WORKING`, which the controller sees as
//! controller-origin updates.

use std::sync::Arc;

use parking_lot::Mutex;

use hmvirt_app::error::BridgeError;
use hmvirt_app::ports::PluginContext;
use hmvirt_app::services::device_factory::DeviceFactory;
use hmvirt_app::shared_device::{SharedDevice, WeakDevice};
use hmvirt_domain::channel::Notify;
use hmvirt_domain::device::sanitize_address;
use hmvirt_domain::event::{DeviceEvent, DeviceEventKind};
use hmvirt_domain::parameter::ParamValue;
use hmvirt_domain::template::TemplateSource;

const WORKING: &str = "WORKING";

/// The kinds of simulated actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorKind {
    Dimmer,
    Switch,
}

impl ActuatorKind {
    #[must_use]
    pub fn device_type(self) -> &'static str {
        match self {
            Self::Dimmer => "HM-LC-Dim1T-Pl",
            Self::Switch => "HM-LC-Sw1-Pl",
        }
    }

    /// The parameter the controller drives.
    #[must_use]
    pub fn value_name(self) -> &'static str {
        match self {
            Self::Dimmer => "LEVEL",
            Self::Switch => "STATE",
        }
    }

    fn address_tag(self) -> &'static str {
        match self {
            Self::Dimmer => "DIM",
            Self::Switch => "SW",
        }
    }
}

/// Address of the actuator called `name` in plugin instance `instance`.
#[must_use]
pub fn actuator_address(kind: ActuatorKind, instance: &str, name: &str) -> String {
    sanitize_address(&format!("HMV_{}{instance}_{name}", kind.address_tag()))
}

/// A published simulated actuator.
#[derive(Debug)]
pub struct VirtualActuator {
    kind: ActuatorKind,
    name: String,
    device: SharedDevice,
    backend: Arc<Mutex<ParamValue>>,
}

impl VirtualActuator {
    /// Build (or restore) the actuator and publish it.
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] when the device cannot be built or
    /// published.
    #[tracing::instrument(skip(ctx, factory))]
    pub async fn publish<T>(
        ctx: &impl PluginContext,
        factory: &DeviceFactory<T>,
        kind: ActuatorKind,
        instance: &str,
        name: &str,
    ) -> Result<Self, BridgeError>
    where
        T: TemplateSource + Sync,
    {
        let address = actuator_address(kind, instance, name);
        let stored = ctx.stored_data(&address).await?;
        let device = SharedDevice::new(factory.restore_or_create(
            stored.as_deref(),
            kind.device_type(),
            &address,
        )?);

        let channel = format!("{address}:1");
        let initial = device
            .get_value(&channel, kind.value_name())?
            .unwrap_or(ParamValue::Bool(false));
        let backend = Arc::new(Mutex::new(initial));

        let handler = Acknowledge {
            kind,
            channel,
            device: device.downgrade(),
            backend: Arc::clone(&backend),
        };
        device.read(|d| {
            d.subscribe(DeviceEventKind::DeviceChannelValueChange, move |event| {
                handler.on_event(event);
            })
        })?;

        ctx.add_device(device.clone()).await?;
        Ok(Self {
            kind,
            name: name.to_string(),
            device,
            backend,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ActuatorKind {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> &str {
        self.device.address()
    }

    #[must_use]
    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    /// The value the simulated hardware currently runs at.
    #[must_use]
    pub fn backend_value(&self) -> ParamValue {
        self.backend.lock().clone()
    }
}

struct Acknowledge {
    kind: ActuatorKind,
    channel: String,
    device: WeakDevice,
    backend: Arc<Mutex<ParamValue>>,
}

impl Acknowledge {
    fn on_event(&self, event: &DeviceEvent) {
        if event.channel != self.channel || event.name != self.kind.value_name() {
            return;
        }
        let Some(device) = self.device.upgrade() else {
            return;
        };
        tracing::debug!(address = %event.device, value = %event.new_value, "applying");
        let result = device
            .update_value(&self.channel, WORKING, true, Notify::OnChange)
            .and_then(|()| {
                *self.backend.lock() = event.new_value.clone();
                device.update_value(&self.channel, WORKING, false, Notify::OnChange)
            });
        if let Err(err) = result {
            tracing::warn!(%err, address = %event.device, "could not acknowledge value");
        }
    }
}
