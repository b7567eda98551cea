//! Scene remotes: scenes published as keys of virtual 19-key remotes.
//!
//! Each configured scene is mapped onto one key of an `HM-RC-19` remote.
//! Pressing the key (`PRESS_SHORT`) from the controller activates the scene.
//! Remotes are named `HMV_<instance>0<n>`, so one plugin instance owns a
//! predictable address prefix and can wipe its previous publication first.

use std::collections::HashMap;
use std::sync::Arc;

use hmvirt_app::error::BridgeError;
use hmvirt_app::ports::PluginContext;
use hmvirt_app::services::device_factory::DeviceFactory;
use hmvirt_app::shared_device::SharedDevice;
use hmvirt_domain::event::DeviceEventKind;
use hmvirt_domain::template::TemplateSource;

/// Device type used for scene remotes.
pub const REMOTE_TYPE: &str = "HM-RC-19";

/// Keys per remote.
pub const KEYS_PER_REMOTE: usize = 19;

const PRESS_SHORT: &str = "PRESS_SHORT";

/// Runs a scene in the backend.
pub trait SceneActivator: Send + Sync + 'static {
    fn activate(&self, scene: &str);
}

impl<T: SceneActivator> SceneActivator for Arc<T> {
    fn activate(&self, scene: &str) {
        (**self).activate(scene);
    }
}

/// Activator that only logs, for setups without a scene backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingActivator;

impl SceneActivator for LoggingActivator {
    fn activate(&self, scene: &str) {
        tracing::info!(%scene, "scene activated");
    }
}

/// A scene and the remote key it is published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedScene {
    pub name: String,
    pub channel: String,
}

/// Address prefix shared by all remotes of a plugin instance.
#[must_use]
pub fn remote_prefix(instance: &str) -> String {
    format!("HMV_{instance}0")
}

/// Address of the `n`-th remote of a plugin instance.
#[must_use]
pub fn remote_address(instance: &str, n: usize) -> String {
    format!("{}{n}", remote_prefix(instance))
}

/// Unpublish the previous remotes of `instance` and publish `scenes` on
/// fresh ones, [`KEYS_PER_REMOTE`] scenes per remote.
///
/// # Errors
///
/// Returns a [`BridgeError`] when a remote cannot be built or published.
#[tracing::instrument(skip(ctx, factory, scenes, activator))]
pub async fn publish<T, A>(
    ctx: &impl PluginContext,
    factory: &DeviceFactory<T>,
    instance: &str,
    scenes: &[String],
    activator: &Arc<A>,
) -> Result<Vec<MappedScene>, BridgeError>
where
    T: TemplateSource + Sync,
    A: SceneActivator,
{
    let old = ctx.devices_with_name_like(&remote_prefix(instance));
    tracing::debug!(count = old.len(), "removing previously published remotes");
    for device in old {
        ctx.delete_device(device.address()).await?;
    }

    let mut mapped = Vec::with_capacity(scenes.len());
    for (n, chunk) in scenes.chunks(KEYS_PER_REMOTE).enumerate() {
        let device = factory.create(REMOTE_TYPE, &remote_address(instance, n))?;
        let remote = SharedDevice::new(device);
        let mut keys = HashMap::with_capacity(chunk.len());
        for (key, scene) in chunk.iter().enumerate() {
            let channel = format!("{}:{}", remote.address(), key + 1);
            keys.insert(channel.clone(), scene.clone());
            mapped.push(MappedScene {
                name: scene.clone(),
                channel,
            });
        }

        let activator = Arc::clone(activator);
        remote.read(|d| {
            d.subscribe(DeviceEventKind::DeviceChannelValueChange, move |event| {
                if event.name != PRESS_SHORT {
                    return;
                }
                if let Some(scene) = keys.get(&event.channel) {
                    tracing::info!(%scene, channel = %event.channel, "scene key pressed");
                    activator.activate(scene);
                }
            })
        })?;
        ctx.add_device(remote).await?;
    }

    tracing::info!(scenes = mapped.len(), "scenes published");
    Ok(mapped)
}
