//! The per-control actions.
//!
//! The host delivers lifecycle and input events for each control
//! instance (identified by its `context`); a [`Plugin`] routes each
//! event to the [`ActionHandler`] for the control's action and
//! reports failures back to the control as an alert.

use crate::capability::CapabilityKind;
use crate::debounce::Debouncer;
use crate::platform_api::{DeviceInfo, EnumOption, GoveeApiClient};
use crate::settings::GlobalSettings;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

mod color;
mod dial;
pub mod host;
mod power;
mod scene;
#[cfg(test)]
pub(crate) mod testing;

#[derive(clap::Parser, Debug)]
pub struct PluginArguments {
    /// How long a dial must be idle before the adjusted value
    /// is sent to the device
    #[arg(long, global = true, default_value_t = 350)]
    pub debounce_ms: u64,

    /// Brightness change, in percent, per dial tick
    #[arg(long, global = true, default_value_t = 5, value_parser = percent)]
    pub brightness_step: u32,

    /// Color temperature change, in kelvin, per dial tick
    #[arg(long, global = true, default_value_t = 100, value_parser = kelvin_step)]
    pub kelvin_step: u32,
}

pub fn percent(s: &str) -> Result<u32, String> {
    clap_num::number_range(s, 1, 100)
}

fn kelvin_step(s: &str) -> Result<u32, String> {
    clap_num::number_range(s, 1, 1000)
}

impl PluginArguments {
    pub fn to_config(&self) -> PluginConfig {
        PluginConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            brightness_step: self.brightness_step,
            kelvin_step: self.kelvin_step,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PluginConfig {
    pub debounce: Duration,
    pub brightness_step: u32,
    pub kelvin_step: u32,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(350),
            brightness_step: 5,
            kelvin_step: 100,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PowerMode {
    #[default]
    Toggle,
    On,
    Off,
}

/// The settings the host persists for each control instance
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<u32>,
    /// `#RRGGBB`, as chosen in the property inspector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// JSON encoding of the chosen scene option's value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_mode: Option<PowerMode>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SettingsPayload {
    #[serde(default)]
    pub settings: ActionSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DialRotatePayload {
    #[serde(default)]
    pub settings: ActionSettings,
    pub ticks: i32,
}

/// A property inspector data source request
#[derive(Deserialize, Debug, Clone)]
pub struct DataSourceRequest {
    pub event: String,
    #[serde(default, rename = "isRefresh")]
    pub is_refresh: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GlobalSettingsPayload {
    #[serde(default)]
    pub settings: HostGlobalSettings,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct HostGlobalSettings {
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ActionEvent<P> {
    #[serde(deserialize_with = "action_kind")]
    pub action: CapabilityKind,
    pub context: String,
    pub payload: P,
}

/// Accepts either a bare action name or a reverse-DNS action
/// identifier whose last component is the action name
fn action_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CapabilityKind, D::Error> {
    let action = String::deserialize(deserializer)?;
    let name = action.rsplit('.').next().unwrap_or(&action);
    name.parse()
        .map_err(|_| serde::de::Error::custom(format!("unknown action '{action}'")))
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    WillAppear(ActionEvent<SettingsPayload>),
    DidReceiveSettings(ActionEvent<SettingsPayload>),
    KeyDown(ActionEvent<SettingsPayload>),
    DialRotate(ActionEvent<DialRotatePayload>),
    DialDown(ActionEvent<SettingsPayload>),
    TouchTap(ActionEvent<SettingsPayload>),
    SendToPlugin(ActionEvent<DataSourceRequest>),
    DidReceiveGlobalSettings { payload: GlobalSettingsPayload },
}

/// One entry in a property inspector drop-down
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataSourceItem {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl DataSourceItem {
    pub fn new<L: Into<String>, V: Into<String>>(label: L, value: V) -> Self {
        Self {
            label: label.into(),
            value: Some(value.into()),
            disabled: None,
        }
    }

    pub fn placeholder<L: Into<String>>(label: L) -> Self {
        Self {
            label: label.into(),
            value: None,
            disabled: Some(true),
        }
    }
}

/// The visual feedback and persistence services the host provides.
/// These are best effort; failures to deliver are the host's concern.
#[async_trait]
pub trait ActionHost: Send + Sync {
    async fn show_ok(&self, context: &str);
    async fn show_alert(&self, context: &str);
    async fn set_title(&self, context: &str, title: &str);
    async fn set_state(&self, context: &str, state: u8);
    async fn set_feedback(&self, context: &str, feedback: JsonValue);
    async fn set_settings(&self, context: &str, settings: &ActionSettings);
    async fn send_data_source(&self, context: &str, event: &str, items: &[DataSourceItem]);
}

/// The control instance an event is addressed to
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub context: String,
    pub settings: ActionSettings,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The capability a device needs for this action to be offered
    fn kind(&self) -> CapabilityKind;

    async fn will_appear(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        plugin.refresh_title(action).await
    }

    async fn settings_changed(
        &self,
        plugin: &Plugin,
        action: &mut ActionContext,
    ) -> anyhow::Result<()> {
        plugin.refresh_title(action).await
    }

    async fn key_down(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()>;

    async fn dial_rotate(
        &self,
        _plugin: &Plugin,
        _action: &mut ActionContext,
        _ticks: i32,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn dial_down(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        self.key_down(plugin, action).await
    }

    async fn touch_tap(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        self.dial_down(plugin, action).await
    }

    /// Scene options for the property inspector; only scene
    /// actions have any
    async fn list_scenes(
        &self,
        _plugin: &Plugin,
        _device: &DeviceInfo,
    ) -> anyhow::Result<Vec<EnumOption>> {
        Ok(vec![])
    }
}

static POWER: power::PowerAction = power::PowerAction;
static BRIGHTNESS: dial::DialAction = dial::DialAction::Brightness;
static COLOR_TEMPERATURE: dial::DialAction = dial::DialAction::ColorTemperature;
static COLOR: color::ColorAction = color::ColorAction;
static LIGHT_SCENE: scene::SceneAction = scene::SceneAction::Light;
static DIY_SCENE: scene::SceneAction = scene::SceneAction::Diy;
static SNAPSHOT_SCENE: scene::SceneAction = scene::SceneAction::Snapshot;

pub fn handler_for(kind: CapabilityKind) -> &'static dyn ActionHandler {
    match kind {
        CapabilityKind::Power => &POWER,
        CapabilityKind::Brightness => &BRIGHTNESS,
        CapabilityKind::ColorTemperature => &COLOR_TEMPERATURE,
        CapabilityKind::Color => &COLOR,
        CapabilityKind::LightScene => &LIGHT_SCENE,
        CapabilityKind::DiyScene => &DIY_SCENE,
        CapabilityKind::SnapshotScene => &SNAPSHOT_SCENE,
    }
}

enum Input {
    Appear,
    SettingsChanged,
    KeyDown,
    DialRotate(i32),
    DialDown,
    TouchTap,
}

/// Owns the services shared by every control and routes host
/// events to the action handlers
#[derive(Clone)]
pub struct Plugin {
    client: Arc<GoveeApiClient>,
    host: Arc<dyn ActionHost>,
    settings: Arc<GlobalSettings>,
    debouncer: Debouncer,
    config: PluginConfig,
    /// The last settings seen for each control; data source
    /// requests don't carry them
    contexts: Arc<Mutex<HashMap<String, ActionSettings>>>,
}

impl Plugin {
    pub fn new(client: Arc<GoveeApiClient>, host: Arc<dyn ActionHost>, config: PluginConfig) -> Self {
        Self {
            settings: client.settings().clone(),
            client,
            host,
            debouncer: Debouncer::new(),
            config,
            contexts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn client(&self) -> &GoveeApiClient {
        &self.client
    }

    pub fn host(&self) -> &dyn ActionHost {
        self.host.as_ref()
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub async fn dispatch(&self, event: HostEvent) {
        let (event, input) = match event {
            HostEvent::DidReceiveGlobalSettings { payload } => {
                log::debug!("global settings updated");
                self.settings.set_api_key(payload.settings.api_key);
                return;
            }
            HostEvent::SendToPlugin(event) => {
                self.answer_data_source(event).await;
                return;
            }
            HostEvent::WillAppear(e) => (e, Input::Appear),
            HostEvent::DidReceiveSettings(e) => (e, Input::SettingsChanged),
            HostEvent::KeyDown(e) => (e, Input::KeyDown),
            HostEvent::DialDown(e) => (e, Input::DialDown),
            HostEvent::TouchTap(e) => (e, Input::TouchTap),
            HostEvent::DialRotate(e) => (
                ActionEvent {
                    action: e.action,
                    context: e.context,
                    payload: SettingsPayload {
                        settings: e.payload.settings,
                    },
                },
                Input::DialRotate(e.payload.ticks),
            ),
        };

        let kind = event.action;
        let handler = handler_for(kind);
        let mut action = ActionContext {
            context: event.context,
            settings: event.payload.settings,
        };
        self.remember(&action);

        let result = match input {
            Input::Appear => handler.will_appear(self, &mut action).await,
            Input::SettingsChanged => handler.settings_changed(self, &mut action).await,
            Input::KeyDown => handler.key_down(self, &mut action).await,
            Input::DialRotate(ticks) => handler.dial_rotate(self, &mut action, ticks).await,
            Input::DialDown => handler.dial_down(self, &mut action).await,
            Input::TouchTap => handler.touch_tap(self, &mut action).await,
        };

        if let Err(err) = result {
            log::error!("{kind} action {}: {err:#}", action.context);
            self.host.show_alert(&action.context).await;
        }
    }

    fn remember(&self, action: &ActionContext) {
        self.contexts
            .lock()
            .insert(action.context.clone(), action.settings.clone());
    }

    fn recall(&self, context: &str) -> ActionSettings {
        self.contexts.lock().get(context).cloned().unwrap_or_default()
    }

    /// Records changed settings and asks the host to persist them
    pub async fn persist(&self, action: &ActionContext) {
        self.remember(action);
        self.host
            .set_settings(&action.context, &action.settings)
            .await;
    }

    /// Resolves the device selected for this control
    pub async fn selected_device(&self, action: &ActionContext) -> anyhow::Result<DeviceInfo> {
        let Some(id) = action.settings.device_id.as_deref() else {
            anyhow::bail!("no device has been selected");
        };
        Ok(self.client.get_device_or_fail(id).await?)
    }

    /// Shows the device name as the control's title, filling in
    /// the persisted name if it has changed
    pub async fn refresh_title(&self, action: &mut ActionContext) -> anyhow::Result<()> {
        if action.settings.device_id.is_none() {
            return Ok(());
        }
        let device = self.selected_device(action).await?;
        let name = device.name().to_string();
        self.host.set_title(&action.context, &name).await;

        if action.settings.device_name.as_deref() != Some(name.as_str()) {
            action.settings.device_name = Some(name);
            self.persist(action).await;
        }
        Ok(())
    }

    /// Runs `command` once the control has been idle for the configured
    /// debounce interval; a later call for the same control replaces it.
    /// A failure shows the alert on the control.
    pub fn debounce<F>(&self, action: &ActionContext, label: &'static str, command: F)
    where
        F: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        let host = self.host.clone();
        let context = action.context.clone();
        self.debouncer.schedule(
            action.context.as_str(),
            self.config.debounce,
            async move {
                if let Err(err) = command.await {
                    log::error!("{label} for {context}: {err:#}");
                    host.show_alert(&context).await;
                }
            },
        );
    }

    /// Waits for debounced commands to be sent
    pub async fn settle(&self) {
        self.debouncer.wait_idle().await;
    }

    async fn answer_data_source(&self, event: ActionEvent<DataSourceRequest>) {
        let kind = event.action;
        let request = event.payload;
        let action = ActionContext {
            settings: self.recall(&event.context),
            context: event.context,
        };

        if request.is_refresh {
            self.client.clear_cache().await;
        }

        let items = match request.event.as_str() {
            "getDevices" => self.device_items(kind).await,
            "getScenes" => self.scene_items(kind, &action).await,
            other => {
                log::warn!("{kind} action {}: unknown data source '{other}'", action.context);
                vec![DataSourceItem::placeholder("Unsupported request")]
            }
        };

        self.host
            .send_data_source(&action.context, &request.event, &items)
            .await;
    }

    async fn device_items(&self, kind: CapabilityKind) -> Vec<DataSourceItem> {
        let devices = match self.client.get_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                log::error!("listing devices: {err:#}");
                return vec![DataSourceItem::placeholder("Failed to load devices")];
            }
        };

        let mut items: Vec<_> = devices
            .iter()
            .filter(|d| d.supports(kind))
            .map(|d| DataSourceItem::new(d.name(), d.device.as_str()))
            .collect();
        items.sort_by_key(|item| item.label.to_ascii_lowercase());

        if items.is_empty() {
            items.push(DataSourceItem::placeholder("No compatible devices found"));
        }
        items
    }

    async fn scene_items(&self, kind: CapabilityKind, action: &ActionContext) -> Vec<DataSourceItem> {
        if !kind.is_scene() {
            return vec![DataSourceItem::placeholder("No scenes available")];
        }
        if action.settings.device_id.is_none() {
            return vec![DataSourceItem::placeholder("Select a device first")];
        }

        let handler = handler_for(kind);
        let scenes = match self.selected_device(action).await {
            Ok(device) => handler.list_scenes(self, &device).await,
            Err(err) => Err(err),
        };

        match scenes {
            Ok(scenes) if scenes.is_empty() => {
                vec![DataSourceItem::placeholder("No scenes available")]
            }
            Ok(scenes) => scenes
                .into_iter()
                .map(|opt| DataSourceItem::new(opt.name, opt.value.to_string()))
                .collect(),
            Err(err) => {
                log::error!("{kind} action {}: listing scenes: {err:#}", action.context);
                vec![DataSourceItem::placeholder("Failed to load scenes")]
            }
        }
    }
}

/// Applies `ticks * step` to `current`, keeping the result in
/// `min..=max`
pub fn adjust(current: u32, ticks: i32, step: u32, min: u32, max: u32) -> u32 {
    let next = current as i64 + ticks as i64 * step as i64;
    next.clamp(min as i64, max as i64) as u32
}
