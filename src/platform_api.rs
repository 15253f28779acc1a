use crate::capability::{
    extract_options, extract_state, find_capability, sort_scene_options, CapabilityDescriptor,
    CapabilityKind,
};
use crate::error::{ControlError, Result};
use crate::inventory::DeviceInventory;
use crate::opt_env_var;
use crate::settings::GlobalSettings;
use reqwest::{Method, StatusCode};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// This file implements the subset of the Govee Platform API V1 that
// the deck controls need, as described at:
// <https://developer.govee.com/reference/get-you-devices>

const SERVER: &str = "https://openapi.api.govee.com/router/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(clap::Parser, Debug)]
pub struct GoveeApiArguments {
    /// The Govee API Key. If not passed here, it will be read from
    /// the GOVEE_API_KEY environment variable.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Override the base URL of the Govee Platform API.
    /// If not passed here, it will be read from the
    /// GOVEE_API_SERVER environment variable.
    #[arg(long, global = true)]
    pub api_server: Option<String>,
}

impl GoveeApiArguments {
    pub fn opt_api_key(&self) -> anyhow::Result<Option<String>> {
        match &self.api_key {
            Some(key) => Ok(Some(key.to_string())),
            None => opt_env_var("GOVEE_API_KEY"),
        }
    }

    pub fn api_key(&self) -> anyhow::Result<String> {
        self.opt_api_key()?.ok_or_else(|| {
            anyhow::anyhow!(
                "Please specify the api key either via the \
                --api-key parameter or by setting $GOVEE_API_KEY"
            )
        })
    }

    pub fn api_server(&self) -> anyhow::Result<String> {
        match &self.api_server {
            Some(server) => Ok(server.to_string()),
            None => Ok(opt_env_var("GOVEE_API_SERVER")?.unwrap_or_else(|| SERVER.to_string())),
        }
    }

    /// Builds global settings seeded with whatever key is configured,
    /// if any; the host may supply one later.
    pub fn global_settings(&self) -> anyhow::Result<Arc<GlobalSettings>> {
        let settings = GlobalSettings::new();
        settings.set_api_key(self.opt_api_key()?);
        Ok(Arc::new(settings))
    }

    pub fn api_client(&self) -> anyhow::Result<GoveeApiClient> {
        let settings = GlobalSettings::with_api_key(self.api_key()?);
        Ok(GoveeApiClient::with_server(
            Arc::new(settings),
            self.api_server()?,
        ))
    }
}

/// The device control client.
/// Construct one at startup and share it; the device inventory
/// it holds is cached until `clear_cache` is called.
pub struct GoveeApiClient {
    settings: Arc<GlobalSettings>,
    server: String,
    inventory: DeviceInventory,
}

impl GoveeApiClient {
    pub fn with_server<S: Into<String>>(settings: Arc<GlobalSettings>, server: S) -> Self {
        let server: String = server.into();
        Self {
            settings,
            server: server.trim_end_matches('/').to_string(),
            inventory: DeviceInventory::new(),
        }
    }

    /// The settings the credential is read from; replacing the key
    /// there affects the next request
    pub fn settings(&self) -> &Arc<GlobalSettings> {
        &self.settings
    }

    fn endpoint(&self, url: &str) -> String {
        format!("{}{url}", self.server)
    }

    async fn load_devices(&self) -> Result<Vec<DeviceInfo>> {
        let url = self.endpoint("/user/devices");
        let resp: GetDevicesResponse = self.get_request_with_json_response(&url).await?;
        Ok(resp.data)
    }

    pub async fn get_devices(&self) -> Result<Arc<Vec<DeviceInfo>>> {
        self.inventory.fetch(self.load_devices()).await
    }

    /// Returns None if the inventory has no device with that id
    pub async fn get_device(&self, id: &str) -> Result<Option<DeviceInfo>> {
        self.inventory.find(id, self.load_devices()).await
    }

    pub async fn get_device_or_fail(&self, id: &str) -> Result<DeviceInfo> {
        self.inventory.get_or_fail(id, self.load_devices()).await
    }

    /// Drops the cached inventory; the next lookup will query the API
    pub async fn clear_cache(&self) {
        self.inventory.invalidate().await;
    }

    /// Queries the live state of a device. This always goes to the API.
    pub async fn get_device_state(&self, device: &DeviceRef) -> Result<DeviceState> {
        let url = self.endpoint("/device/state");
        let request = DeviceRequest {
            request_id: new_request_id(),
            payload: device.clone(),
        };

        let resp: GetDeviceStateResponse = self
            .request_with_json_response(Method::POST, &url, &request)
            .await?;

        Ok(resp.payload)
    }

    /// Sends a control command for one of the device's capabilities.
    /// The device must advertise the capability; nothing is sent
    /// otherwise.
    pub async fn control_device<V: Into<JsonValue>>(
        &self,
        device: &DeviceInfo,
        kind: CapabilityKind,
        value: V,
    ) -> Result<()> {
        let descriptor = kind.descriptor();
        if device.capability(&descriptor).is_none() {
            return Err(ControlError::unsupported(&device.device, descriptor.instance));
        }

        let url = self.endpoint("/device/control");
        let request = ControlDeviceRequest {
            request_id: new_request_id(),
            payload: ControlDevicePayload {
                sku: device.sku.to_string(),
                device: device.device.to_string(),
                capability: ControlDeviceCapability {
                    kind: descriptor.kind,
                    instance: descriptor.instance.to_string(),
                    value: value.into(),
                },
            },
        };

        let _: IgnoredAny = self
            .request_with_json_response(Method::POST, &url, &request)
            .await?;

        Ok(())
    }

    pub async fn turn_on(&self, device: &DeviceInfo) -> Result<()> {
        self.control_device(device, CapabilityKind::Power, 1).await
    }

    pub async fn turn_off(&self, device: &DeviceInfo) -> Result<()> {
        self.control_device(device, CapabilityKind::Power, 0).await
    }

    /// Reads the live power state and sends its inverse.
    /// Returns the power value that was sent.
    pub async fn toggle_power_state(&self, device: &DeviceInfo) -> Result<u8> {
        let state = self.get_device_state(&device.device_ref()).await?;
        let current = state
            .state_value(CapabilityKind::Power)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                ControlError::unsupported(
                    &device.device,
                    CapabilityKind::Power.descriptor().instance,
                )
            })?;

        let next = if current == 0 { 1 } else { 0 };
        self.control_device(device, CapabilityKind::Power, next)
            .await?;
        Ok(next)
    }

    pub async fn set_brightness(&self, device: &DeviceInfo, percent: u32) -> Result<()> {
        let value = device.clamp_to_range(CapabilityKind::Brightness, percent);
        self.control_device(device, CapabilityKind::Brightness, value)
            .await
    }

    pub async fn set_color(&self, device: &DeviceInfo, rgb: u32) -> Result<()> {
        self.control_device(device, CapabilityKind::Color, rgb & 0xff_ff_ff)
            .await
    }

    pub async fn set_color_temperature(&self, device: &DeviceInfo, kelvin: u32) -> Result<()> {
        let value = device.clamp_to_range(CapabilityKind::ColorTemperature, kelvin);
        self.control_device(device, CapabilityKind::ColorTemperature, value)
            .await
    }

    pub async fn set_light_scene(&self, device_id: &str, scene: JsonValue) -> Result<()> {
        let device = self.get_device_or_fail(device_id).await?;
        self.control_device(&device, CapabilityKind::LightScene, scene)
            .await
    }

    pub async fn set_diy_scene(&self, device: &DeviceInfo, scene: JsonValue) -> Result<()> {
        self.control_device(device, CapabilityKind::DiyScene, scene)
            .await
    }

    pub async fn set_snapshot_scene(&self, device: &DeviceInfo, scene: JsonValue) -> Result<()> {
        self.control_device(device, CapabilityKind::SnapshotScene, scene)
            .await
    }

    async fn list_scene_capabilities(
        &self,
        url: &str,
        device: &DeviceRef,
    ) -> Result<Vec<DeviceCapability>> {
        let request = DeviceRequest {
            request_id: new_request_id(),
            payload: device.clone(),
        };

        let resp: GetDeviceScenesResponse = self
            .request_with_json_response(Method::POST, url, &request)
            .await?;

        Ok(resp.payload.capabilities)
    }

    /// Lists the light scenes the API reports for the device
    pub async fn get_light_scenes(&self, device_id: &str) -> Result<Vec<EnumOption>> {
        let device = self.get_device_or_fail(device_id).await?;
        let url = self.endpoint("/device/scenes");
        let caps = self
            .list_scene_capabilities(&url, &device.device_ref())
            .await?;
        scene_options(&device, &caps, CapabilityKind::LightScene)
    }

    /// Lists the DIY scenes the API reports for the device
    pub async fn get_diy_scenes(&self, device: &DeviceInfo) -> Result<Vec<EnumOption>> {
        let url = self.endpoint("/device/diy-scenes");
        let caps = self
            .list_scene_capabilities(&url, &device.device_ref())
            .await?;
        scene_options(device, &caps, CapabilityKind::DiyScene)
    }

    /// Snapshots have no listing endpoint; their options are only
    /// available from the inventory metadata.
    pub fn get_snapshot_scenes(&self, device: &DeviceInfo) -> Vec<EnumOption> {
        sort_scene_options(device.options(CapabilityKind::SnapshotScene))
    }
}

fn scene_options(
    device: &DeviceInfo,
    caps: &[DeviceCapability],
    kind: CapabilityKind,
) -> Result<Vec<EnumOption>> {
    let descriptor = kind.descriptor();
    if find_capability(caps, &descriptor).is_none() {
        return Err(ControlError::unsupported(&device.device, descriptor.instance));
    }
    Ok(sort_scene_options(extract_options(caps, &descriptor)))
}

fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The minimal identity of a device, as carried in request payloads
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub sku: String,
    pub device: String,
}

#[derive(Serialize, Debug)]
struct DeviceRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub payload: DeviceRef,
}

#[derive(Serialize, Debug)]
struct ControlDeviceRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub payload: ControlDevicePayload,
}

#[derive(Serialize, Debug)]
struct ControlDevicePayload {
    pub sku: String,
    pub device: String,
    pub capability: ControlDeviceCapability,
}

#[derive(Serialize, Debug)]
struct ControlDeviceCapability {
    #[serde(rename = "type")]
    pub kind: DeviceCapabilityKind,
    pub instance: String,
    pub value: JsonValue,
}

/// The fields common to every response body.
/// The device list reports its text as `message`, everything
/// else uses `msg`.
#[derive(Deserialize, Debug, Default)]
struct ResponseEnvelope {
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ResponseEnvelope {
    fn text(self) -> Option<String> {
        self.msg.or(self.message)
    }
}

#[derive(Deserialize, Debug)]
struct GetDevicesResponse {
    pub data: Vec<DeviceInfo>,
}

#[derive(Deserialize, Debug)]
struct GetDeviceStateResponse {
    pub payload: DeviceState,
}

#[derive(Deserialize, Debug)]
struct GetDeviceScenesResponse {
    pub payload: DeviceState,
}

/// A capability snapshot for one device, as returned by the
/// state and scene listing endpoints
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceState {
    pub sku: String,
    pub device: String,
    #[serde(default)]
    pub capabilities: Vec<DeviceCapability>,
}

impl DeviceState {
    pub fn state_value(&self, kind: CapabilityKind) -> Option<&JsonValue> {
        extract_state(&self.capabilities, &kind.descriptor())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceInfo {
    pub sku: String,
    pub device: String,
    #[serde(default, rename = "deviceName")]
    pub device_name: String,
    #[serde(default, rename = "type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub capabilities: Vec<DeviceCapability>,
}

impl DeviceInfo {
    pub fn device_ref(&self) -> DeviceRef {
        DeviceRef {
            sku: self.sku.to_string(),
            device: self.device.to_string(),
        }
    }

    /// The name assigned in the Govee App, falling back to the id
    pub fn name(&self) -> &str {
        if self.device_name.is_empty() {
            &self.device
        } else {
            &self.device_name
        }
    }

    pub fn capability(&self, descriptor: &CapabilityDescriptor) -> Option<&DeviceCapability> {
        find_capability(&self.capabilities, descriptor)
    }

    pub fn supports(&self, kind: CapabilityKind) -> bool {
        self.capability(&kind.descriptor()).is_some()
    }

    pub fn options(&self, kind: CapabilityKind) -> Vec<EnumOption> {
        extract_options(&self.capabilities, &kind.descriptor())
    }

    pub fn integer_range(&self, kind: CapabilityKind) -> Option<(u32, u32)> {
        let cap = self.capability(&kind.descriptor())?;

        match cap.parameters {
            Some(DeviceParameters::Integer {
                range: IntegerRange { min, max, .. },
                ..
            }) => Some((min, max)),
            _ => None,
        }
    }

    fn clamp_to_range(&self, kind: CapabilityKind, value: u32) -> u32 {
        match self.integer_range(kind) {
            Some((min, max)) if min <= max => value.max(min).min(max),
            _ => value,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    #[serde(rename = "devices.types.light")]
    #[default]
    Light,
    #[serde(rename = "devices.types.air_purifier")]
    AirPurifier,
    #[serde(rename = "devices.types.thermometer")]
    Thermometer,
    #[serde(rename = "devices.types.socket")]
    Socket,
    #[serde(rename = "devices.types.sensor")]
    Sensor,
    #[serde(rename = "devices.types.heater")]
    Heater,
    #[serde(rename = "devices.types.humidifier")]
    Humidifer,
    #[serde(rename = "devices.types.dehumidifier")]
    Dehumidifer,
    #[serde(rename = "devices.types.ice_maker")]
    IceMaker,
    #[serde(rename = "devices.types.aroma_diffuser")]
    AromaDiffuser,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCapabilityKind {
    #[serde(rename = "devices.capabilities.on_off")]
    OnOff,
    #[serde(rename = "devices.capabilities.toggle")]
    Toggle,
    #[serde(rename = "devices.capabilities.range")]
    Range,
    #[serde(rename = "devices.capabilities.mode")]
    Mode,
    #[serde(rename = "devices.capabilities.color_setting")]
    ColorSetting,
    #[serde(rename = "devices.capabilities.segment_color_setting")]
    SegmentColorSetting,
    #[serde(rename = "devices.capabilities.music_setting")]
    MusicSetting,
    #[serde(rename = "devices.capabilities.dynamic_scene")]
    DynamicScene,
    #[serde(rename = "devices.capabilities.work_mode")]
    WorkMode,
    #[serde(rename = "devices.capabilities.dynamic_setting")]
    DynamicSetting,
    #[serde(rename = "devices.capabilities.temperature_setting")]
    TemperatureSetting,
    #[serde(rename = "devices.capabilities.online")]
    Online,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceCapability {
    #[serde(rename = "type")]
    pub kind: DeviceCapabilityKind,
    pub instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<DeviceParameters>,
    /// Only present in state responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<CapabilityState>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CapabilityState {
    #[serde(default)]
    pub value: JsonValue,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "dataType")]
pub enum DeviceParameters {
    #[serde(rename = "ENUM")]
    Enum {
        #[serde(default)]
        options: Vec<EnumOption>,
    },
    #[serde(rename = "INTEGER")]
    Integer {
        unit: Option<String>,
        range: IntegerRange,
    },
    /// STRUCT and Array parameters describe capabilities
    /// that the deck does not drive
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct IntegerRange {
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub precision: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EnumOption {
    pub name: String,
    #[serde(default)]
    pub value: JsonValue,
}

pub fn from_json<T: serde::de::DeserializeOwned, S: AsRef<[u8]>>(
    url: &str,
    text: S,
) -> Result<T> {
    let text = text.as_ref();
    serde_json_path_to_error::from_slice(text).map_err(|err| ControlError::Decode {
        url: url.to_string(),
        message: format!("{err}. Input: {}", String::from_utf8_lossy(text)),
    })
}

/// Validates the HTTP status and the embedded `code` before decoding
/// the body as `R`
pub async fn http_response_body<R: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<R> {
    let url = response.url().to_string();
    let status = response.status();
    let data = response.bytes().await?;

    if status != StatusCode::OK {
        let message = serde_json::from_slice::<ResponseEnvelope>(&data)
            .ok()
            .and_then(ResponseEnvelope::text)
            .unwrap_or_else(|| {
                if data.is_empty() {
                    status.canonical_reason().unwrap_or("").to_string()
                } else {
                    String::from_utf8_lossy(&data).to_string()
                }
            });
        return Err(ControlError::Api {
            code: status.as_u16() as u32,
            message,
        });
    }

    let envelope: ResponseEnvelope = from_json(&url, &data)?;
    if let Some(code) = envelope.code {
        if code != 200 {
            return Err(ControlError::Api {
                code,
                message: envelope.text().unwrap_or_default(),
            });
        }
    }

    from_json(&url, &data)
}

impl GoveeApiClient {
    /// The key is read on every request so that a replaced key
    /// takes effect immediately
    fn api_key(&self) -> Result<Arc<String>> {
        self.settings.api_key().ok_or(ControlError::MissingApiKey)
    }

    async fn get_request_with_json_response<R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<R> {
        let key = self.api_key()?;
        let response = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?
            .request(Method::GET, url)
            .header("Content-Type", "application/json")
            .header("Govee-API-Key", key.as_str())
            .send()
            .await?;

        http_response_body(response).await
    }

    async fn request_with_json_response<B: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<R> {
        let key = self.api_key()?;
        let response = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?
            .request(method, url)
            .header("Govee-API-Key", key.as_str())
            .json(body)
            .send()
            .await?;

        http_response_body(response).await
    }
}
