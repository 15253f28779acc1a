//! Maps the controls the deck offers onto the Govee capability model.
//!
//! Govee identifies a capability by an `(instance, type)` pair, for
//! example `("powerSwitch", "devices.capabilities.on_off")`. The deck
//! only drives seven of them, enumerated by [`CapabilityKind`].

use crate::error::{ControlError, Result};
use crate::platform_api::{DeviceCapability, DeviceCapabilityKind, DeviceParameters, EnumOption};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(
    Deserialize,
    Serialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CapabilityKind {
    Power,
    Brightness,
    Color,
    ColorTemperature,
    LightScene,
    DiyScene,
    SnapshotScene,
}

/// The vendor's identification of a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub instance: &'static str,
    pub kind: DeviceCapabilityKind,
}

impl CapabilityKind {
    pub fn descriptor(self) -> CapabilityDescriptor {
        let (instance, kind) = match self {
            Self::Power => ("powerSwitch", DeviceCapabilityKind::OnOff),
            Self::Brightness => ("brightness", DeviceCapabilityKind::Range),
            Self::Color => ("colorRgb", DeviceCapabilityKind::ColorSetting),
            Self::ColorTemperature => ("colorTemperatureK", DeviceCapabilityKind::ColorSetting),
            Self::LightScene => ("lightScene", DeviceCapabilityKind::DynamicScene),
            Self::DiyScene => ("diyScene", DeviceCapabilityKind::DynamicScene),
            Self::SnapshotScene => ("snapshot", DeviceCapabilityKind::DynamicScene),
        };
        CapabilityDescriptor { instance, kind }
    }

    pub fn is_scene(self) -> bool {
        matches!(self, Self::LightScene | Self::DiyScene | Self::SnapshotScene)
    }
}

pub fn find_capability<'a>(
    caps: &'a [DeviceCapability],
    descriptor: &CapabilityDescriptor,
) -> Option<&'a DeviceCapability> {
    caps.iter()
        .find(|c| c.kind == descriptor.kind && c.instance == descriptor.instance)
}

/// Returns the reported `state.value` for the capability.
/// None means either the device lacks the capability or it
/// didn't report a value for it.
pub fn extract_state<'a>(
    caps: &'a [DeviceCapability],
    descriptor: &CapabilityDescriptor,
) -> Option<&'a JsonValue> {
    find_capability(caps, descriptor)?
        .state
        .as_ref()
        .map(|s| &s.value)
        .filter(|v| !v.is_null())
}

pub fn extract_options(
    caps: &[DeviceCapability],
    descriptor: &CapabilityDescriptor,
) -> Vec<EnumOption> {
    match find_capability(caps, descriptor).and_then(|c| c.parameters.as_ref()) {
        Some(DeviceParameters::Enum { options }) => options.clone(),
        _ => vec![],
    }
}

pub fn sort_scene_options(mut options: Vec<EnumOption>) -> Vec<EnumOption> {
    options.sort_by_key(|opt| opt.name.to_ascii_lowercase());
    options
}

/// Parses `RRGGBB` or `#RRGGBB`, in either case, into `0xRRGGBB`
pub fn color_from_hex(hex: &str) -> Result<u32> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 {
        return Err(ControlError::InvalidColor(hex.to_string()));
    }

    let bytes = data_encoding::HEXLOWER_PERMISSIVE
        .decode(digits.as_bytes())
        .map_err(|_| ControlError::InvalidColor(hex.to_string()))?;

    match bytes.as_slice() {
        [r, g, b] => Ok(((*r as u32) << 16) | ((*g as u32) << 8) | (*b as u32)),
        _ => Err(ControlError::InvalidColor(hex.to_string())),
    }
}
