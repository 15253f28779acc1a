use thiserror::Error;

/// Failures raised by the device control client.
/// None of these are retried or logged by the client itself; the
/// calling action decides how to surface them.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Either the HTTP status or the `code` embedded in the response
    /// envelope was something other than 200.
    #[error("Govee API error {code}: {message}")]
    Api { code: u32, message: String },

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("device {device} does not support {instance}")]
    UnsupportedCapability { device: String, instance: String },

    #[error("invalid color '{0}': expected 6 hex digits, optionally prefixed by '#'")]
    InvalidColor(String),

    #[error("no Govee API key has been configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("parsing {url} response: {message}")]
    Decode { url: String, message: String },
}

impl ControlError {
    pub fn unsupported<D: Into<String>, I: Into<String>>(device: D, instance: I) -> Self {
        Self::UnsupportedCapability {
            device: device.into(),
            instance: instance.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
