use crate::actions::{ActionHost, ActionSettings, DataSourceItem, HostEvent, Plugin, PluginConfig};
use crate::platform_api::test::client_for;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    ShowOk(String),
    ShowAlert(String),
    SetTitle(String, String),
    SetState(String, u8),
    SetFeedback(String, JsonValue),
    SetSettings(String, ActionSettings),
    DataSource(String, String, Vec<DataSourceItem>),
}

/// Records every call made on it, in order
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    fn push(&self, call: HostCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ActionHost for RecordingHost {
    async fn show_ok(&self, context: &str) {
        self.push(HostCall::ShowOk(context.to_string()));
    }

    async fn show_alert(&self, context: &str) {
        self.push(HostCall::ShowAlert(context.to_string()));
    }

    async fn set_title(&self, context: &str, title: &str) {
        self.push(HostCall::SetTitle(context.to_string(), title.to_string()));
    }

    async fn set_state(&self, context: &str, state: u8) {
        self.push(HostCall::SetState(context.to_string(), state));
    }

    async fn set_feedback(&self, context: &str, feedback: JsonValue) {
        self.push(HostCall::SetFeedback(context.to_string(), feedback));
    }

    async fn set_settings(&self, context: &str, settings: &ActionSettings) {
        self.push(HostCall::SetSettings(context.to_string(), settings.clone()));
    }

    async fn send_data_source(&self, context: &str, event: &str, items: &[DataSourceItem]) {
        self.push(HostCall::DataSource(
            context.to_string(),
            event.to_string(),
            items.to_vec(),
        ));
    }
}

pub fn plugin_for(server: &MockServer) -> (Plugin, Arc<RecordingHost>) {
    let host = Arc::new(RecordingHost::default());
    let plugin = Plugin::new(
        Arc::new(client_for(server)),
        host.clone(),
        PluginConfig {
            debounce: Duration::from_millis(100),
            ..PluginConfig::default()
        },
    );
    (plugin, host)
}

/// Builds a host event addressed to the control `ctx`
pub fn event(event: &str, action: &str, payload: JsonValue) -> HostEvent {
    serde_json::from_value(json!({
        "event": event,
        "action": format!("dev.govee.deck.{action}"),
        "context": "ctx",
        "payload": payload,
    }))
    .unwrap()
}

pub fn settings_for(device_id: &str) -> ActionSettings {
    ActionSettings {
        device_id: Some(device_id.to_string()),
        ..ActionSettings::default()
    }
}
