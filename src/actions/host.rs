use crate::actions::{ActionHost, ActionSettings, DataSourceItem};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

/// Writes each host request to stdout as one JSON line, in the
/// shape the host expects to receive them
pub struct StdoutHost;

impl StdoutHost {
    fn emit(&self, event: &str, context: &str, payload: JsonValue) {
        log::debug!("{event} -> {context}");
        println!(
            "{}",
            json!({"event": event, "context": context, "payload": payload})
        );
    }
}

#[async_trait]
impl ActionHost for StdoutHost {
    async fn show_ok(&self, context: &str) {
        self.emit("showOk", context, JsonValue::Null);
    }

    async fn show_alert(&self, context: &str) {
        self.emit("showAlert", context, JsonValue::Null);
    }

    async fn set_title(&self, context: &str, title: &str) {
        self.emit("setTitle", context, json!({"title": title}));
    }

    async fn set_state(&self, context: &str, state: u8) {
        self.emit("setState", context, json!({"state": state}));
    }

    async fn set_feedback(&self, context: &str, feedback: JsonValue) {
        self.emit("setFeedback", context, feedback);
    }

    async fn set_settings(&self, context: &str, settings: &ActionSettings) {
        self.emit("setSettings", context, json!(settings));
    }

    async fn send_data_source(&self, context: &str, event: &str, items: &[DataSourceItem]) {
        self.emit(
            "sendToPropertyInspector",
            context,
            json!({"event": event, "items": items}),
        );
    }
}
