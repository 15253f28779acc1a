use crate::actions::{adjust, ActionContext, ActionHandler, Plugin};
use crate::capability::CapabilityKind;
use crate::platform_api::DeviceInfo;
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_KELVIN_RANGE: (u32, u32) = (2000, 9000);
const BRIGHTNESS_RANGE: (u32, u32) = (1, 100);

/// Actions that hold a numeric value in the control's settings.
/// A key press applies the stored value; turning the dial adjusts it
/// and sends it once the dial comes to rest.
pub enum DialAction {
    Brightness,
    ColorTemperature,
}

impl DialAction {
    fn value(&self, action: &ActionContext) -> Option<u32> {
        match self {
            Self::Brightness => action.settings.brightness,
            Self::ColorTemperature => action.settings.color_temperature,
        }
    }

    fn set_value(&self, action: &mut ActionContext, value: u32) {
        match self {
            Self::Brightness => action.settings.brightness = Some(value),
            Self::ColorTemperature => action.settings.color_temperature = Some(value),
        }
    }

    fn step(&self, plugin: &Plugin) -> u32 {
        match self {
            Self::Brightness => plugin.config().brightness_step,
            Self::ColorTemperature => plugin.config().kelvin_step,
        }
    }

    fn range(&self, device: &DeviceInfo) -> (u32, u32) {
        match self {
            Self::Brightness => BRIGHTNESS_RANGE,
            Self::ColorTemperature => device
                .integer_range(CapabilityKind::ColorTemperature)
                .filter(|(min, max)| min < max)
                .unwrap_or(DEFAULT_KELVIN_RANGE),
        }
    }

    fn feedback(&self, value: u32, (min, max): (u32, u32)) -> serde_json::Value {
        let indicator = if max > min {
            (value.clamp(min, max) - min) * 100 / (max - min)
        } else {
            100
        };
        let text = match self {
            Self::Brightness => format!("{value}%"),
            Self::ColorTemperature => format!("{value}K"),
        };
        json!({"value": text, "indicator": indicator})
    }

    async fn send(&self, plugin: &Plugin, device: &DeviceInfo, value: u32) -> anyhow::Result<()> {
        let client = plugin.client();
        match self {
            Self::Brightness => client.set_brightness(device, value).await?,
            Self::ColorTemperature => client.set_color_temperature(device, value).await?,
        }
        Ok(())
    }
}

#[async_trait]
impl ActionHandler for DialAction {
    fn kind(&self) -> CapabilityKind {
        match self {
            Self::Brightness => CapabilityKind::Brightness,
            Self::ColorTemperature => CapabilityKind::ColorTemperature,
        }
    }

    /// Shows the device name and seeds the stored value from the
    /// device's live state
    async fn will_appear(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        plugin.refresh_title(action).await?;
        if action.settings.device_id.is_none() {
            return Ok(());
        }

        let device = plugin.selected_device(action).await?;
        let state = plugin.client().get_device_state(&device.device_ref()).await?;
        let live = state
            .state_value(self.kind())
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok());

        if let Some(live) = live {
            if self.value(action) != Some(live) {
                self.set_value(action, live);
                plugin.persist(action).await;
            }
        }

        if let Some(value) = self.value(action) {
            plugin
                .host()
                .set_feedback(&action.context, self.feedback(value, self.range(&device)))
                .await;
        }
        Ok(())
    }

    async fn key_down(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        let device = plugin.selected_device(action).await?;
        let Some(value) = self.value(action) else {
            anyhow::bail!("no {} value has been set", self.kind());
        };
        self.send(plugin, &device, value).await?;
        plugin.host().show_ok(&action.context).await;
        Ok(())
    }

    async fn dial_rotate(
        &self,
        plugin: &Plugin,
        action: &mut ActionContext,
        ticks: i32,
    ) -> anyhow::Result<()> {
        let device = plugin.selected_device(action).await?;
        let (min, max) = self.range(&device);
        let current = self.value(action).unwrap_or(match self {
            Self::Brightness => 50,
            Self::ColorTemperature => (min + max) / 2,
        });
        let next = adjust(current, ticks, self.step(plugin), min, max);

        self.set_value(action, next);
        plugin.persist(action).await;
        plugin
            .host()
            .set_feedback(&action.context, self.feedback(next, (min, max)))
            .await;

        let client = plugin.client.clone();
        match self {
            Self::Brightness => plugin.debounce(action, "set brightness", async move {
                client.set_brightness(&device, next).await
            }),
            Self::ColorTemperature => {
                plugin.debounce(action, "set color temperature", async move {
                    client.set_color_temperature(&device, next).await
                })
            }
        }
        Ok(())
    }

    /// Pressing the dial toggles power; a pending adjustment is
    /// dropped so that it cannot turn the light back on afterwards
    async fn dial_down(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        if plugin.debouncer().cancel(&action.context) {
            log::debug!("{}: dropped pending {} adjustment", action.context, self.kind());
        }
        let device = plugin.selected_device(action).await?;
        plugin.client().toggle_power_state(&device).await?;
        plugin.host().show_ok(&action.context).await;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::DialAction;
    use crate::actions::testing::*;
    use crate::actions::ActionSettings;
    use crate::platform_api::test::{control_ok, mount_device_list, state_response};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn indicator_stays_within_range() {
        let dial = DialAction::ColorTemperature;
        k9::assert_equal!(
            dial.feedback(9000, (2700, 6500)),
            json!({"value": "9000K", "indicator": 100})
        );
        k9::assert_equal!(
            dial.feedback(1000, (2700, 6500)),
            json!({"value": "1000K", "indicator": 0})
        );
        k9::assert_equal!(
            DialAction::Brightness.feedback(50, (1, 100)),
            json!({"value": "50%", "indicator": 49})
        );
    }

    fn brightness(value: u32) -> ActionSettings {
        ActionSettings {
            brightness: Some(value),
            ..settings_for("D1")
        }
    }

    #[tokio::test]
    async fn rotation_burst_sends_one_command() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/control"))
            .and(body_partial_json(json!({
                "payload": {"capability": {"instance": "brightness", "value": 55}}
            })))
            .respond_with(control_ok())
            .expect(1)
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        for start in [40, 45, 50] {
            plugin
                .dispatch(event(
                    "dialRotate",
                    "brightness",
                    json!({"settings": brightness(start), "ticks": 1}),
                ))
                .await;
        }
        plugin.settle().await;

        let calls = host.calls();
        k9::assert_equal!(
            calls.last().cloned(),
            Some(HostCall::SetFeedback(
                "ctx".to_string(),
                json!({"value": "55%", "indicator": 54})
            ))
        );
        assert!(calls.contains(&HostCall::SetSettings("ctx".to_string(), brightness(55))));
        assert!(!calls.contains(&HostCall::ShowAlert("ctx".to_string())));
        server.verify().await;
    }

    #[tokio::test]
    async fn rotation_stays_in_range() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/control"))
            .and(body_partial_json(json!({
                "payload": {"capability": {"instance": "colorTemperatureK", "value": 2700}}
            })))
            .respond_with(control_ok())
            .expect(1)
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "dialRotate",
                "colorTemperature",
                json!({"settings": {"deviceId": "D1", "colorTemperature": 2800}, "ticks": -5}),
            ))
            .await;
        plugin.settle().await;

        assert!(host.calls().contains(&HostCall::SetFeedback(
            "ctx".to_string(),
            json!({"value": "2700K", "indicator": 0})
        )));
        server.verify().await;
    }

    #[tokio::test]
    async fn dial_press_cancels_pending_adjustment() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(state_response(1)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/device/control"))
            .and(body_partial_json(json!({
                "payload": {"capability": {"instance": "brightness"}}
            })))
            .respond_with(control_ok())
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/device/control"))
            .and(body_partial_json(json!({
                "payload": {"capability": {"instance": "powerSwitch", "value": 0}}
            })))
            .respond_with(control_ok())
            .expect(1)
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "dialRotate",
                "brightness",
                json!({"settings": brightness(40), "ticks": 2}),
            ))
            .await;
        plugin
            .dispatch(event(
                "touchTap",
                "brightness",
                json!({"settings": brightness(50)}),
            ))
            .await;
        plugin.settle().await;

        assert!(!plugin.debouncer().is_pending("ctx"));
        k9::assert_equal!(host.calls().last().cloned(), Some(HostCall::ShowOk("ctx".to_string())));
        server.verify().await;
    }

    #[tokio::test]
    async fn appear_seeds_value_from_live_state() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(state_response(1)))
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "willAppear",
                "brightness",
                json!({"settings": {"deviceId": "D1", "deviceName": "Floor Lamp"}}),
            ))
            .await;

        let mut expect = brightness(42);
        expect.device_name = Some("Floor Lamp".to_string());
        k9::assert_equal!(
            host.calls(),
            vec![
                HostCall::SetTitle("ctx".to_string(), "Floor Lamp".to_string()),
                HostCall::SetSettings("ctx".to_string(), expect),
                HostCall::SetFeedback(
                    "ctx".to_string(),
                    json!({"value": "42%", "indicator": 41})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn key_press_applies_stored_value() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/control"))
            .and(body_partial_json(json!({
                "payload": {"capability": {"instance": "brightness", "value": 80}}
            })))
            .respond_with(control_ok())
            .expect(1)
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event("keyDown", "brightness", json!({"settings": brightness(80)})))
            .await;
        k9::assert_equal!(host.calls(), vec![HostCall::ShowOk("ctx".to_string())]);
    }
}
