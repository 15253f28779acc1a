use crate::actions::{ActionContext, ActionHandler, Plugin};
use crate::capability::CapabilityKind;
use crate::platform_api::{DeviceInfo, EnumOption};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Activates the scene stored in the control's settings.
/// The three scene families differ only in where their options
/// are listed from.
pub enum SceneAction {
    Light,
    Diy,
    Snapshot,
}

#[async_trait]
impl ActionHandler for SceneAction {
    fn kind(&self) -> CapabilityKind {
        match self {
            Self::Light => CapabilityKind::LightScene,
            Self::Diy => CapabilityKind::DiyScene,
            Self::Snapshot => CapabilityKind::SnapshotScene,
        }
    }

    async fn key_down(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        let Some(device_id) = action.settings.device_id.as_deref() else {
            anyhow::bail!("no device has been selected");
        };
        let Some(scene) = action.settings.scene.as_deref() else {
            anyhow::bail!("no scene has been chosen");
        };
        let scene: JsonValue = serde_json::from_str(scene)
            .with_context(|| format!("stored scene value {scene} is not valid JSON"))?;

        let client = plugin.client();
        match self {
            Self::Light => client.set_light_scene(device_id, scene).await?,
            Self::Diy => {
                let device = client.get_device_or_fail(device_id).await?;
                client.set_diy_scene(&device, scene).await?
            }
            Self::Snapshot => {
                let device = client.get_device_or_fail(device_id).await?;
                client.set_snapshot_scene(&device, scene).await?
            }
        }

        plugin.host().show_ok(&action.context).await;
        Ok(())
    }

    async fn list_scenes(
        &self,
        plugin: &Plugin,
        device: &DeviceInfo,
    ) -> anyhow::Result<Vec<EnumOption>> {
        let client = plugin.client();
        Ok(match self {
            Self::Light => client.get_light_scenes(&device.device).await?,
            Self::Diy => client.get_diy_scenes(device).await?,
            Self::Snapshot => client.get_snapshot_scenes(device),
        })
    }
}

#[cfg(test)]
mod test {
    use crate::actions::testing::*;
    use crate::actions::DataSourceItem;
    use crate::platform_api::test::{control_ok, mount_device_list};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scenes(context: &str, items: Vec<DataSourceItem>) -> HostCall {
        HostCall::DataSource(context.to_string(), "getScenes".to_string(), items)
    }

    #[tokio::test]
    async fn snapshot_scenes_are_listed_without_a_request() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "didReceiveSettings",
                "snapshotScene",
                json!({"settings": {"deviceId": "D1", "deviceName": "Floor Lamp"}}),
            ))
            .await;
        plugin
            .dispatch(event("sendToPlugin", "snapshotScene", json!({"event": "getScenes"})))
            .await;

        k9::assert_equal!(
            host.calls().last().cloned(),
            Some(scenes(
                "ctx",
                vec![
                    DataSourceItem::new("Party", "2"),
                    DataSourceItem::new("Sunset", "1"),
                ]
            ))
        );
    }

    #[tokio::test]
    async fn device_without_snapshots_gets_one_placeholder() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "didReceiveSettings",
                "snapshotScene",
                json!({"settings": {"deviceId": "T1", "deviceName": "Thermometer"}}),
            ))
            .await;
        plugin
            .dispatch(event("sendToPlugin", "snapshotScene", json!({"event": "getScenes"})))
            .await;

        k9::assert_equal!(
            host.calls().last().cloned(),
            Some(scenes(
                "ctx",
                vec![DataSourceItem::placeholder("No scenes available")]
            ))
        );
    }

    #[tokio::test]
    async fn failed_listing_gets_one_placeholder() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/diy-scenes"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "slow down"})))
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "didReceiveSettings",
                "diyScene",
                json!({"settings": {"deviceId": "D1", "deviceName": "Floor Lamp"}}),
            ))
            .await;
        plugin
            .dispatch(event("sendToPlugin", "diyScene", json!({"event": "getScenes"})))
            .await;

        k9::assert_equal!(
            host.calls().last().cloned(),
            Some(scenes(
                "ctx",
                vec![DataSourceItem::placeholder("Failed to load scenes")]
            ))
        );
    }

    #[tokio::test]
    async fn refresh_refetches_the_inventory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/devices"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(crate::platform_api::test::device_list()),
            )
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/device/scenes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "msg": "success",
                "payload": {
                    "sku": "H6072",
                    "device": "D1",
                    "capabilities": [{
                        "type": "devices.capabilities.dynamic_scene",
                        "instance": "lightScene",
                        "parameters": {
                            "dataType": "ENUM",
                            "options": [
                                {"name": "rainbow", "value": {"id": 2, "paramId": 20}},
                                {"name": "Aurora", "value": {"id": 1, "paramId": 10}}
                            ]
                        }
                    }]
                }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "didReceiveSettings",
                "lightScene",
                json!({"settings": {"deviceId": "D1", "deviceName": "Floor Lamp"}}),
            ))
            .await;
        plugin
            .dispatch(event("sendToPlugin", "lightScene", json!({"event": "getScenes"})))
            .await;
        plugin
            .dispatch(event(
                "sendToPlugin",
                "lightScene",
                json!({"event": "getScenes", "isRefresh": true}),
            ))
            .await;

        let expect = scenes(
            "ctx",
            vec![
                DataSourceItem::new("Aurora", r#"{"id":1,"paramId":10}"#),
                DataSourceItem::new("rainbow", r#"{"id":2,"paramId":20}"#),
            ],
        );
        k9::assert_equal!(host.calls().last().cloned(), Some(expect));
        server.verify().await;
    }

    #[tokio::test]
    async fn key_press_activates_stored_scene() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/control"))
            .and(body_partial_json(json!({
                "payload": {"capability": {
                    "type": "devices.capabilities.dynamic_scene",
                    "instance": "lightScene",
                    "value": {"id": 1, "paramId": 10}
                }}
            })))
            .respond_with(control_ok())
            .expect(1)
            .mount(&server)
            .await;

        let (plugin, host) = plugin_for(&server);
        plugin
            .dispatch(event(
                "keyDown",
                "lightScene",
                json!({"settings": {"deviceId": "D1", "scene": r#"{"id":1,"paramId":10}"#}}),
            ))
            .await;
        k9::assert_equal!(host.calls(), vec![HostCall::ShowOk("ctx".to_string())]);
    }
}
