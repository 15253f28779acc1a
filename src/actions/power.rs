use crate::actions::{ActionContext, ActionHandler, Plugin, PowerMode};
use crate::capability::CapabilityKind;
use async_trait::async_trait;

/// Turns the selected device on, off, or toggles it, according to
/// the persisted power mode. The key's state mirrors the power state.
pub struct PowerAction;

#[async_trait]
impl ActionHandler for PowerAction {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Power
    }

    async fn will_appear(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        plugin.refresh_title(action).await?;
        if action.settings.device_id.is_none() {
            return Ok(());
        }

        let device = plugin.selected_device(action).await?;
        let state = plugin.client().get_device_state(&device.device_ref()).await?;
        if let Some(power) = state
            .state_value(CapabilityKind::Power)
            .and_then(|v| v.as_u64())
        {
            plugin
                .host()
                .set_state(&action.context, if power == 0 { 0 } else { 1 })
                .await;
        }
        Ok(())
    }

    async fn key_down(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        let device = plugin.selected_device(action).await?;
        let client = plugin.client();

        let power = match action.settings.power_mode.unwrap_or_default() {
            PowerMode::Toggle => client.toggle_power_state(&device).await?,
            PowerMode::On => {
                client.turn_on(&device).await?;
                1
            }
            PowerMode::Off => {
                client.turn_off(&device).await?;
                0
            }
        };

        plugin.host().set_state(&action.context, power).await;
        Ok(())
    }
}
