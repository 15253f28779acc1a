use crate::actions::{ActionContext, ActionHandler, Plugin};
use crate::capability::{color_from_hex, CapabilityKind};
use async_trait::async_trait;

/// Sets the device to the color stored in the control's settings
pub struct ColorAction;

#[async_trait]
impl ActionHandler for ColorAction {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Color
    }

    async fn key_down(&self, plugin: &Plugin, action: &mut ActionContext) -> anyhow::Result<()> {
        let device = plugin.selected_device(action).await?;
        let Some(color) = action.settings.color.as_deref() else {
            anyhow::bail!("no color has been chosen");
        };
        let rgb = color_from_hex(color)?;
        plugin.client().set_color(&device, rgb).await?;
        plugin.host().show_ok(&action.context).await;
        Ok(())
    }
}
