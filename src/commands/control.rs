use crate::capability::CapabilityKind;
use crate::platform_api::{DeviceInfo, EnumOption, GoveeApiClient};

#[derive(clap::Parser, Debug)]
pub struct ControlCommand {
    #[arg(long)]
    pub id: String,

    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(clap::Parser, Debug, PartialEq)]
enum SubCommand {
    On,
    Off,
    Toggle,
    /// Show the live state of the device
    State,
    Brightness {
        #[arg(value_parser = crate::actions::percent)]
        percent: u32,
    },
    Temperature {
        kelvin: u32,
    },
    Color {
        color: csscolorparser::Color,
    },
    Scene(SceneArgs),
    DiyScene(SceneArgs),
    SnapshotScene(SceneArgs),
}

#[derive(clap::Parser, Debug, PartialEq)]
struct SceneArgs {
    /// List available scenes
    #[arg(long)]
    list: bool,

    /// Name of a scene to activate
    #[arg(required_unless_present = "list")]
    scene: Option<String>,
}

impl ControlCommand {
    pub async fn run(&self, args: &crate::Args) -> anyhow::Result<()> {
        let client = args.api_args.api_client()?;
        let device = client.get_device_or_fail(&self.id).await?;

        match &self.cmd {
            SubCommand::On => client.turn_on(&device).await?,
            SubCommand::Off => client.turn_off(&device).await?,
            SubCommand::Toggle => {
                let power = client.toggle_power_state(&device).await?;
                println!("powerSwitch is now {power}");
            }
            SubCommand::State => {
                let state = client.get_device_state(&device.device_ref()).await?;
                for cap in &state.capabilities {
                    let value = cap
                        .state
                        .as_ref()
                        .map(|s| s.value.to_string())
                        .unwrap_or_default();
                    println!("{:<20} {value}", cap.instance);
                }
            }
            SubCommand::Brightness { percent } => {
                client.set_brightness(&device, *percent).await?;
            }
            SubCommand::Temperature { kelvin } => {
                client.set_color_temperature(&device, *kelvin).await?;
            }
            SubCommand::Color { color } => {
                let [r, g, b, _a] = color.to_rgba8();
                let value = ((r as u32) << 16) | ((g as u32) << 8) | (b as u32);
                client.set_color(&device, value).await?;
            }
            SubCommand::Scene(scene) => {
                scene
                    .run(&client, &device, CapabilityKind::LightScene)
                    .await?
            }
            SubCommand::DiyScene(scene) => {
                scene
                    .run(&client, &device, CapabilityKind::DiyScene)
                    .await?
            }
            SubCommand::SnapshotScene(scene) => {
                scene
                    .run(&client, &device, CapabilityKind::SnapshotScene)
                    .await?
            }
        }

        Ok(())
    }
}

impl SceneArgs {
    async fn run(
        &self,
        client: &GoveeApiClient,
        device: &DeviceInfo,
        kind: CapabilityKind,
    ) -> anyhow::Result<()> {
        let scenes: Vec<EnumOption> = match kind {
            CapabilityKind::LightScene => client.get_light_scenes(&device.device).await?,
            CapabilityKind::DiyScene => client.get_diy_scenes(device).await?,
            _ => client.get_snapshot_scenes(device),
        };

        if self.list {
            for scene in &scenes {
                println!("{}", scene.name);
            }
            return Ok(());
        }

        let Some(name) = &self.scene else {
            return Ok(());
        };
        let Some(scene) = scenes.iter().find(|s| s.name.eq_ignore_ascii_case(name)) else {
            anyhow::bail!("{kind} {name} not found");
        };

        let value = scene.value.clone();
        match kind {
            CapabilityKind::LightScene => client.set_light_scene(&device.device, value).await?,
            CapabilityKind::DiyScene => client.set_diy_scene(device, value).await?,
            _ => client.set_snapshot_scene(device, value).await?,
        }
        Ok(())
    }
}
