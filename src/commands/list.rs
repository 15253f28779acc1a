use crate::capability::CapabilityKind;
use crate::platform_api::DeviceInfo;
use strum::IntoEnumIterator;

#[derive(clap::Parser, Debug)]
pub struct ListCommand {
    /// Also show the controls each device supports
    #[arg(long)]
    capabilities: bool,

    /// Only show this device
    #[arg(long)]
    id: Option<String>,
}

impl ListCommand {
    pub async fn run(&self, args: &crate::Args) -> anyhow::Result<()> {
        let client = args.api_args.api_client()?;

        if let Some(id) = &self.id {
            match client.get_device(id).await? {
                Some(d) => self.print(&d),
                None => eprintln!("no device with id {id}"),
            }
            return Ok(());
        }

        for d in client.get_devices().await?.iter() {
            self.print(d);
        }
        Ok(())
    }

    fn print(&self, d: &DeviceInfo) {
        println!(
            "{sku:<7} {id} {name}",
            sku = d.sku,
            id = d.device,
            name = d.name()
        );

        if self.capabilities {
            let kinds: Vec<String> = CapabilityKind::iter()
                .filter(|kind| d.supports(*kind))
                .map(|kind| kind.to_string())
                .collect();
            println!("        {}", kinds.join(" "));
        }
    }
}
