use crate::actions::PluginArguments;
use crate::platform_api::GoveeApiArguments;
use clap::Parser;
use std::str::FromStr;

mod actions;
mod capability;
mod commands {
    pub mod control;
    pub mod list;
    pub mod replay;
}
mod debounce;
mod error;
mod inventory;
mod platform_api;
mod settings;
mod version_info;

#[derive(clap::Parser, Debug)]
#[command(version = version_info::deck_version(), propagate_version = true)]
pub struct Args {
    #[command(flatten)]
    api_args: GoveeApiArguments,
    #[command(flatten)]
    plugin_args: PluginArguments,

    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(clap::Parser, Debug)]
enum SubCommand {
    /// List the devices in the account
    List(commands::list::ListCommand),
    /// Send a single command to a device
    Control(commands::control::ControlCommand),
    /// Dispatch host events read from a file or stdin
    Replay(commands::replay::ReplayCommand),
}

impl Args {
    async fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            SubCommand::List(cmd) => cmd.run(self).await,
            SubCommand::Control(cmd) => cmd.run(self).await,
            SubCommand::Replay(cmd) => cmd.run(self).await,
        }
    }
}

pub fn opt_env_var<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    <T as FromStr>::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(p) => {
            Ok(Some(p.parse().map_err(|err| {
                anyhow::anyhow!("parsing ${name}: {err:#}")
            })?))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => anyhow::bail!("${name} is invalid: {err:#}"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    color_backtrace::install();
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from {}", path.display());
    }
    env_logger::init();

    let args = Args::parse();
    log::info!("govee-deck version {}", version_info::deck_version());
    args.run().await
}
