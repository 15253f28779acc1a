use crate::actions::host::StdoutHost;
use crate::actions::{HostEvent, Plugin};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Feeds host events, one JSON object per line, to the action
/// handlers. Requests the handlers make of the host are written
/// to stdout.
#[derive(clap::Parser, Debug)]
pub struct ReplayCommand {
    /// Read events from this file rather than stdin
    #[arg(long)]
    file: Option<PathBuf>,
}

impl ReplayCommand {
    pub async fn run(&self, args: &crate::Args) -> anyhow::Result<()> {
        let settings = args.api_args.global_settings()?;
        let client = crate::platform_api::GoveeApiClient::with_server(
            settings,
            args.api_args.api_server()?,
        );
        let plugin = Plugin::new(
            Arc::new(client),
            Arc::new(StdoutHost),
            args.plugin_args.to_config(),
        );

        let count = match &self.file {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                replay(&plugin, BufReader::new(file)).await?
            }
            None => replay(&plugin, BufReader::new(tokio::io::stdin())).await?,
        };
        log::info!("replayed {count} events");
        Ok(())
    }
}

/// Dispatches each event in turn, then waits for debounced commands
/// to be sent. Returns the number of events dispatched.
async fn replay<R: AsyncBufRead + Unpin>(plugin: &Plugin, input: R) -> anyhow::Result<usize> {
    let mut lines = input.lines();
    let mut line_number = 0;
    let mut dispatched = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: HostEvent = serde_json::from_str(line)
            .with_context(|| format!("parsing event on line {line_number}"))?;
        log::trace!("line {line_number}: {event:?}");
        plugin.dispatch(event).await;
        dispatched += 1;
    }

    plugin.settle().await;
    Ok(dispatched)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actions::testing::*;
    use crate::platform_api::test::{control_ok, mount_device_list};
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer};

    #[tokio::test]
    async fn replays_events_from_a_file() {
        let server = MockServer::start().await;
        mount_device_list(&server).await;
        Mock::given(method("POST"))
            .and(path("/device/control"))
            .and(body_partial_json(json!({
                "payload": {"capability": {"instance": "brightness", "value": 30}}
            })))
            .respond_with(control_ok())
            .expect(1)
            .mount(&server)
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# dial the lamp down").unwrap();
        writeln!(
            file,
            "{}",
            json!({
                "event": "dialRotate",
                "action": "brightness",
                "context": "ctx",
                "payload": {"settings": {"deviceId": "D1", "brightness": 40}, "ticks": -2}
            })
        )
        .unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let (plugin, host) = plugin_for(&server);
        let input = BufReader::new(tokio::fs::File::open(file.path()).await.unwrap());
        k9::assert_equal!(replay(&plugin, input).await.unwrap(), 1usize);

        assert!(!host.calls().contains(&HostCall::ShowAlert("ctx".to_string())));
        server.verify().await;
    }

    #[tokio::test]
    async fn reports_the_bad_line() {
        let server = MockServer::start().await;
        let (plugin, _host) = plugin_for(&server);
        let input: &[u8] = b"\n{\"event\": \"keyDown\"}\n";
        let err = replay(&plugin, BufReader::new(input)).await.unwrap_err();
        k9::assert_equal!(err.to_string(), "parsing event on line 2".to_string());
    }
}
