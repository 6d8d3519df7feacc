//! Spawns a fully wired app on an ephemeral port.

use anyhow::Result;
use notifr::{
    app::App,
    channels::ChannelRegistry,
    config::Config,
    targets::TargetsConfig,
};
use crate::helpers::mock_channel::RecordingChannel;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Result<()>>,
}

impl TestApp {
    pub async fn spawn(targets: &str, channels: Vec<Arc<RecordingChannel>>) -> Result<Self> {
        let config = Config {
            listen: "127.0.0.1:0".to_string(),
            targets: TargetsConfig::decode(targets)?,
            ..Config::default()
        };
        let registry = channels
            .into_iter()
            .fold(ChannelRegistry::builder(), |b, c| b.register(c))
            .build();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = App::builder(config)
            .channels_override(registry)
            .build(shutdown_rx)
            .await?;
        let base_url = format!("http://{}", app.local_addr());
        let handle = tokio::spawn(app.run());

        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
            shutdown_tx,
            handle,
        })
    }

    /// Posts `body` to the notify endpoint; `query` is appended verbatim.
    pub async fn notify(&self, query: &str, body: &str) -> Result<(u16, String)> {
        let mut url = format!("{}/notifr", self.base_url);
        if !query.is_empty() {
            url = format!("{url}?{query}");
        }
        let response = self.client.post(url).body(body.to_string()).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text.trim_end_matches('\n').to_string()))
    }

    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx.send(true)?;
        self.handle.await??;
        Ok(())
    }
}
