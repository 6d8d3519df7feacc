//! The main application logic, decoupled from the entry point.

use crate::{
    channels::{ChannelRegistry, SmtpChannel},
    config::{Config, SmtpConfig},
    dispatch::Dispatcher,
    server::{self, Server},
};
use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// Builds the registry of channels compiled into this binary.
pub fn default_registry(smtp: &SmtpConfig) -> Result<ChannelRegistry> {
    if smtp.host.is_empty() {
        bail!("smtp.host is required (NOTIFR_SMTP_HOST)");
    }
    let smtp = SmtpChannel::from_config(smtp).context("failed to create the SMTP channel")?;
    Ok(ChannelRegistry::builder().register(Arc::new(smtp)).build())
}

/// A validated, bound application ready to serve.
pub struct App {
    server: Server,
    local_addr: SocketAddr,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until the shutdown signal is received.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr, "notifr started");
        self.server.run().await.context("HTTP server failed")?;
        info!("notifr finished");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Routing is validated against the channel registry before the listening
/// socket is bound, so a bad configuration never starts serving.
pub struct AppBuilder {
    config: Config,
    channels_override: Option<ChannelRegistry>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            channels_override: None,
        }
    }

    /// Replaces the compiled-in channels, e.g. with mocks in tests.
    pub fn channels_override(mut self, channels: ChannelRegistry) -> Self {
        self.channels_override = Some(channels);
        self
    }

    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let channels = match self.channels_override {
            Some(channels) => channels,
            None => default_registry(&self.config.smtp)?,
        };
        let dispatcher = Dispatcher::new(self.config.targets, channels)
            .context("invalid target configuration")?;

        let listener = TcpListener::bind(&self.config.listen)
            .await
            .with_context(|| format!("failed to bind {}", self.config.listen))?;
        let local_addr = listener.local_addr()?;

        let server = Server::new(listener, server::router(dispatcher), shutdown_rx);
        Ok(App { server, local_addr })
    }
}
