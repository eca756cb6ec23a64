use std::sync::Arc;

use anyhow::{Context, Result};
use parceldesk_auth::{FileStore, SessionClient, TokenSession};
use parceldesk_client::ParcelApi;
use parceldesk_config::AppConfig;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::DEBUG)
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything a front end needs, built once from the loaded configuration.
#[derive(Clone)]
pub struct Services {
    pub config: AppConfig,
    pub api: ParcelApi,
}

impl Services {
    pub fn initialise(config: &AppConfig) -> Result<Self> {
        let store = FileStore::new(&config.session.store_path);
        let session = TokenSession::new(Arc::new(store), &config.session);
        let client = SessionClient::new(&config.api, session)
            .context("failed to build http client")?;

        info!(
            base_url = %client.base_url(),
            store = %config.session.store_path,
            authenticated = client.session().is_authenticated(),
            "api client ready"
        );

        Ok(Self {
            config: config.clone(),
            api: ParcelApi::new(client, config),
        })
    }

    pub fn session(&self) -> &TokenSession {
        self.api.session()
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
