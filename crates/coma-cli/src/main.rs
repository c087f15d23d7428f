use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use coma_core::ComaConfig;
use coma_core::app::{App, AppBuilder};
use coma_core::domain::Application;
use coma_core::impls::InMemoryStore;
use coma_core::ports::{Transport, TransportError};

/// Run the configuration service end to end against an in-memory store.
#[derive(Debug, Parser)]
#[command(name = "coma", version)]
struct Cli {
    /// TOML config file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Client key to write configuration for. A generated application key is used when omitted.
    #[arg(long)]
    client_key: Option<String>,

    /// Keep running after the demo until Ctrl-C.
    #[arg(long)]
    hold: bool,
}

/// Transport that writes every delivery to the log instead of a socket.
struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        info!(topic = %topic, payload = %payload, "delivering configuration");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ComaConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ComaConfig::default(),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)))
        .init();

    let store = Arc::new(InMemoryStore::new());
    let app = AppBuilder::new(config)
        .repositories(store.clone())
        .transport(Arc::new(LogTransport))
        .build()
        .context("building app")?;

    let result = run_demo(&app, &store, cli.client_key).await;

    if result.is_ok() && cli.hold {
        info!("demo finished, waiting for Ctrl-C");
        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    }

    app.shutdown().await;
    result
}

async fn run_demo(app: &App, store: &InMemoryStore, client_key: Option<String>) -> Result<()> {
    // 1) application とキーの発行
    let application = Application::new("demo");
    store.add_application(application.clone()).await;
    let application_id = application.id.to_string();

    let generated = app
        .application_keys
        .generate_or_update_application_key(&application_id)
        .await?;
    println!("generated key for {}: {}", generated.application_name, generated.key);

    let found = app.application_keys.find_application_key(&application_id).await?;
    println!("lookup: {}", serde_json::to_string(&found)?);
    app.application_keys
        .is_exists_application_key(&generated.key)
        .await?;

    // 2) 設定の書き込み（成功するたびに非同期で配信される）
    let client_key = client_key.unwrap_or(generated.key);
    let service = &app.configurations;
    service
        .set_configuration(&client_key, "PORT", Some("80".to_string()))
        .await?;
    let name_id = service
        .set_configuration(&client_key, "NAME", Some("demo".to_string()))
        .await?;
    let debug_id = service.set_configuration(&client_key, "DEBUG", None).await?;
    service
        .upsert_configuration(&client_key, "PORT", Some("8080".to_string()))
        .await?;
    service
        .update_configuration(&client_key, name_id, "NAME", Some("coma-demo".to_string()))
        .await?;
    service.delete_configuration(&client_key, debug_id).await?;

    // 3) 最終状態
    let view = service.get_configuration_view(&client_key).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
