use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod alert;
mod api;
mod config;
mod engine;
mod models;
mod notifier;
mod probe;
mod status;
mod store;

use crate::alert::AlertSender;
use crate::config::Config;
use crate::engine::WorkerConfig;
use crate::models::Monitor;
use crate::notifier::{SlackNotifier, WebhookNotifier};
use crate::store::{ResultSink, Store};

const MESSAGE_BUFFER: usize = 64;

#[derive(Parser, Debug)]
#[command(version, about = "Watches HTTP endpoints and alerts on health changes")]
struct Options {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Options::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::load(&opts.config)
        .with_context(|| format!("Failed to load {}", opts.config.display()))?;
    if config.targets.is_empty() {
        warn!("no targets configured");
    }

    let store = match &config.database {
        Some(path) => Some(Store::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?),
        None => None,
    };
    let monitors = match &store {
        Some(store) => store.sync_monitors(&config.targets).context("Failed to sync monitors")?,
        None => config
            .targets
            .iter()
            .zip(1..)
            .map(|(t, id)| Monitor {
                id,
                name: t.name.clone(),
                method: t.method.clone(),
                url: t.url.clone(),
                follow: t.follow,
            })
            .collect(),
    };

    let (message_tx, message_rx) = mpsc::channel(MESSAGE_BUFFER);
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();

    let mut alert_sender = AlertSender::new(message_rx, error_tx);
    if let Some(slack) = &config.notification.slack {
        alert_sender.set_notifier(Box::new(SlackNotifier::new(&slack.token, &slack.channel)));
    }
    if let Some(webhook) = &config.notification.webhook {
        alert_sender.set_notifier(Box::new(WebhookNotifier::new(&webhook.url)));
    }
    if alert_sender.notifier_count() == 0 {
        warn!("no notifiers configured, transitions will only be logged");
    }
    tokio::spawn(alert_sender.run());

    if let Some(store) = store.clone() {
        let port = config.api_port;
        tokio::spawn(async move {
            if let Err(e) = api::start_server(port, store).await {
                error!("API server failed: {:#}", e);
            }
        });
    }

    let cancel = CancellationToken::new();
    let worker_config = WorkerConfig {
        interval: config.interval(),
        timeout: config.timeout(),
        ..WorkerConfig::default()
    };
    let sink = store.map(|s| Arc::new(s) as Arc<dyn ResultSink>);
    let mut workers: FuturesUnordered<_> =
        engine::spawn_workers(monitors, &message_tx, sink, &worker_config, &cancel)
            .context("Failed to start workers")?
            .into_iter()
            .collect();
    drop(message_tx);

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            Some(err) = error_rx.recv() => error!(error = %err, "alert delivery failed"),
            res = &mut shutdown => {
                res?;
                break;
            }
        }
    }

    info!("Interrupt received, stopping workers...");
    cancel.cancel();
    while let Some(joined) = workers.next().await {
        if let Err(e) = joined {
            error!("worker task failed: {}", e);
        }
    }
    info!("Shutdown complete");

    Ok(())
}
