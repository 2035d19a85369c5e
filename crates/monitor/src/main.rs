use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use stakewatch::{
    Config,
    MonitorLoop,
    commands::CommandListener,
    notify::{
        Notify,
        TelegramNotifier,
    },
    telegram::TelegramClient,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{
    info,
    warn,
};
use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config)?;

    info!(
        validators = config.validator_indices.len(),
        interval_seconds = config.check_interval_seconds,
        "starting stakewatch"
    );

    let telegram = TelegramClient::new(
        &config.telegram_bot_token,
        config.telegram_chat_id.clone(),
    )
    .context("failed to initialize Telegram client")?;
    let notifier: Arc<dyn Notify> = Arc::new(TelegramNotifier::new(telegram.clone()));

    let primary = config
        .primary_pair()
        .context("invalid primary node configuration")?;
    let fallback = config
        .fallback_pair()
        .context("invalid fallback node configuration")?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(err) = shutdown_signal().await {
            warn!(error = %err, "error setting up signal handler");
        } else {
            info!("shutdown signal received, initiating graceful shutdown");
            let _ = shutdown_tx.send(());
        }
    });

    let listener_cancel = CancellationToken::new();
    let listener = CommandListener::new(
        telegram,
        primary.clone(),
        fallback.clone(),
        config.validator_indices.clone(),
        config.log_file.clone(),
    );
    let listener_handle = tokio::spawn(listener.run(listener_cancel.clone()));

    notifier.notify("✅ *Validator monitor has started*").await;

    let monitor = MonitorLoop::new(
        primary,
        fallback,
        &config.validator_indices,
        Arc::clone(&notifier),
        config.check_interval(),
    );
    monitor.run(shutdown_rx).await;

    notifier
        .notify("*Validator monitor has been stopped.*")
        .await;
    listener_cancel.cancel();
    let _ = listener_handle.await;

    info!("stakewatch shut down gracefully");
    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C)
async fn shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
