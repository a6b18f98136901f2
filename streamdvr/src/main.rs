use std::sync::Arc;

use anyhow::Context;
use streamdvr::Dvr;
use streamdvr::config::DvrConfig;
use streamdvr::logging::{Logging, init_logging};
use streamdvr::pipeline::MoveProcessor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = DvrConfig::path_from_env();
    let config = DvrConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let (logging, _guard) = init_logging(&config.log_dir, config.debug.log)?;
    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(cancel.clone());
    tokio::spawn(toggle_debug_on_signal(logging.clone()));

    let processor = Arc::new(MoveProcessor::new(config.recording.clone()));
    let dvr = Dvr::new(config, Some(config_path), processor)?;

    let dvr_cancel = dvr.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        dvr_cancel.cancel();
    });

    dvr.run().await;
    cancel.cancel();
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Flip debug logging on every SIGUSR1.
#[cfg(unix)]
async fn toggle_debug_on_signal(logging: Arc<Logging>) {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut usr1) = signal(SignalKind::user_defined1()) else {
        return;
    };
    while usr1.recv().await.is_some() {
        match logging.toggle_debug() {
            Ok(on) => info!("Debug logging {}", if on { "enabled" } else { "disabled" }),
            Err(e) => error!("{}", e),
        }
    }
}

#[cfg(not(unix))]
async fn toggle_debug_on_signal(_logging: Arc<Logging>) {}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
