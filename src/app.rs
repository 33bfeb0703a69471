use std::time::Duration;

use anyhow::anyhow;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::Cli;
use crate::k8s::VfioInitializer;
use crate::kube_client;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the controller until a termination signal arrives.
///
/// The controller loop runs on a background task; the foreground task blocks
/// on SIGTERM/SIGINT and then cancels the shared token. Cancellation is
/// observed at the loop's next suspension point, not mid-handler.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // An unusable cluster client is unrecoverable, fail fast.
    let client = kube_client::init_kube_client(cli.kubeconfig.clone())
        .await
        .map_err(|e| anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

    let initializer = VfioInitializer::new(client, cli.initializer_name, cli.namespace);
    let cancellation_token = CancellationToken::new();

    let controller_task = {
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            tracing::info!("Starting initializer controller task");
            if let Err(e) = initializer.run(token).await {
                tracing::error!("Initializer controller failed: {e:?}");
            } else {
                tracing::info!("Initializer controller completed");
            }
        })
    };

    wait_for_shutdown_signal().await?;

    tracing::info!("Shutdown signal received, cancelling controller task");
    cancellation_token.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, controller_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Controller task failed during shutdown: {e}"),
        Err(_) => tracing::warn!("Controller shutdown timed out after {SHUTDOWN_TIMEOUT:?}"),
    }

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
    Ok(())
}
