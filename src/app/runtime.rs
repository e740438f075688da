use super::{ShutdownReason, StreamingService};
use crate::error::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for SIGINT or SIGTERM
pub async fn wait_for_shutdown_signal() -> ShutdownReason {
    let (sender, receiver) = oneshot::channel();
    setup_signal_handlers(sender);

    match receiver.await {
        Ok(reason) => reason,
        Err(_) => {
            error!("Signal handlers exited without a shutdown reason");
            ShutdownReason::Signal("unknown".to_string())
        }
    }
}

/// Keep the service running until a signal arrives or `quit` is cancelled,
/// then shut the session down.
pub async fn run_until_shutdown(
    service: &StreamingService,
    quit: CancellationToken,
) -> Result<ShutdownReason> {
    info!("Streaming service is running");

    let reason = tokio::select! {
        reason = wait_for_shutdown_signal() => reason,
        _ = quit.cancelled() => ShutdownReason::UserRequest,
    };
    info!("Shutdown initiated: {:?}", reason);

    service.shutdown().await?;
    info!("Streaming service shutdown complete");
    Ok(reason)
}

fn setup_signal_handlers(shutdown_sender: oneshot::Sender<ShutdownReason>) {
    let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

    // SIGTERM (systemd stop), Unix only
    #[cfg(unix)]
    {
        let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };
            if let Some(()) = sigterm.recv().await {
                info!("Received SIGTERM signal");
                if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }
        });
    }

    // SIGINT (Ctrl+C)
    let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
            }
        }
    });
}
