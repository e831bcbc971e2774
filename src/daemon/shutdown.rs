use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Detects signals sent to the process. Also returns once something else cancelled the token,
/// usually the browser closing the native messaging pipe.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            cancelation.cancel();
        },
        _ = terminate() => {
            info!("Received terminate, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("Can't listen for SIGTERM {e:?}");
            std::future::pending::<()>().await
        }
    }
}

/// On Windows `stop` kills the process outright, there is nothing to listen for.
#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
