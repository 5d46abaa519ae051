//! Graceful shutdown for the local invoker.
//!
//! The first SIGINT or SIGTERM cancels a [`CancellationToken`]; the invoker
//! stops starting new steps and finalizes the update so its lock is released.
//! A second signal force-exits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Install signal handlers and return the token they cancel.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(sigterm) => Some(sigterm),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            let received = match sigterm.as_mut() {
                Some(sigterm) => tokio::select! {
                    r = tokio::signal::ctrl_c() => r.is_ok(),
                    _ = sigterm.recv() => true,
                },
                None => tokio::signal::ctrl_c().await.is_ok(),
            };
            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.is_ok();

            if !received {
                tracing::warn!("Signal listener failed; shutdown signals are ignored");
                return;
            }

            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                tracing::info!("Received shutdown signal, finalizing the running update...");
                handler_token.cancel();
            } else {
                tracing::warn!("Force exit requested");
                std::process::exit(130);
            }
        }
    });

    token
}
