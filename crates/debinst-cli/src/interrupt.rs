//! SIGINT/SIGTERM handling.
//!
//! A dedicated thread drives a current-thread tokio runtime that waits for
//! the first termination signal. It then removes every staging directory
//! registered with the [`StagingRegistry`] and exits with status 130. The
//! install itself runs on the main thread and never awaits anything.

use anyhow::Context;
use anyhow::Result;
use debinst_core::StagingRegistry;

/// Exit status used after an interruption.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Spawns the signal-watching thread.
pub fn install_handler(registry: StagingRegistry) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("debinst-signals".into())
        .spawn(move || {
            runtime.block_on(wait_for_termination());
            let removed = registry.interrupt();
            tracing::warn!(removed, "interrupted, staging directories removed");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        })
        .context("failed to spawn signal thread")?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::debug!(error = %e, "SIGINT handler unavailable, watching SIGTERM only");
                        terminate.recv().await;
                    }
                }
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "SIGTERM handler unavailable, watching SIGINT only");
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot watch for interruption");
        std::future::pending::<()>().await;
    }
}
