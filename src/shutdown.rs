//! Ctrl+C handling for long fetch runs
//!
//! A [`ShutdownCoordinator`] is shared between the signal handler and the
//! chunk fetcher. The fetcher checks it before each chunk, so a stop request
//! leaves only complete raw files behind and a rerun picks up where the
//! previous one stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared handle to a coordinator
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// One-way stop flag
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    requested: AtomicBool,
}

impl ShutdownCoordinator {
    /// Fresh coordinator behind an [`Arc`]
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::default())
    }

    /// Ask running work to stop
    pub fn request_shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Request shutdown on the first Ctrl+C
pub fn spawn_ctrl_c_handler(shutdown: SharedShutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, stopping after the current chunk");
            shutdown.request_shutdown();
        }
    });
}
