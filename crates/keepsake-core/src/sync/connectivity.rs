//! Connectivity monitor: turning reachability flips into outbox drains.

use std::sync::Arc;

use tokio::sync::watch;

use super::outbox::OutboxEngine;

/// Network reachability as reported by the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Offline,
    Online,
}

/// Tracks reachability and kicks off exactly one outbox drain on each
/// offline-to-online transition.
///
/// Reporting the same state again is a no-op; the drain itself is
/// single-flight, so even a spurious double transition cannot overlap
/// uploads.
pub struct ConnectivityMonitor {
    outbox: Arc<OutboxEngine>,
    state: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    /// Start in `Offline`; the platform layer reports the real state when it
    /// knows it.
    #[must_use]
    pub fn new(outbox: Arc<OutboxEngine>) -> Self {
        let (state, _receiver) = watch::channel(Connectivity::Offline);
        Self { outbox, state }
    }

    /// Observe connectivity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    /// Report the current reachability.
    pub fn set_reachable(&self, reachable: bool) {
        let next = if reachable {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        let previous = self.state.send_replace(next);

        if previous == Connectivity::Offline && next == Connectivity::Online {
            tracing::info!("Back online, draining outbox");
            let outbox = self.outbox.clone();
            tokio::spawn(async move {
                match outbox.drain_pending().await {
                    Ok(report) => tracing::debug!(
                        synced = report.synced,
                        failed = report.failures.len(),
                        "Reconnect drain finished"
                    ),
                    Err(error) => tracing::warn!("Reconnect drain failed: {error}"),
                }
            });
        }
    }
}
