//! Connectivity state shared between the transport and the sync engine.

use tokio::sync::watch;
use tracing::info;

/// Broadcast handle for the "is connected" signal.
///
/// Cheap to clone; all clones observe the same state. There is no OS-level
/// path monitor in a portable core, so the state is driven by whoever owns
/// the edge of the system: the health check, the embedding application, or
/// tests.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_connected: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_connected);
        Self { tx }
    }

    /// Current connectivity state (atomic read).
    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the connectivity state. Subscribers observe the transition,
    /// which is what drives sync-on-reconnect.
    pub fn set_connected(&self, connected: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
        if changed {
            info!(connected, "connectivity changed");
        }
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_state() {
        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.is_connected());

        monitor.set_connected(true);
        assert!(monitor.is_connected());
    }

    #[tokio::test]
    async fn subscribers_observe_edges() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_connected(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn redundant_updates_do_not_wake_subscribers() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_connected(true);
        assert!(!rx.has_changed().unwrap());
    }
}
