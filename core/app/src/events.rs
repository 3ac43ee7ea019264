//! Change notifications for UI layers.

use tokio::sync::broadcast;

/// What changed. Coarse on purpose; observers re-query the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Expense data changed locally or via sync.
    DataChanged,
    /// The session ended; local state was wiped.
    LoggedOut,
}

/// Broadcast fan-out for [`ChangeEvent`]s. Emitting with no subscribers
/// is fine.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.emit(ChangeEvent::DataChanged);
        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::DataChanged);
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        ChangeNotifier::new().emit(ChangeEvent::LoggedOut);
    }
}
