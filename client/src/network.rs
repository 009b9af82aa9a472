//! Connectivity observer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Kind of link the device is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    None,
    Unknown,
}

/// Current connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub is_connected: bool,
    pub connection_type: ConnectionType,
}

impl NetworkState {
    pub fn online(connection_type: ConnectionType) -> Self {
        Self {
            is_connected: true,
            connection_type,
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }
}

/// Publishes connectivity changes to every subscriber.
///
/// The platform layer calls [`NetworkMonitor::set`]; services hold a
/// receiver and read the latest value without waiting.
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkState>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Create a monitor wrapped in Arc for sharing.
    pub fn new_shared(initial: NetworkState) -> Arc<Self> {
        Arc::new(Self::new(initial))
    }

    /// Publish a new state. Subscribers are only woken on actual changes.
    pub fn set(&self, state: NetworkState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(
                is_connected = state.is_connected,
                connection_type = ?state.connection_type,
                "Connectivity changed"
            );
            *current = state;
            true
        });
    }

    pub fn set_connected(&self, connected: bool) {
        let state = if connected {
            NetworkState::online(ConnectionType::Unknown)
        } else {
            NetworkState::offline()
        };
        self.set(state);
    }

    pub fn current(&self) -> NetworkState {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.tx.borrow().is_connected
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_changes() {
        let monitor = NetworkMonitor::new(NetworkState::offline());
        let mut rx = monitor.subscribe();
        assert!(!rx.borrow().is_connected);

        monitor.set(NetworkState::online(ConnectionType::Wifi));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_connected);
    }

    #[test]
    fn identical_state_does_not_notify() {
        let monitor = NetworkMonitor::new(NetworkState::online(ConnectionType::Wifi));
        let rx = monitor.subscribe();
        monitor.set(NetworkState::online(ConnectionType::Wifi));
        assert!(!rx.has_changed().unwrap());
    }
}
