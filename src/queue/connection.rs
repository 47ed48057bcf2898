//! Connection state and producer-side wait logic for the queue client
//!
//! The reconnect loop in [`super::client`] owns all state transitions;
//! producers only observe them through cloned watch receivers. This module
//! keeps the state machine, tuning knobs, and the cancellable wait that
//! blocked producers park on.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Connection state of the queue client, as observed by producers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable broker link
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Link established, channel usable
    Connected,
    /// Close was requested; terminal
    Closed,
}

/// Queue client errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker connection failed")]
    Broker(#[source] lapin::Error),
    #[error("publish failed")]
    PublishFailed(#[source] lapin::Error),
    #[error("consume failed")]
    ConsumeFailed(#[source] lapin::Error),
    #[error("message encoding failed")]
    Codec(#[from] serde_json::Error),
    #[error("message body compression failed")]
    Compression(#[from] std::io::Error),
    #[error("invalid broker uri: {0}")]
    InvalidUri(String),
    #[error("queue closed")]
    Closed,
}

/// Timing knobs for the reconnect loop and retrying producers
#[derive(Debug, Clone)]
pub struct QueueTuning {
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Delay before a failed publish is retried when the link still looks up
    pub republish_delay: Duration,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(10),
            republish_delay: Duration::from_millis(250),
        }
    }
}

/// Block until the link watch carries a value, or the queue shuts down.
///
/// The link watch is the renewable reconnect broadcast: the reconnect loop
/// replaces its value with a fresh channel handle on every successful
/// (re)connection, waking every producer parked here at once. Generic over
/// the handle type so the gate logic is testable without a broker.
pub(crate) async fn wait_ready<T: Clone>(
    link: &mut watch::Receiver<Option<T>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<T, QueueError> {
    loop {
        if *shutdown.borrow() {
            return Err(QueueError::Closed);
        }
        let current = link.borrow().clone();
        if let Some(handle) = current {
            return Ok(handle);
        }
        tokio::select! {
            changed = link.changed() => {
                if changed.is_err() {
                    return Err(QueueError::Closed);
                }
            }
            _ = shutdown.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn channels() -> (
        watch::Sender<Option<u32>>,
        watch::Receiver<Option<u32>>,
        watch::Sender<bool>,
        watch::Receiver<bool>,
    ) {
        let (link_tx, link_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (link_tx, link_rx, shutdown_tx, shutdown_rx)
    }

    #[test]
    fn ready_link_returns_immediately() {
        let (link_tx, mut link_rx, _shutdown_tx, mut shutdown_rx) = channels();
        link_tx.send_replace(Some(7));
        let handle =
            tokio_test::block_on(wait_ready(&mut link_rx, &mut shutdown_rx)).unwrap();
        assert_eq!(handle, 7);
    }

    #[tokio::test]
    async fn blocked_waiter_wakes_on_reconnect_broadcast() {
        let (link_tx, mut link_rx, _shutdown_tx, mut shutdown_rx) = channels();

        let waiter = tokio::spawn(async move { wait_ready(&mut link_rx, &mut shutdown_rx).await });
        tokio::task::yield_now().await;
        link_tx.send_replace(Some(42));

        let handle = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap()
            .unwrap();
        assert_eq!(handle, 42);
    }

    #[tokio::test]
    async fn all_blocked_waiters_wake_on_one_broadcast() {
        let (link_tx, link_rx, _shutdown_tx, shutdown_rx) = channels();

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let mut link = link_rx.clone();
            let mut shutdown = shutdown_rx.clone();
            waiters.push(tokio::spawn(
                async move { wait_ready(&mut link, &mut shutdown).await },
            ));
        }
        tokio::task::yield_now().await;
        link_tx.send_replace(Some(1));

        for waiter in waiters {
            let handle = timeout(Duration::from_secs(1), waiter)
                .await
                .expect("every waiter should wake")
                .unwrap()
                .unwrap();
            assert_eq!(handle, 1);
        }
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_blocked_wait() {
        let (_link_tx, mut link_rx, shutdown_tx, mut shutdown_rx) = channels();

        let waiter = tokio::spawn(async move { wait_ready(&mut link_rx, &mut shutdown_rx).await });
        tokio::task::yield_now().await;
        shutdown_tx.send_replace(true);

        let result = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should observe shutdown")
            .unwrap();
        assert!(matches!(result, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn dropped_link_sender_is_treated_as_closed() {
        let (link_tx, mut link_rx, _shutdown_tx, mut shutdown_rx) = channels();

        let waiter = tokio::spawn(async move { wait_ready(&mut link_rx, &mut shutdown_rx).await });
        tokio::task::yield_now().await;
        drop(link_tx);

        let result = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(matches!(result, Err(QueueError::Closed)));
    }

    #[test]
    fn default_tuning_uses_fixed_reconnect_delay() {
        let tuning = QueueTuning::default();
        assert_eq!(tuning.reconnect_delay, Duration::from_secs(10));
        assert!(tuning.republish_delay < tuning.reconnect_delay);
    }

    #[test]
    fn connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Connected, ConnectionState::Disconnected);
    }
}
