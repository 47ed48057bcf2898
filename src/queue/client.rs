//! Self-healing queue client
//!
//! One `SkinQueue` per process owns a background reconnect loop that keeps a
//! broker connection alive forever. Producers never touch the connection
//! directly: they park on the renewable link broadcast until a channel is
//! available, publish, and on failure wait for the next reconnection. The
//! durable publish path retries without bound and never surfaces broker
//! errors to its caller; only the best-effort fanout path does.

use super::connection::{wait_ready, ConnectionState, QueueError, QueueTuning};
use super::message::{
    self, QueuedSkin, CONTENT_TYPE_JSON, CONTENT_TYPE_JSON_GZ, FANOUT_EXCHANGE, WORK_QUEUE,
};
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Queue client handle. Cheap to share behind an `Arc`; all operations take
/// `&self`.
pub struct SkinQueue {
    link_rx: watch::Receiver<Option<Channel>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    conn_slot: Arc<Mutex<Option<Connection>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    tuning: QueueTuning,
}

impl SkinQueue {
    /// Connect to the broker and start the reconnect loop.
    ///
    /// Blocks until the very first connection attempt resolves: the startup
    /// one-shot lets the process fail fast when the broker is unreachable at
    /// boot. Every later outage is handled silently in the background.
    pub async fn connect(
        uri: &str,
        enable_fanout: bool,
        tuning: QueueTuning,
    ) -> Result<Self, QueueError> {
        let parsed =
            url::Url::parse(uri).map_err(|_| QueueError::InvalidUri(uri.to_string()))?;
        if !matches!(parsed.scheme(), "amqp" | "amqps") {
            return Err(QueueError::InvalidUri(uri.to_string()));
        }

        let (link_tx, link_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (startup_tx, startup_rx) = oneshot::channel();
        let conn_slot = Arc::new(Mutex::new(None));

        let supervisor = tokio::spawn(reconnect_loop(
            uri.to_string(),
            enable_fanout,
            tuning.clone(),
            link_tx,
            state_tx,
            shutdown_rx.clone(),
            startup_tx,
            conn_slot.clone(),
        ));

        match startup_rx.await {
            Ok(Ok(())) => Ok(Self {
                link_rx,
                state_rx,
                shutdown_tx,
                shutdown_rx,
                conn_slot,
                supervisor: Mutex::new(Some(supervisor)),
                tuning,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(QueueError::Closed),
        }
    }

    /// Current connection state as observed by producers
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Durably publish one skin observation to the work queue.
    ///
    /// The body is always gzip-compressed. Blocks while disconnected and
    /// retries failed publishes indefinitely; the only error this returns is
    /// [`QueueError::Closed`] once shutdown has been requested (besides a
    /// body that cannot be encoded, which no retry would fix).
    pub async fn publish_skin(&self, skin: &QueuedSkin) -> Result<(), QueueError> {
        let body = message::encode_body(skin)?;
        let mut link = self.link_rx.clone();
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            let channel = wait_ready(&mut link, &mut shutdown).await?;
            let publish = channel
                .basic_publish(
                    "",
                    WORK_QUEUE,
                    BasicPublishOptions::default(),
                    &body,
                    BasicProperties::default().with_content_type(CONTENT_TYPE_JSON_GZ.into()),
                )
                .await;
            match publish {
                Ok(_) => return Ok(()),
                Err(error) => {
                    warn!(%error, "skin publish failed, retrying after reconnect");
                    // The link watch usually flips before the next attempt;
                    // the short delay covers failures the reconnect loop has
                    // not observed yet.
                    tokio::select! {
                        changed = link.changed() => {
                            if changed.is_err() {
                                return Err(QueueError::Closed);
                            }
                        }
                        _ = sleep(self.tuning.republish_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
    }

    /// Best-effort notification on the fanout exchange.
    ///
    /// Waits for connectivity once, publishes a single plain-JSON copy of the
    /// observation, and surfaces any failure to the caller without retrying.
    pub async fn notify_new_skin(&self, skin: &QueuedSkin) -> Result<(), QueueError> {
        let body = serde_json::to_vec(skin)?;
        let mut link = self.link_rx.clone();
        let mut shutdown = self.shutdown_rx.clone();

        let channel = wait_ready(&mut link, &mut shutdown).await?;
        channel
            .basic_publish(
                FANOUT_EXCHANGE,
                "",
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type(CONTENT_TYPE_JSON.into()),
            )
            .await
            .map_err(QueueError::PublishFailed)?;
        debug!("fanout notification published");
        Ok(())
    }

    /// Consume skin observations from the work queue.
    ///
    /// Returns an unbounded lazy sequence of decoded messages. The consumer
    /// re-subscribes after every channel failure and terminates only when the
    /// queue is closed; bodies that fail to decode are logged and skipped.
    pub fn receive_skins(&self) -> mpsc::Receiver<QueuedSkin> {
        let (tx, rx) = mpsc::channel(16);
        let mut link = self.link_rx.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let republish_delay = self.tuning.republish_delay;

        tokio::spawn(async move {
            loop {
                let channel = match wait_ready(&mut link, &mut shutdown).await {
                    Ok(channel) => channel,
                    Err(_) => return,
                };
                let consumer = channel
                    .basic_consume(
                        WORK_QUEUE,
                        "",
                        BasicConsumeOptions {
                            no_ack: true,
                            ..Default::default()
                        },
                        FieldTable::default(),
                    )
                    .await;
                let mut consumer = match consumer {
                    Ok(consumer) => consumer,
                    Err(error) => {
                        warn!(%error, "consume failed, waiting for reconnect");
                        tokio::select! {
                            changed = link.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                            }
                            _ = sleep(republish_delay) => {}
                            _ = shutdown.changed() => {}
                        }
                        continue;
                    }
                };
                info!("consuming from work queue");

                while let Some(delivery) = consumer.next().await {
                    let delivery = match delivery {
                        Ok(delivery) => delivery,
                        Err(error) => {
                            warn!(%error, "consumer stream failed");
                            break;
                        }
                    };
                    let content_type = delivery
                        .properties
                        .content_type()
                        .as_ref()
                        .map(|s| s.as_str().to_string());
                    match message::decode_body(&delivery.data, content_type.as_deref()) {
                        Ok(skin) => {
                            if tx.send(skin).await.is_err() {
                                return;
                            }
                        }
                        Err(error) => warn!(%error, "dropping undecodable queue message"),
                    }
                }
                // Stream ended: the channel died, wait for the next link.
            }
        });

        rx
    }

    /// Tear down the client: stop the reconnect loop and close the broker
    /// connection if one is open. Safe to call once; wakes every blocked
    /// producer with [`QueueError::Closed`].
    pub async fn close(&self) {
        info!("closing queue client");
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.supervisor.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(conn) = self.conn_slot.lock().await.take() {
            if let Err(error) = conn.close(200, "client shutdown").await {
                debug!(%error, "broker connection close failed");
            }
        }
    }
}

/// One full connect protocol: dial, open a channel, declare the work queue
/// and, when enabled, the fanout exchange. Declares are fire-and-forget
/// (`nowait`), non-durable, non-exclusive. Any step failing fails the whole
/// attempt.
async fn establish(
    uri: &str,
    enable_fanout: bool,
) -> Result<(Connection, Channel, mpsc::UnboundedReceiver<lapin::Error>), lapin::Error> {
    let conn = Connection::connect(uri, ConnectionProperties::default()).await?;

    let (lost_tx, lost_rx) = mpsc::unbounded_channel();
    conn.on_error(move |error| {
        let _ = lost_tx.send(error);
    });

    let channel = conn.create_channel().await?;
    channel
        .queue_declare(
            WORK_QUEUE,
            QueueDeclareOptions {
                nowait: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    if enable_fanout {
        channel
            .exchange_declare(
                FANOUT_EXCHANGE,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    nowait: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
    }

    Ok((conn, channel, lost_rx))
}

/// Background reconnect loop.
///
/// Signals the startup one-shot exactly once: on the first successful
/// connection or the first attempt's failure (which ends the loop so the
/// owning process can fail fast). Afterwards it reconnects forever with a
/// fixed delay, replacing the link watch value on every success so all
/// parked producers wake together.
#[allow(clippy::too_many_arguments)]
async fn reconnect_loop(
    uri: String,
    enable_fanout: bool,
    tuning: QueueTuning,
    link_tx: watch::Sender<Option<Channel>>,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: watch::Receiver<bool>,
    startup_tx: oneshot::Sender<Result<(), QueueError>>,
    conn_slot: Arc<Mutex<Option<Connection>>>,
) {
    let mut startup = Some(startup_tx);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        state_tx.send_replace(ConnectionState::Connecting);

        match establish(&uri, enable_fanout).await {
            Ok((conn, channel, mut lost_rx)) => {
                *conn_slot.lock().await = Some(conn);
                state_tx.send_replace(ConnectionState::Connected);
                link_tx.send_replace(Some(channel));
                if let Some(tx) = startup.take() {
                    info!("connected to message broker");
                    let _ = tx.send(Ok(()));
                } else {
                    info!("reconnected to message broker");
                }

                tokio::select! {
                    error = lost_rx.recv() => {
                        match error {
                            Some(error) => warn!(%error, "broker link lost"),
                            None => warn!("broker link lost"),
                        }
                    }
                    _ = shutdown_rx.changed() => {}
                }
                link_tx.send_replace(None);
                if *shutdown_rx.borrow() {
                    // The connection stays in the slot for close().
                    break;
                }
                state_tx.send_replace(ConnectionState::Disconnected);
                conn_slot.lock().await.take();
            }
            Err(error) => {
                if let Some(tx) = startup.take() {
                    error!(%error, "initial broker connection failed");
                    let _ = tx.send(Err(QueueError::Broker(error)));
                    break;
                }
                state_tx.send_replace(ConnectionState::Disconnected);
                warn!(%error, delay = ?tuning.reconnect_delay, "broker connection failed, retrying");
                tokio::select! {
                    _ = sleep(tuning.reconnect_delay) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }
    }

    link_tx.send_replace(None);
    state_tx.send_replace(ConnectionState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_amqp_uri() {
        let result = SkinQueue::connect("http://localhost:5672", false, QueueTuning::default()).await;
        assert!(matches!(result, Err(QueueError::InvalidUri(_))));
    }

    #[tokio::test]
    async fn rejects_unparsable_uri() {
        let result = SkinQueue::connect("not a uri", false, QueueTuning::default()).await;
        assert!(matches!(result, Err(QueueError::InvalidUri(_))));
    }

    #[tokio::test]
    async fn startup_fails_fast_when_broker_unreachable() {
        // Port 1 refuses immediately; the first attempt's failure must be
        // reported through the startup one-shot instead of retrying forever.
        let result = SkinQueue::connect("amqp://127.0.0.1:1", false, QueueTuning::default()).await;
        assert!(matches!(result, Err(QueueError::Broker(_))));
    }
}
