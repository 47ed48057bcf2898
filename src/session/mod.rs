//! Session lifecycle seam
//!
//! A session is one protocol connection/identity pairing against one
//! endpoint. The wire protocol for joining a server and extracting skin
//! payloads lives outside this crate; the orchestrator only needs something
//! that runs a session to completion and reports how it ended. The glue in
//! this module turns decoded skin observations into queued messages on the
//! durable publish path.

pub mod relay;

pub use relay::{RelayConfig, RelayDriver};

use crate::fleet::Endpoint;
use crate::identity::Identity;
use crate::queue::{QueueError, QueuedSkin, SkinQueue};
use crate::skin::{clean_player_name, Skin};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Everything a driver needs to run one session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub identity: Identity,
    pub endpoint: Endpoint,
    /// Human-readable origin, `"<server name> <ip>"`
    pub server_label: String,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Clean disconnect; the endpoint is immediately eligible again
    Finished,
    /// Connection or stream failure; optionally exclude the endpoint
    Failed { cooldown: Option<Duration> },
}

/// Runs one session against one endpoint, start to finish
#[async_trait]
pub trait SessionDriver: Send + Sync + 'static {
    async fn run(&self, ctx: SessionContext) -> SessionOutcome;
}

/// Durable publish seam for session drivers.
///
/// Production drivers hand observations to a [`SkinQueue`]; tests record
/// them instead.
#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn publish_skin(&self, skin: &QueuedSkin) -> Result<(), QueueError>;
}

#[async_trait]
impl ObservationSink for SkinQueue {
    async fn publish_skin(&self, skin: &QueuedSkin) -> Result<(), QueueError> {
        SkinQueue::publish_skin(self, skin).await
    }
}

/// One skin observation as decoded by the protocol layer
#[derive(Debug, Clone)]
pub struct SkinObservation {
    pub username: String,
    pub xuid: String,
    pub skin: Skin,
}

/// Forward one observation to the work queue.
///
/// Cleans the display name, projects the skin, stamps the current unix time,
/// and publishes durably; blocks across broker outages like any producer.
pub async fn publish_observation<S: ObservationSink>(
    sink: &S,
    observation: SkinObservation,
    server_label: &str,
) -> Result<(), QueueError> {
    let username = clean_player_name(&observation.username);
    info!(%username, server = %server_label, "queueing skin observation");
    let queued = QueuedSkin::now(
        username,
        observation.xuid,
        observation.skin.to_json(),
        server_label.to_string(),
    );
    sink.publish_skin(&queued).await
}
