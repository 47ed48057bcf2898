//! The fleet control loop
//!
//! One sweep resolves every configured server name, claims the endpoints
//! that are neither active nor cooling down, and spawns one session task per
//! claimed endpoint. All sessions of a sweep share one identity picked
//! uniformly at random, a deliberate account-rotation policy. Spawn pacing
//! between servers and a fixed pause between sweeps avoid connection storms.
//! Cancellation is observed between servers and between sweeps; in-flight
//! sessions are left to finish on their own.

use super::registry::{ClaimOutcome, FleetRegistry, SessionInfo};
use super::resolver::{split_server_address, Resolve};
use super::Endpoint;
use crate::identity::{Identity, IdentityPool};
use crate::session::{SessionContext, SessionDriver, SessionOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Sweep loop timing and targets
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Configured server names, with or without an explicit port
    pub servers: Vec<String>,
    /// Port appended to server names and endpoints when absent
    pub default_port: u16,
    /// Pause after processing each server's endpoints
    pub spawn_pacing: Duration,
    /// Pause between full sweeps
    pub sweep_interval: Duration,
    /// Delay before retrying a failed resolution
    pub resolve_retry: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            default_port: 19132,
            spawn_pacing: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(5),
            resolve_retry: Duration::from_secs(30),
        }
    }
}

/// The control loop, with every collaborator injected
pub struct FleetOrchestrator<R, S> {
    config: SweepConfig,
    identities: IdentityPool,
    registry: FleetRegistry,
    resolver: Arc<R>,
    driver: Arc<S>,
    shutdown: watch::Receiver<bool>,
}

impl<R, S> FleetOrchestrator<R, S>
where
    R: Resolve + 'static,
    S: SessionDriver,
{
    pub fn new(
        config: SweepConfig,
        identities: IdentityPool,
        registry: FleetRegistry,
        resolver: Arc<R>,
        driver: Arc<S>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            identities,
            registry,
            resolver,
            driver,
            shutdown,
        }
    }

    pub fn registry(&self) -> &FleetRegistry {
        &self.registry
    }

    /// Run sweeps until cancellation is requested
    pub async fn run(self) {
        info!(
            servers = self.config.servers.len(),
            identities = self.identities.len(),
            "fleet orchestrator started"
        );
        let mut shutdown = self.shutdown.clone();

        'sweeps: loop {
            if *shutdown.borrow() {
                break;
            }
            let Some(identity) = self.identities.choose().cloned() else {
                error!("identity pool is empty, nothing to run sessions as");
                break;
            };
            debug!(identity = %identity.name, "starting sweep");

            for server in &self.config.servers {
                if *shutdown.borrow() {
                    break 'sweeps;
                }
                self.process_server(server, &identity, &mut shutdown).await;
            }
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = sleep(self.config.sweep_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("fleet orchestrator stopped");
    }

    /// Resolve one server and start sessions on its unclaimed endpoints.
    ///
    /// Resolution failures block only this server: they are retried after a
    /// fixed delay until they succeed or shutdown is requested.
    async fn process_server(
        &self,
        server: &str,
        identity: &Identity,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let (host, port) = match split_server_address(server, self.config.default_port) {
            Ok(parts) => parts,
            Err(error) => {
                error!(%error, server, "skipping unusable server address");
                return;
            }
        };

        let addresses = loop {
            match self.resolver.resolve(&host).await {
                Ok(addresses) => break addresses,
                Err(error) => {
                    error!(%error, server, "failed to resolve server, retrying");
                    tokio::select! {
                        _ = sleep(self.config.resolve_retry) => {}
                        _ = shutdown.changed() => {}
                    }
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        };

        let mut started = 0usize;
        for ip in addresses {
            let endpoint = Endpoint::new(ip, port);
            let info = SessionInfo {
                identity: identity.name.clone(),
                server: server.to_string(),
                started_at: Instant::now(),
            };
            match self.registry.try_claim(&endpoint.key(), info) {
                ClaimOutcome::Claimed => {
                    self.spawn_session(endpoint, identity.clone(), server);
                    started += 1;
                }
                ClaimOutcome::AlreadyActive | ClaimOutcome::CoolingDown => {}
            }
        }

        tokio::select! {
            _ = sleep(self.config.spawn_pacing) => {}
            _ = shutdown.changed() => {}
        }
        if started > 0 {
            info!(
                started,
                identity = %identity.name,
                server,
                active = self.registry.active_count(),
                cooling = self.registry.cooling_count(),
                "started sessions"
            );
        } else {
            debug!(
                server,
                active = self.registry.active_count(),
                cooling = self.registry.cooling_count(),
                "nothing to start"
            );
        }
    }

    /// Start one session task. The task owns the registry entry: it releases
    /// it on a clean exit and registers the requested cooldown on failure.
    fn spawn_session(&self, endpoint: Endpoint, identity: Identity, server: &str) {
        let driver = self.driver.clone();
        let registry = self.registry.clone();
        let key = endpoint.key();
        let ctx = SessionContext {
            identity,
            endpoint,
            server_label: format!("{server} {}", endpoint.ip),
        };

        tokio::spawn(async move {
            match driver.run(ctx).await {
                SessionOutcome::Finished => {
                    debug!(endpoint = %key, "session finished");
                    registry.release(&key);
                }
                SessionOutcome::Failed { cooldown: Some(cooldown) } => {
                    warn!(endpoint = %key, ?cooldown, "session failed, cooling endpoint");
                    registry.fail(&key, cooldown);
                }
                SessionOutcome::Failed { cooldown: None } => {
                    warn!(endpoint = %key, "session failed");
                    registry.release(&key);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockResolver, MockSessionDriver};
    use std::time::Duration;
    use tokio::time::timeout;

    fn orchestrator(
        servers: Vec<&str>,
        identities: Vec<&str>,
        resolver: MockResolver,
        driver: Arc<MockSessionDriver>,
    ) -> (FleetOrchestrator<MockResolver, MockSessionDriver>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = SweepConfig {
            servers: servers.into_iter().map(str::to_string).collect(),
            spawn_pacing: Duration::from_millis(1),
            sweep_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let orchestrator = FleetOrchestrator::new(
            config,
            IdentityPool::new(identities.into_iter().map(Identity::new).collect()),
            FleetRegistry::new(),
            Arc::new(resolver),
            driver,
            shutdown_rx,
        );
        (orchestrator, shutdown_tx)
    }

    #[tokio::test]
    async fn empty_identity_pool_stops_the_loop() {
        let (orchestrator, _shutdown_tx) = orchestrator(
            vec!["a.example"],
            vec![],
            MockResolver::fixed(vec!["1.1.1.1"]),
            Arc::new(MockSessionDriver::finishing()),
        );
        timeout(Duration::from_secs(1), orchestrator.run())
            .await
            .expect("loop should stop on its own");
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let (orchestrator, shutdown_tx) = orchestrator(
            vec!["a.example"],
            vec!["alpha"],
            MockResolver::fixed(vec!["1.1.1.1"]),
            Arc::new(MockSessionDriver::finishing()),
        );
        let handle = tokio::spawn(orchestrator.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send_replace(true);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should observe cancellation")
            .unwrap();
    }
}
