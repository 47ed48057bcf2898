//! Mock implementations for testing
//!
//! Scripted stand-ins for the resolver and session collaborators so the
//! orchestrator can be exercised without DNS or a game protocol.

use crate::fleet::{Resolve, ResolveError};
use crate::session::{SessionContext, SessionDriver, SessionOutcome};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

/// Scripted resolver with per-host answers and optional initial failures
#[derive(Debug, Default)]
pub struct MockResolver {
    by_host: HashMap<String, Vec<IpAddr>>,
    fallback: Vec<IpAddr>,
    fail_first: u32,
    calls: AtomicU32,
}

impl MockResolver {
    /// Answer every host with the same address set
    pub fn fixed(addresses: Vec<&str>) -> Self {
        Self {
            fallback: parse(addresses),
            ..Default::default()
        }
    }

    /// Answer each host from the given map; unknown hosts resolve to nothing
    pub fn by_host(map: Vec<(&str, Vec<&str>)>) -> Self {
        Self {
            by_host: map
                .into_iter()
                .map(|(host, addresses)| (host.to_string(), parse(addresses)))
                .collect(),
            ..Default::default()
        }
    }

    /// Fail the first `n` calls before answering normally
    pub fn with_initial_failures(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn parse(addresses: Vec<&str>) -> Vec<IpAddr> {
    addresses
        .into_iter()
        .map(|a| a.parse().expect("valid test address"))
        .collect()
}

#[async_trait]
impl Resolve for MockResolver {
    async fn resolve(&self, host: &str) -> Result<BTreeSet<IpAddr>, ResolveError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ResolveError::Lookup {
                host: host.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "scripted failure"),
            });
        }
        let addresses = self
            .by_host
            .get(host)
            .unwrap_or(&self.fallback)
            .iter()
            .copied()
            .collect();
        Ok(addresses)
    }
}

/// Scripted session driver that records every context it was started with
#[derive(Debug)]
pub struct MockSessionDriver {
    outcome: SessionOutcome,
    started: Mutex<Vec<SessionContext>>,
    gate: Option<watch::Receiver<bool>>,
}

impl MockSessionDriver {
    /// Sessions finish cleanly right away
    pub fn finishing() -> Self {
        Self {
            outcome: SessionOutcome::Finished,
            started: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Sessions fail right away, optionally requesting a cooldown
    pub fn failing(cooldown: Option<Duration>) -> Self {
        Self {
            outcome: SessionOutcome::Failed { cooldown },
            started: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Sessions stay running until the returned sender is flipped to `true`
    pub fn holding() -> (Self, watch::Sender<bool>) {
        let (release_tx, release_rx) = watch::channel(false);
        let driver = Self {
            outcome: SessionOutcome::Finished,
            started: Mutex::new(Vec::new()),
            gate: Some(release_rx),
        };
        (driver, release_tx)
    }

    pub fn started(&self) -> Vec<SessionContext> {
        self.started.lock().unwrap().clone()
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionDriver for MockSessionDriver {
    async fn run(&self, ctx: SessionContext) -> SessionOutcome {
        self.started.lock().unwrap().push(ctx);
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            while !*gate.borrow() {
                if gate.changed().await.is_err() {
                    break;
                }
            }
        }
        self.outcome.clone()
    }
}
