//! Shared endpoint bookkeeping for the fleet
//!
//! Tracks which endpoints currently run a session and which are excluded by
//! a failure cooldown. Both maps sit behind one lock: the orchestrator
//! claims endpoints while terminating session tasks release them or register
//! cooldowns concurrently, and claim-or-skip must be atomic across both.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Bookkeeping for one active session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Identity the session was started with
    pub identity: String,
    /// Configured server name the endpoint was resolved from
    pub server: String,
    pub started_at: Instant,
}

/// Outcome of attempting to claim an endpoint for a new session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Endpoint was free; a session slot is now recorded
    Claimed,
    /// Another session already runs against this endpoint
    AlreadyActive,
    /// The endpoint is inside a failure cooldown window
    CoolingDown,
}

#[derive(Debug, Default)]
struct RegistryInner {
    active: HashMap<String, SessionInfo>,
    cooldowns: HashMap<String, Instant>,
}

/// Process-wide registry of active sessions and cooling-down endpoints.
///
/// Clones share the same underlying maps.
#[derive(Debug, Clone, Default)]
pub struct FleetRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim an endpoint for a new session.
    ///
    /// Expired cooldown entries are pruned on the way; a live cooldown or an
    /// existing session refuses the claim.
    pub fn try_claim(&self, key: &str, info: SessionInfo) -> ClaimOutcome {
        let mut inner = self.inner.write().unwrap();

        if let Some(expiry) = inner.cooldowns.get(key).copied() {
            if Instant::now() < expiry {
                return ClaimOutcome::CoolingDown;
            }
            inner.cooldowns.remove(key);
        }
        if inner.active.contains_key(key) {
            return ClaimOutcome::AlreadyActive;
        }

        inner.active.insert(key.to_string(), info);
        ClaimOutcome::Claimed
    }

    /// Remove an endpoint's active entry after a clean session exit
    pub fn release(&self, key: &str) {
        self.inner.write().unwrap().active.remove(key);
    }

    /// Remove an endpoint's active entry and exclude it for `cooldown`
    pub fn fail(&self, key: &str, cooldown: Duration) {
        let mut inner = self.inner.write().unwrap();
        inner.active.remove(key);
        inner
            .cooldowns
            .insert(key.to_string(), Instant::now() + cooldown);
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.inner.read().unwrap().active.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.inner.read().unwrap().active.len()
    }

    /// Number of endpoints with an unexpired cooldown
    pub fn cooling_count(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .unwrap()
            .cooldowns
            .values()
            .filter(|expiry| now < **expiry)
            .count()
    }

    /// Session info for an active endpoint, if any
    pub fn session(&self, key: &str) -> Option<SessionInfo> {
        self.inner.read().unwrap().active.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(identity: &str) -> SessionInfo {
        SessionInfo {
            identity: identity.to_string(),
            server: "play.example.net:19132".to_string(),
            started_at: Instant::now(),
        }
    }

    #[test]
    fn claim_is_exclusive_per_endpoint() {
        let registry = FleetRegistry::new();
        assert_eq!(
            registry.try_claim("1.1.1.1:19132", info("alpha")),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            registry.try_claim("1.1.1.1:19132", info("alpha")),
            ClaimOutcome::AlreadyActive
        );
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn release_frees_the_endpoint() {
        let registry = FleetRegistry::new();
        registry.try_claim("1.1.1.1:19132", info("alpha"));
        registry.release("1.1.1.1:19132");
        assert_eq!(
            registry.try_claim("1.1.1.1:19132", info("alpha")),
            ClaimOutcome::Claimed
        );
    }

    #[test]
    fn live_cooldown_refuses_claims() {
        let registry = FleetRegistry::new();
        registry.try_claim("2.2.2.2:19132", info("alpha"));
        registry.fail("2.2.2.2:19132", Duration::from_secs(60));

        assert!(!registry.is_active("2.2.2.2:19132"));
        assert_eq!(registry.cooling_count(), 1);
        assert_eq!(
            registry.try_claim("2.2.2.2:19132", info("alpha")),
            ClaimOutcome::CoolingDown
        );
    }

    #[test]
    fn expired_cooldown_is_pruned_on_claim() {
        let registry = FleetRegistry::new();
        registry.fail("3.3.3.3:19132", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(
            registry.try_claim("3.3.3.3:19132", info("alpha")),
            ClaimOutcome::Claimed
        );
        assert_eq!(registry.cooling_count(), 0);
    }

    #[test]
    fn clones_share_state() {
        let registry = FleetRegistry::new();
        let other = registry.clone();
        registry.try_claim("4.4.4.4:19132", info("alpha"));
        assert!(other.is_active("4.4.4.4:19132"));
    }

    #[test]
    fn concurrent_claims_admit_exactly_one_winner() {
        let registry = FleetRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry.try_claim("5.5.5.5:19132", info("alpha"))
            }));
        }
        let claimed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| *outcome == ClaimOutcome::Claimed)
            .count();
        assert_eq!(claimed, 1);
    }
}
