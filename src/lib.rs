//! skinfleet - resilient delivery pipeline for player skin observations
//!
//! A fleet of automated clients joins many game servers concurrently,
//! observes player skin data on the wire, and forwards it to an AMQP work
//! queue for offline processing. This crate owns the parts that have to
//! survive the real world:
//!
//! - a fleet orchestrator that discovers server endpoints via repeated DNS
//!   sampling, deduplicates concurrent sessions per endpoint, and applies
//!   failure cooldowns
//! - a self-healing queue client that reconnects forever, blocks producers
//!   transparently while the broker is away, and never drops a durable
//!   publish
//!
//! The game wire protocol and credential acquisition are collaborators
//! behind the [`session::SessionDriver`] and [`identity::TokenSource`]
//! seams.
//!
//! # Example
//!
//! ```rust
//! use skinfleet::fleet::{ClaimOutcome, FleetRegistry, SessionInfo};
//! use std::time::Instant;
//!
//! let registry = FleetRegistry::new();
//! let info = SessionInfo {
//!     identity: "alpha".to_string(),
//!     server: "play.example.net:19132".to_string(),
//!     started_at: Instant::now(),
//! };
//!
//! // At most one session per endpoint at any time.
//! assert_eq!(registry.try_claim("1.1.1.1:19132", info.clone()), ClaimOutcome::Claimed);
//! assert_eq!(registry.try_claim("1.1.1.1:19132", info), ClaimOutcome::AlreadyActive);
//! ```

pub mod config;
pub mod error;
pub mod fleet;
pub mod identity;
pub mod observability;
pub mod queue;
pub mod session;
pub mod skin;
pub mod testing;

pub use config::FleetConfig;
pub use error::{FleetError, FleetResult};
pub use fleet::{DnsResolver, Endpoint, FleetOrchestrator, FleetRegistry, SweepConfig};
pub use identity::{Identity, IdentityPool};
pub use queue::{ConnectionState, QueueError, QueuedSkin, SkinQueue};
pub use session::{SessionContext, SessionDriver, SessionOutcome};
