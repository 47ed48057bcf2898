//! Fleet orchestration
//!
//! Discovers server endpoints, deduplicates concurrent sessions per
//! endpoint, applies failure cooldowns, and spawns one session task per
//! endpoint under a sweep-wide identity.

pub mod orchestrator;
pub mod registry;
pub mod resolver;

pub use orchestrator::{FleetOrchestrator, SweepConfig};
pub use registry::{ClaimOutcome, FleetRegistry, SessionInfo};
pub use resolver::{split_server_address, DnsResolver, Resolve, ResolveError};

use std::fmt;
use std::net::IpAddr;

/// One concrete network address+port for a server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Registry identity key
    pub fn key(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
