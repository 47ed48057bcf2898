//! Address resolution for configured server names
//!
//! Targets commonly sit behind DNS round robin that answers with a different
//! subset of instances per query. Sampling the name several times over a
//! short window and unioning the answers recovers the full membership with
//! high probability. Resolution runs fresh every sweep so scale-up and
//! scale-down are observed within one sweep interval.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::lookup_host;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
    #[error("name lookup failed for {host}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolution seam; the production implementation queries DNS
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolve `host` to the set of addresses currently serving it
    async fn resolve(&self, host: &str) -> Result<BTreeSet<IpAddr>, ResolveError>;
}

/// DNS resolver that samples the name several times and unions the answers
#[derive(Debug, Clone)]
pub struct DnsResolver {
    samples: u32,
    spacing: Duration,
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self {
            samples: 5,
            spacing: Duration::from_secs(1),
        }
    }
}

impl DnsResolver {
    pub fn new(samples: u32, spacing: Duration) -> Self {
        Self { samples, spacing }
    }
}

#[async_trait]
impl Resolve for DnsResolver {
    async fn resolve(&self, host: &str) -> Result<BTreeSet<IpAddr>, ResolveError> {
        sample_union(self.samples, self.spacing, || async move {
            let found = lookup_host((host, 0u16))
                .await
                .map_err(|source| ResolveError::Lookup {
                    host: host.to_string(),
                    source,
                })?;
            Ok(found.map(|addr| addr.ip()).collect())
        })
        .await
    }
}

/// Union the answers of `samples` lookups spaced `spacing` apart.
///
/// Any lookup failing fails the whole resolution; a small answer set does
/// not.
async fn sample_union<F, Fut>(
    samples: u32,
    spacing: Duration,
    mut lookup: F,
) -> Result<BTreeSet<IpAddr>, ResolveError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<IpAddr>, ResolveError>>,
{
    let mut addresses = BTreeSet::new();
    for round in 0..samples {
        if round > 0 {
            sleep(spacing).await;
        }
        addresses.extend(lookup().await?);
    }
    Ok(addresses)
}

/// Split a configured server address into host and port, appending the
/// default port when none is given.
pub fn split_server_address(
    address: &str,
    default_port: u16,
) -> Result<(String, u16), ResolveError> {
    if address.is_empty() {
        return Err(ResolveError::InvalidAddress(address.to_string()));
    }
    match address.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(ResolveError::InvalidAddress(address.to_string()));
            }
            let port = port
                .parse::<u16>()
                .map_err(|_| ResolveError::InvalidAddress(address.to_string()))?;
            Ok((host.to_string(), port))
        }
        None => Ok((address.to_string(), default_port)),
    }
}
