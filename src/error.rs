//! Top-level error type
//!
//! Each module carries its own thiserror enum; this aggregate exists for
//! process wiring and embedders that want a single error surface.

use thiserror::Error;

/// Any error the fleet core can surface to its owner
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("resolver error: {0}")]
    Resolve(#[from] crate::fleet::ResolveError),

    #[error("identity error: {0}")]
    Token(#[from] crate::identity::TokenError),
}

/// Result type for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::queue::QueueError;

    #[test]
    fn module_errors_convert_into_fleet_error() {
        let config: FleetError = ConfigError::InvalidConfig("bad".to_string()).into();
        assert!(matches!(config, FleetError::Config(_)));
        assert!(config.to_string().contains("bad"));

        let queue: FleetError = QueueError::Closed.into();
        assert!(matches!(queue, FleetError::Queue(_)));
    }
}
