//! Observability
//!
//! Structured logging via the tracing stack. Metrics export and the error
//! webhook live outside this crate; process logs are the user-visible
//! surface for sweep counts, connectivity transitions, and publish retries.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use logging::{queue_span, session_span, sweep_span};
