//! Resilient publish queue
//!
//! Long-lived broker connection management plus the producer/consumer
//! operations built on top of it: durable publish with indefinite retry,
//! best-effort fanout notification, and a re-subscribing consumer.

pub mod client;
pub mod connection;
pub mod message;

pub use client::SkinQueue;
pub use connection::{ConnectionState, QueueError, QueueTuning};
pub use message::{
    QueuedSkin, CONTENT_TYPE_JSON, CONTENT_TYPE_JSON_GZ, FANOUT_EXCHANGE, WORK_QUEUE,
};
