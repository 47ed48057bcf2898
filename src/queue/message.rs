//! Work-queue message schema and body codec
//!
//! Messages on the work queue are gzip-compressed JSON; the fanout exchange
//! carries the same schema as plain JSON. The PascalCase field names are a
//! fixed contract with the downstream processing side.

use crate::skin::SkinJson;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use super::connection::QueueError;

/// Name of the durable-delivery work queue
pub const WORK_QUEUE: &str = "player_skins";
/// Name of the best-effort fanout exchange
pub const FANOUT_EXCHANGE: &str = "new_skins";
/// Content type marking a gzip-compressed JSON body
pub const CONTENT_TYPE_JSON_GZ: &str = "application/json-gz";
/// Content type for plain JSON bodies on the fanout exchange
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// One skin observation as carried on the wire.
///
/// Immutable once constructed; the skin projection is treated as opaque
/// payload by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueuedSkin {
    pub username: String,
    pub xuid: String,
    pub skin: SkinJson,
    pub server_address: String,
    pub time: i64,
}

impl QueuedSkin {
    /// Build an observation stamped with the current unix time
    pub fn now(username: String, xuid: String, skin: SkinJson, server_address: String) -> Self {
        Self {
            username,
            xuid,
            skin,
            server_address,
            time: chrono::Utc::now().timestamp(),
        }
    }
}

/// Serialize and gzip a message body for the work queue
pub fn encode_body(skin: &QueuedSkin) -> Result<Vec<u8>, QueueError> {
    let json = serde_json::to_vec(skin)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Decode a delivered body, decompressing when marked `application/json-gz`
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> Result<QueuedSkin, QueueError> {
    if content_type == Some(CONTENT_TYPE_JSON_GZ) {
        let mut decoder = GzDecoder::new(body);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    } else {
        Ok(serde_json::from_slice(body)?)
    }
}
