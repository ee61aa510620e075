//! Envelope encoding: gzip-compressed JSON with a schema version header.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    schema_version: u32,
    content_hash: String,
    label: String,
    created_at: DateTime<Utc>,
    payload: T,
}

/// Wrap a payload in a versioned envelope and gzip it.
pub fn encode<T: Serialize>(key: &CacheKey, payload: &T) -> CacheResult<Vec<u8>> {
    let envelope = Envelope {
        schema_version: key.schema_version,
        content_hash: key.content_hash.clone(),
        label: key.label.clone(),
        created_at: Utc::now(),
        payload,
    };
    let json = serde_json::to_vec(&envelope)
        .map_err(|e| CacheError::Serialization(format!("Failed to serialize cache payload: {}", e)))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| CacheError::Serialization(format!("Failed to gzip cache payload: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Serialization(format!("Failed to finish gzip encoding: {}", e)))
}

/// Decode an entry, checking its schema version before touching the payload.
pub fn decode<T: DeserializeOwned>(data: &[u8], expected_version: u32) -> CacheResult<T> {
    let mut decoder = GzDecoder::new(data);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| CacheError::corrupt(format!("gzip: {}", e)))?;

    let envelope: Envelope<serde_json::Value> =
        serde_json::from_slice(&json).map_err(|e| CacheError::corrupt(format!("envelope: {}", e)))?;

    if envelope.schema_version != expected_version {
        return Err(CacheError::SchemaMismatch {
            stored: envelope.schema_version,
            expected: expected_version,
        });
    }

    serde_json::from_value(envelope.payload).map_err(|e| CacheError::corrupt(format!("payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_checked_before_payload() {
        let key = CacheKey::analysis("h", "x", 1);
        let bytes = encode(&key, &vec![1, 2, 3]).unwrap();
        // A v2 reader must not even try to decode the v1 payload shape.
        let err = decode::<String>(&bytes, 2).unwrap_err();
        assert!(matches!(err, CacheError::SchemaMismatch { stored: 1, expected: 2 }));
        assert_eq!(decode::<Vec<u8>>(&bytes, 1).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = decode::<u32>(b"not gzip at all", 1).unwrap_err();
        assert!(err.is_stale_entry());
    }
}
