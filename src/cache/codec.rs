//! Payload encoding for the distributed tier.
//!
//! Values are serialized as JSON. Payloads larger than the configured
//! threshold are gzip-compressed. The first byte records which form follows.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use super::store::StoreError;

const RAW: u8 = 0;
const GZIP: u8 = 1;

pub fn encode<V: Serialize>(value: &V, compression_threshold: usize) -> Result<Vec<u8>, StoreError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| StoreError::Codec(format!("Failed to serialize value: {}", e)))?;

    if json.len() <= compression_threshold {
        let mut out = Vec::with_capacity(json.len() + 1);
        out.push(RAW);
        out.extend_from_slice(&json);
        return Ok(out);
    }

    let mut encoder = GzEncoder::new(vec![GZIP], Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| StoreError::Codec(format!("Failed to compress: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| StoreError::Codec(format!("Failed to finish compression: {}", e)))
}

pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, StoreError> {
    let (marker, body) = bytes
        .split_first()
        .ok_or_else(|| StoreError::Codec("empty payload".to_string()))?;

    match *marker {
        RAW => serde_json::from_slice(body)
            .map_err(|e| StoreError::Codec(format!("Failed to deserialize value: {}", e))),
        GZIP => {
            let mut json = Vec::new();
            GzDecoder::new(body)
                .read_to_end(&mut json)
                .map_err(|e| StoreError::Codec(format!("Failed to decompress: {}", e)))?;
            serde_json::from_slice(&json)
                .map_err(|e| StoreError::Codec(format!("Failed to deserialize value: {}", e)))
        }
        other => Err(StoreError::Codec(format!("unknown payload marker {}", other))),
    }
}
