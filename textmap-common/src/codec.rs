//! Artifact codec for the final clustering tree
//!
//! The front end receives the map as a transport string built as
//! UTF-8 JSON bytes -> zlib DEFLATE -> base64. Consumers reverse the chain
//! exactly (e.g. `pako.inflate` in the browser):
//!
//! ```text
//! let compressed = Uint8Array.from(atob(input), (c) => c.charCodeAt(0));
//! let json = pako.inflate(compressed, { to: "string" });
//! ```

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Serialize a value to the compressed base64 transport string.
pub fn encode_map<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Reverse of [`encode_map`]: base64 decode, inflate, parse JSON.
pub fn decode_map<T: DeserializeOwned>(encoded: &str) -> Result<T> {
    let compressed = BASE64
        .decode(encoded)
        .map_err(|e| Error::Internal(format!("base64 decode failed: {}", e)))?;
    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn round_trip_reproduces_structure_exactly() {
        let original = json!({
            "children": [
                {"x": 1.25, "y": -3.5, "keywords": [{"keyword": "cable", "count": 8}]},
                {"x": 0.0, "y": 0.0, "children": []},
            ],
            "metadata": {"x": {"min": -1.0, "max": 4.0}},
        });

        let encoded = encode_map(&original).unwrap();
        let decoded: Value = decode_map(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn round_trip_unicode_text() {
        let original = json!({"text": "שלום عالم 👀 naïve"});
        let decoded: Value = decode_map(&encode_map(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn encoded_output_is_ascii() {
        let encoded = encode_map(&json!({"a": [1, 2, 3]})).unwrap();
        assert!(encoded.is_ascii());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_map::<Value>("not base64 at all!!!").is_err());
        // Valid base64 but not a zlib stream
        assert!(decode_map::<Value>(&BASE64.encode(b"plain bytes")).is_err());
    }
}
