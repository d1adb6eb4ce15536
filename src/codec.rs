//! Durable textual encoding for fetched assets
//!
//! Assets are persisted as `data:<content-type>;base64,<payload>` so the
//! stored string can be decoded back into the exact bytes that were fetched.

use crate::error::{FlagError, FlagResult};
use base64::Engine;

/// Content type assumed when a response does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "image/svg+xml";

/// Raw asset bytes recovered from a stored data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAsset {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Encode bytes as a base64 data URL
pub fn encode_data_url(bytes: &[u8], content_type: &str) -> String {
    let encoded_capacity = base64::encoded_len(bytes.len(), true).unwrap_or(0);
    let mut encoded = String::with_capacity(encoded_capacity + 13 + content_type.len());

    encoded.push_str("data:");
    encoded.push_str(content_type);
    encoded.push_str(";base64,");
    base64::engine::general_purpose::STANDARD.encode_string(bytes, &mut encoded);

    encoded
}

/// Decode a base64 data URL produced by [`encode_data_url`]
pub fn decode_data_url(data_url: &str) -> FlagResult<DecodedAsset> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| FlagError::Decode("missing data: prefix".to_string()))?;

    let (content_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| FlagError::Decode("missing ;base64, separator".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| FlagError::Decode(e.to_string()))?;

    let content_type = if content_type.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        content_type.to_string()
    };

    Ok(DecodedAsset {
        content_type,
        bytes,
    })
}
