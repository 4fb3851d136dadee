use anyhow::{Context, Result};
use base64::Engine;

/// Decode a base64 payload, accepting either bare base64 or a data URL.
///
/// Anything up to and including the first `,` is treated as a data-URL
/// header (`data:image/png;base64,`) and discarded.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("payload is not valid base64")
}
