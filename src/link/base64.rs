//! Base64 helpers for link payloads and subscription bodies
//!
//! Share links in the wild use every Base64 flavour: standard or URL-safe
//! alphabet, with or without padding, sometimes wrapped across lines.

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use tracing::trace;

// ============================================================================
// Base64 Decoding
// ============================================================================

/// Decodes Base64 content, trying multiple variants
///
/// Attempts to decode the content using:
/// 1. Standard Base64
/// 2. URL-safe Base64
/// 3. URL-safe Base64 without padding
/// 4. Standard/URL-safe with padding added
///
/// Whitespace in the input is removed before decoding.
pub fn decode_base64(content: &str) -> Result<Vec<u8>> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    trace!(
        "Attempting Base64 decode, cleaned length: {} bytes",
        cleaned.len()
    );

    for (name, engine) in [
        ("standard", &STANDARD),
        ("URL-safe", &URL_SAFE),
        ("URL-safe unpadded", &URL_SAFE_NO_PAD),
    ] {
        if let Ok(decoded) = engine.decode(&cleaned) {
            trace!("Decoded using {} Base64", name);
            return Ok(decoded);
        }
    }

    let padded = add_base64_padding(&cleaned);
    if let Ok(decoded) = STANDARD.decode(&padded) {
        trace!("Decoded using standard Base64 with added padding");
        return Ok(decoded);
    }
    if let Ok(decoded) = URL_SAFE.decode(&padded) {
        trace!("Decoded using URL-safe Base64 with added padding");
        return Ok(decoded);
    }

    bail!("Failed to decode Base64 content")
}

/// Decodes Base64 content that must be UTF-8 text
pub fn decode_base64_text(content: &str) -> Result<String> {
    let decoded = decode_base64(content)?;
    String::from_utf8(decoded).context("Decoded Base64 content is not valid UTF-8")
}

/// Adds proper padding to a Base64 string if missing
pub fn add_base64_padding(s: &str) -> String {
    let mut result = s.to_string();
    while !result.len().is_multiple_of(4) {
        result.push('=');
    }
    result
}

// ============================================================================
// Base64 Encoding
// ============================================================================

/// Standard padded Base64 (vmess payloads, socks userinfo)
pub fn encode_standard(data: &str) -> String {
    STANDARD.encode(data)
}

/// URL-safe unpadded Base64 (SIP002 userinfo)
pub fn encode_url_safe(data: &str) -> String {
    URL_SAFE_NO_PAD.encode(data)
}
