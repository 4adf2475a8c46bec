//! Pagination-token codec.
//!
//! A continuation token is the store's last-evaluated key, serialized
//! as CBOR and armored as lowercase hex. Tokens are opaque: callers
//! pass them back verbatim, and decode enforces a defensive size
//! bound because tokens arrive from untrusted input.

use crate::{error::Error, store::Attrs};

// Defensive decode bound for untrusted token input.
const MAX_TOKEN_HEX_LEN: usize = 8 * 1024;

/// Encode a last-evaluated key as an opaque continuation token.
pub(crate) fn encode_token(key: &Attrs) -> Result<String, Error> {
    let bytes = serde_cbor::to_vec(key).map_err(|err| Error::InvalidParameter {
        name: "nextToken".to_string(),
        reason: format!("failed to encode continuation token: {err}"),
    })?;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in &bytes {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}

/// Decode a continuation token back into a last-evaluated key.
pub(crate) fn decode_token(token: &str) -> Result<Attrs, Error> {
    let token = token.trim();

    if token.is_empty() {
        return Err(invalid_token("token is empty"));
    }
    if token.len() > MAX_TOKEN_HEX_LEN {
        return Err(invalid_token(&format!(
            "token exceeds max length: {} hex chars (max {MAX_TOKEN_HEX_LEN})",
            token.len()
        )));
    }
    if !token.len().is_multiple_of(2) {
        return Err(invalid_token(
            "token must have an even number of hex characters",
        ));
    }

    let bytes = token.as_bytes();
    let mut raw = Vec::with_capacity(bytes.len() / 2);
    for idx in (0..bytes.len()).step_by(2) {
        let hi = decode_hex_nibble(bytes[idx])
            .ok_or_else(|| invalid_token(&format!("invalid hex character at position {}", idx + 1)))?;
        let lo = decode_hex_nibble(bytes[idx + 1])
            .ok_or_else(|| invalid_token(&format!("invalid hex character at position {}", idx + 2)))?;
        raw.push((hi << 4) | lo);
    }

    serde_cbor::from_slice(&raw)
        .map_err(|err| invalid_token(&format!("token payload did not decode: {err}")))
}

fn invalid_token(reason: &str) -> Error {
    Error::InvalidParameter {
        name: "nextToken".to_string(),
        reason: reason.to_string(),
    }
}

const fn decode_hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

///
/// TESTS
///
