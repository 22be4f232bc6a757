//! Unsigned development tokens.
//!
//! Login mints a JWT-shaped token, `header.payload.signature`, where the
//! header declares `alg: "none"` and the signature segment is empty. The
//! payload carries a single `sub` claim holding the address. Tokens are a
//! development-only identity vector; anything declaring a real algorithm is
//! refused so these can never be confused with production authentication.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::address::Address;

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
}

/// Mints an unsigned token whose `sub` claim is the given address.
#[must_use]
pub fn mint(address: &Address) -> String {
    let header = Header {
        alg: "none".to_string(),
        typ: "JWT".to_string(),
    };
    let claims = Claims {
        sub: address.to_string(),
    };
    // serde_json cannot fail on these plain string structs
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap_or_default());
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
    format!("{header}.{payload}.")
}

/// Decodes the `sub` claim of an unsigned token.
///
/// Returns `None` for anything that is not a three-segment token with an
/// `alg: "none"` header and a well-formed address in `sub`. Decode failures
/// are deliberately silent: the request simply proceeds unauthenticated.
#[must_use]
pub fn decode_subject(token: &str) -> Option<Address> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let header = URL_SAFE_NO_PAD.decode(parts[0]).ok()?;
    let header: serde_json::Value = serde_json::from_slice(&header).ok()?;
    // Refuse any declared algorithm other than "none". A signed token here
    // would mean someone is pointing real credentials at a dev proxy.
    if header.get("alg").and_then(|v| v.as_str()) != Some("none") {
        return None;
    }

    let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&payload).ok()?;
    claims.get("sub")?.as_str()?.parse().ok()
}
