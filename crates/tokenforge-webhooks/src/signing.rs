//! Payload signatures.
//!
//! Header format is `sha256=<hex>` where the hex part is the HMAC-SHA256 of the
//! raw request body keyed with the subscription's signing secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key")
}

/// Compute the signature header value for `body`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = mac_for(secret);
    mac.update(body);
    format!("{}{}", PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against `body` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    let Some(sig_hex) = signature.strip_prefix(PREFIX) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let mut mac = mac_for(secret);
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
