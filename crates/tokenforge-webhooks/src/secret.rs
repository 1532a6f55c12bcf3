//! Signing secret generation.

use rand::RngCore;
use rand::rngs::OsRng;

const SECRET_PREFIX: &str = "whsec_";
const SECRET_BYTES: usize = 32;

/// Generate a fresh signing secret from the operating system's CSPRNG.
pub fn generate_signing_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", SECRET_PREFIX, hex::encode(bytes))
}
