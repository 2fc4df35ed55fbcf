//! Code generation and verification hashing.
//!
//! Codes are re-derivable from a per-contact random seed via a keyed hash,
//! so a "resend" within the validity window delivers the same code without
//! minting a new secret. The server secret never leaves this module's
//! inputs; without it a code cannot be predicted from the stored seed.
//!
//! Persisted verification rows carry
//! `base64url(sha256("{code}:{bin_id}:{role}:{channel_type}:{channel_value}"))`,
//! which binds a code to its exact delivery channel and allows
//! verification without storing the code.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const CODE_LENGTH: u32 = 6;
pub const MAX_ATTEMPTS: i32 = 5;

/// Minimum digit count a submitted code must have after stripping.
pub const MIN_CODE_DIGITS: usize = 4;

type HmacSha256 = Hmac<Sha256>;

/// Random 128-bit hex seed for a fresh verification.
pub fn generate_seed() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derive the 6-digit code for a contact's seed. Same (secret, seed, bin,
/// role) always yields the same code; that is the resend-idempotency
/// mechanism.
pub fn derive_code(secret: &str, seed: &str, bin_id: Uuid, role: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}:{}:{}", seed, bin_id, role).as_bytes());
    let digest = mac.finalize().into_bytes();
    let num = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 10u32.pow(CODE_LENGTH);
    format!("{:0width$}", num, width = CODE_LENGTH as usize)
}

/// Channel-bound verification hash stored on the row.
pub fn code_hash(
    code: &str,
    bin_id: Uuid,
    role: &str,
    channel_type: &str,
    channel_value: &str,
) -> String {
    let input = format!(
        "{}:{}:{}:{}:{}",
        code, bin_id, role, channel_type, channel_value
    );
    let digest = Sha256::digest(input.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Constant-time hash comparison.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Strip a submitted code down to its digits.
pub fn strip_to_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}
