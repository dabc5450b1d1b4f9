//! Cryptographic glue for the verification pipeline
//!
//! Structure parsing and algorithm dispatch only; the primitives themselves
//! come from the RustCrypto crates (`rsa`, `sha2`).

pub mod constant_time;
pub mod key;

pub use key::{DataKey, KeyAlgorithm, PackedKeyHeader, SigHeader};

use sha2::{Digest, Sha256};

/// SHA-256 convenience wrapper used by the hash-only keyblock check and the
/// developer key-hash policy.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
