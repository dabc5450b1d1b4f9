//! Constant-time comparison
//!
//! The developer key-hash policy compares an attacker-influenced digest
//! against an owner-pinned value; that comparison must not leak the position
//! of the first differing byte through timing.

use core::sync::atomic::{compiler_fence, Ordering};

/// Constant-time byte comparison.
///
/// Returns 1 if equal, 0 otherwise. Every byte pair contributes to the
/// accumulated difference; there is no early exit. A length mismatch
/// returns 0 immediately (lengths are public here).
#[inline(never)]
pub fn ct_eq_bytes(a: &[u8], b: &[u8]) -> u8 {
    if a.len() != b.len() {
        return 0;
    }

    let diff = a
        .iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));

    // The fence pins the reduction above; the result must depend on the
    // whole accumulation, not a folded-away prefix of it.
    compiler_fence(Ordering::SeqCst);

    // diff | -diff has its high bit set exactly when diff is nonzero, so
    // this collapses to 0 or 1 without a branch.
    1 ^ ((diff | diff.wrapping_neg()) >> 7)
}
