//! Boot-state measurement digest
//!
//! The platform extends a measurement register with a digest describing how
//! this boot was policed: developer switch, recovery state, and whether
//! keyblocks were held to normal-mode checking. The four possible digests
//! are fixed values (SHA-1 over the three policy bytes
//! `developer ∥ recovery ∥ keyblock_mode`); attestation depends on this
//! table bit-exactly, so it is precomputed rather than derived at runtime.

/// Digest length in bytes.
pub const BOOT_STATE_DIGEST_SIZE: usize = 20;

// Indexed by 2 * recovery + developer.
const BOOT_STATE_DIGESTS: [[u8; BOOT_STATE_DIGEST_SIZE]; 4] = [
    // recovery = 0, developer = 0, keyblock_mode = 1
    [
        0x25, 0x47, 0xcc, 0x73, 0x6e, 0x95, 0x1f, 0xa4, 0x91, 0x98, 0x53, 0xc4, 0x3a, 0xe8, 0x90,
        0x86, 0x1a, 0x3b, 0x32, 0x64,
    ],
    // recovery = 0, developer = 1, keyblock_mode = 1
    [
        0xc4, 0x2a, 0xc1, 0xc4, 0x6f, 0x1d, 0x4e, 0x21, 0x1c, 0x73, 0x5c, 0xc7, 0xdf, 0xad, 0x4f,
        0xf8, 0x39, 0x11, 0x10, 0xe9,
    ],
    // recovery = 1, developer = 0, keyblock_mode = 0
    [
        0x62, 0x57, 0x18, 0x91, 0x21, 0x5b, 0x4e, 0xfc, 0x1c, 0xea, 0xb7, 0x44, 0xce, 0x59, 0xdd,
        0x0b, 0x66, 0xea, 0x6f, 0x73,
    ],
    // recovery = 1, developer = 1, keyblock_mode = 0
    [
        0x47, 0xec, 0x8d, 0x98, 0x36, 0x64, 0x33, 0xdc, 0x00, 0x2e, 0x77, 0x21, 0xc9, 0xe3, 0x7d,
        0x50, 0x67, 0x54, 0x79, 0x37,
    ],
];

/// The digest to extend into the measurement register for this boot state.
///
/// `keyblock_mode` is implied: 0 iff recovery, else 1.
pub fn boot_state_digest(recovery: bool, developer: bool) -> &'static [u8; BOOT_STATE_DIGEST_SIZE] {
    let index = 2 * usize::from(recovery) + usize::from(developer);
    &BOOT_STATE_DIGESTS[index]
}
