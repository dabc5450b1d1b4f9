//! Signature-requirement policy
//!
//! One predicate decides, for the whole pipeline, whether a candidate's
//! keyblock signature must verify or a hash-only keyblock suffices. Every
//! downstream check consults this and nothing else.

use crate::context::{BootMode, LoadContext};

/// Must the keyblock signature verify?
///
/// True outside developer mode, and in developer mode when either the owner
/// (FWMP `enable_official_only`) or the user (NV `dev_boot_signed_only`)
/// insists on officially-signed kernels.
pub fn require_signed(ctx: &LoadContext<'_>) -> bool {
    ctx.mode() != BootMode::Developer
        || ctx.fwmp.enable_official_only()
        || ctx.nv.dev_boot_signed_only()
}
