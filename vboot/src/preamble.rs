//! Kernel preamble verification
//!
//! The preamble follows the keyblock and is signed by the keyblock's data
//! key. It carries the kernel version (the low half of the composite
//! rollback version), the body signature descriptor, and the load/bootloader
//! addresses handed back to the caller.

use core::mem;

use log::debug;

use crate::context::{BootMode, LoadContext};
use crate::crypto::{DataKey, SigHeader};
use crate::error::{PreambleError, VbootResult};
use crate::rollback;

/// Fixed preamble header. The preamble signature covers the first
/// `signature.data_size` bytes, which must include this header and the
/// stored body-signature bytes; the signature itself lives outside the
/// covered region.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PreambleHeader {
    pub preamble_size: u32,
    pub kernel_version: u32,
    pub body_load_address: u64,
    pub bootloader_address: u64,
    pub bootloader_size: u32,
    pub flags: u32,
    pub signature: SigHeader,
    pub body_signature: SigHeader,
}

impl PreambleHeader {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn read_from(buf: &[u8]) -> Result<Self, PreambleError> {
        if buf.len() < Self::SIZE {
            return Err(PreambleError::Header);
        }
        // SAFETY: the bounds check above guarantees SIZE readable bytes,
        // the struct is repr(C) with only integer fields, and
        // read_unaligned places no alignment requirement on the source.
        Ok(unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) })
    }
}

/// Outcome of preamble verification for one candidate.
pub struct VerifiedPreamble {
    pub header: PreambleHeader,
    /// Data-key version in the upper 16 bits, kernel version in the lower.
    pub composite: u32,
    /// Signed state carried over from the keyblock, possibly downgraded
    /// here when the composite version rolls back under a permissive
    /// policy.
    pub signed: bool,
}

/// Verify the preamble at the start of `buf` under the keyblock's data key
/// and form the composite rollback version.
///
/// `signed` is the keyblock's verdict; a composite rollback demotes it
/// rather than failing when policy does not require signatures, so a stale
/// kernel can still boot in developer mode but never counts as signed.
pub fn verify_preamble(
    buf: &[u8],
    data_key: &DataKey,
    ctx: &LoadContext<'_>,
    require_signed: bool,
    signed: bool,
) -> VbootResult<VerifiedPreamble> {
    let header = PreambleHeader::read_from(buf)?;
    let preamble_size = header.preamble_size as usize;
    if preamble_size < PreambleHeader::SIZE || preamble_size > buf.len() {
        return Err(PreambleError::Header.into());
    }
    let pblock = &buf[..preamble_size];

    // The signed region must cover the whole header and the stored body
    // signature, so neither can be swapped after signing.
    let body_sig_end = header
        .body_signature
        .sig_offset
        .checked_add(header.body_signature.sig_size)
        .ok_or(PreambleError::Header)? as usize;
    let covered_min = PreambleHeader::SIZE.max(body_sig_end);
    if (header.signature.data_size as usize) < covered_min {
        return Err(PreambleError::Header.into());
    }

    let (Some(signature), Some(region)) = (
        header.signature.signature(pblock),
        header.signature.signed_region(pblock),
    ) else {
        return Err(PreambleError::Header.into());
    };
    if !data_key.verify_data(region, signature) {
        return Err(PreambleError::Signature.into());
    }

    // A kernel version beyond 16 bits cannot be represented in the secured
    // counter; reject in every mode.
    if header.kernel_version > 0xFFFF {
        return Err(PreambleError::VersionRange {
            kernel_version: header.kernel_version,
        }
        .into());
    }

    let composite = rollback::composite_version(data_key.key_version(), header.kernel_version);

    let mut signed = signed;
    if ctx.mode() != BootMode::Recovery {
        let secured = ctx.shared.kernel_version_secdata;
        if rollback::composite_rollback(composite, secured) {
            if require_signed {
                return Err(PreambleError::VersionRollback { composite, secured }.into());
            }
            debug!(
                "composite 0x{:08x} below secured 0x{:08x}; downgrading to self-signed",
                composite, secured
            );
            signed = false;
        }
    }

    Ok(VerifiedPreamble {
        header,
        composite,
        signed,
    })
}
