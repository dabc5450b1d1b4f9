//! Keyblock verification
//!
//! The keyblock is the signed envelope at the start of a kernel partition,
//! binding a per-kernel data key to the subkey the firmware trusts. Under a
//! permissive policy an invalid signature downgrades the candidate to
//! self-signed (hash-checked) instead of rejecting it; the `signed` state
//! that survives this ladder is what rollback protection and the scanner's
//! early-exit logic key off.
//!
//! Check order is fixed: signature, then hash fallback, then mode flags,
//! then key version, then the developer key-hash policy.

use core::mem;

use bitflags::bitflags;
use log::debug;

use crate::context::{BootMode, LoadContext};
use crate::crypto::constant_time::ct_eq_bytes;
use crate::crypto::{sha256, DataKey, PackedKeyHeader, SigHeader};
use crate::error::{KeyError, KeyblockError, VbootError, VbootResult};
use crate::rollback;

pub const KEYBLOCK_MAGIC: [u8; 8] = *b"KEYBLOCK";

bitflags! {
    /// Boot-mode states a keyblock authorizes.
    ///
    /// The wire header carries these as a raw `u32`; wrap it with
    /// [`KeyblockFlags::from_bits_retain`] before checking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyblockFlags: u32 {
        /// Bootable with the developer switch off.
        const DEVELOPER_0 = 0x1;
        /// Bootable with the developer switch on.
        const DEVELOPER_1 = 0x2;
        /// Bootable outside recovery.
        const RECOVERY_0 = 0x4;
        /// Bootable in recovery.
        const RECOVERY_1 = 0x8;
    }
}

/// Fixed keyblock header. The signed / hashed region is the first
/// `signature.data_size` (resp. `hash.data_size`) bytes of the keyblock and
/// must cover this header plus the embedded data-key material.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KeyblockHeader {
    pub magic: [u8; 8],
    pub keyblock_size: u32,
    pub keyblock_flags: u32,
    pub signature: SigHeader,
    pub hash: SigHeader,
    pub data_key: PackedKeyHeader,
}

/// Offset of the embedded data key; its internal offsets are relative to
/// this position.
pub const DATA_KEY_FIELD_OFFSET: usize = 40;

impl KeyblockHeader {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn read_from(buf: &[u8]) -> Result<Self, KeyblockError> {
        if buf.len() < Self::SIZE {
            return Err(KeyblockError::Header);
        }
        // SAFETY: the bounds check above guarantees SIZE readable bytes,
        // the struct is repr(C) with only integer/byte-array fields, and
        // read_unaligned places no alignment requirement on the source.
        let header = unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) };
        if header.magic != KEYBLOCK_MAGIC {
            return Err(KeyblockError::Magic);
        }
        Ok(header)
    }
}

/// Outcome of keyblock verification for one candidate.
pub struct VerifiedKeyblock {
    pub header: KeyblockHeader,
    /// Data key for the preamble and body steps.
    pub data_key: DataKey,
    /// True only if the signature, mode flags, and key version all checked
    /// out; false means the candidate survives as self-signed.
    pub signed: bool,
}

impl VerifiedKeyblock {
    pub fn key_version(&self) -> u32 {
        self.data_key.key_version()
    }
}

/// Do the keyblock flags authorize the current mode?
///
/// The developer bit matching the switch state and the recovery bit
/// matching the recovery state must both be set.
fn flags_permit(
    flags: KeyblockFlags,
    recovery: bool,
    developer: bool,
) -> Result<(), KeyblockError> {
    let dev_bit = if developer {
        KeyblockFlags::DEVELOPER_1
    } else {
        KeyblockFlags::DEVELOPER_0
    };
    if !flags.contains(dev_bit) {
        return Err(KeyblockError::DevFlag {
            flags: flags.bits(),
        });
    }

    let rec_bit = if recovery {
        KeyblockFlags::RECOVERY_1
    } else {
        KeyblockFlags::RECOVERY_0
    };
    if !flags.contains(rec_bit) {
        return Err(KeyblockError::RecFlag {
            flags: flags.bits(),
        });
    }

    Ok(())
}

/// Verify the keyblock at the start of `buf` against the firmware-provided
/// subkey, under the already-decided signature policy.
///
/// Returns the unpacked data key and whether the keyblock counts as signed.
/// Errors condemn this candidate only.
pub fn verify_keyblock(
    buf: &[u8],
    ctx: &LoadContext<'_>,
    require_signed: bool,
) -> VbootResult<VerifiedKeyblock> {
    let hw_crypto = ctx
        .flags
        .contains(crate::context::BootFlags::HW_CRYPTO_ALLOWED);

    // Unpack the subkey that is expected to have signed this keyblock.
    let subkey = DataKey::unpack(&ctx.shared.kernel_subkey, hw_crypto).map_err(VbootError::Key)?;

    let header = KeyblockHeader::read_from(buf).map_err(VbootError::Keyblock)?;
    let keyblock_size = header.keyblock_size as usize;
    if keyblock_size < KeyblockHeader::SIZE || keyblock_size > buf.len() {
        return Err(KeyblockError::Header.into());
    }
    let kblock = &buf[..keyblock_size];

    // The embedded data key, range-checked before anything is verified.
    // A key version beyond 16 bits is rejected here in every mode; it can
    // never be represented in the secured counter.
    let data_key_buf = &kblock[DATA_KEY_FIELD_OFFSET..];
    let data_key = DataKey::unpack(data_key_buf, hw_crypto).map_err(|e| match e {
        KeyError::VersionRange { key_version } => {
            VbootError::Keyblock(KeyblockError::VersionRange { key_version })
        }
        other => VbootError::Key(other),
    })?;

    // Signed/hashed regions must cover the header and the key material.
    let covered_min = DATA_KEY_FIELD_OFFSET
        + header.data_key.key_offset as usize
        + header.data_key.key_size as usize;

    // Signature attempt strictly precedes the hash attempt.
    let sig_valid = verify_signature(&subkey, &header.signature, kblock, covered_min);
    if !sig_valid {
        if require_signed && ctx.mode() != BootMode::Recovery {
            return Err(KeyblockError::Signature.into());
        }
        // Self-signed fallback: the keyblock hash must still be intact.
        // A broken hash is fatal in every mode.
        if !verify_hash(&header.hash, kblock, covered_min) {
            return Err(KeyblockError::Hash.into());
        }
        debug!("keyblock signature invalid; continuing as self-signed");
    }

    // Mode flags. A mismatch invalidates the keyblock; it is fatal only
    // when policy demands a signed keyblock.
    let mut signed = sig_valid;
    let flags = KeyblockFlags::from_bits_retain(header.keyblock_flags);
    if let Err(e) = flags_permit(flags, ctx.recovery(), ctx.developer()) {
        if require_signed {
            return Err(e.into());
        }
        debug!("keyblock flags {:?} do not cover this mode", flags);
        signed = false;
    }

    // Key-version monotonicity, bypassed in recovery.
    if ctx.mode() != BootMode::Recovery {
        let secured = ctx.shared.kernel_version_secdata;
        if rollback::key_rollback(data_key.key_version(), secured) {
            if require_signed {
                return Err(KeyblockError::VersionRollback {
                    key_version: data_key.key_version(),
                    secured,
                }
                .into());
            }
            debug!(
                "key version {} below secured {}; downgrading to self-signed",
                data_key.key_version(),
                rollback::secured_key_version(secured)
            );
            signed = false;
        }
    }

    // Owner-pinned developer key hash, independent of the signed state.
    if ctx.mode() == BootMode::Developer && ctx.fwmp.use_dev_key_hash() {
        let material = header
            .data_key
            .material(data_key_buf)
            .map_err(VbootError::Key)?;
        let digest = sha256(material);
        if ct_eq_bytes(&digest, &ctx.fwmp.dev_key_hash()) != 1 {
            return Err(KeyblockError::DevKeyHashMismatch.into());
        }
    }

    Ok(VerifiedKeyblock {
        header,
        data_key,
        signed,
    })
}

fn verify_signature(
    subkey: &DataKey,
    sig: &SigHeader,
    kblock: &[u8],
    covered_min: usize,
) -> bool {
    if (sig.data_size as usize) < covered_min {
        return false;
    }
    let (Some(signature), Some(region)) = (sig.signature(kblock), sig.signed_region(kblock))
    else {
        return false;
    };
    subkey.verify_data(region, signature)
}

fn verify_hash(hash: &SigHeader, kblock: &[u8], covered_min: usize) -> bool {
    if (hash.data_size as usize) < covered_min || hash.sig_size != 32 {
        return false;
    }
    let (Some(stored), Some(region)) = (hash.signature(kblock), hash.signed_region(kblock)) else {
        return false;
    };
    sha256(region).as_slice() == stored
}
