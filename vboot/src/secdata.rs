//! Non-volatile flag, secured-counter, and firmware-management stores
//!
//! Three narrow seams onto platform-held state. All of them are read at
//! well-defined points during a load and must not change underneath the
//! call; updates are queued and flushed by the firmware afterwards.

use core::fmt;

/// Secure-store faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecdataError {
    /// Counter could not be read from the trusted store
    ReadFailed,
    /// Store contents failed its integrity check
    Corrupt,
}

impl fmt::Display for SecdataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "read failed"),
            Self::Corrupt => write!(f, "contents corrupt"),
        }
    }
}

/// Non-volatile flag store (firmware scratch flags, owner-writable).
pub trait NvStorage {
    /// Developer mode must still boot only officially-signed kernels.
    fn dev_boot_signed_only(&self) -> bool;

    /// Cap on how far the secured counter may be advanced by one boot.
    ///
    /// `u32::MAX` means no cap. Values below the current secured counter are
    /// ignored by the counter-update decision.
    fn kernel_max_rollforward(&self) -> u32;
}

/// Secured monotonic counter store.
pub trait SecdataStore {
    /// Current kernel rollback counter: key version in the upper 16 bits,
    /// kernel version in the lower 16.
    fn kernel_versions(&self) -> Result<u32, SecdataError>;
}

/// Firmware management parameters: owner-pinned policy for developer mode.
pub trait FwmpStore {
    /// Only officially-signed kernels may boot, even in developer mode.
    fn enable_official_only(&self) -> bool;

    /// Developer-mode kernels must use a data key matching
    /// [`dev_key_hash`](Self::dev_key_hash).
    fn use_dev_key_hash(&self) -> bool;

    /// SHA-256 of the only data key the owner allows in developer mode.
    fn dev_key_hash(&self) -> [u8; 32];
}
