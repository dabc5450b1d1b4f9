//! Error types for the verified kernel-load core
//!
//! One crate-wide taxonomy: per-candidate verification faults, collaborator
//! faults, and the two scan-end outcomes. Per-candidate errors are consumed
//! by the scanner (the entry is marked bad and the scan continues); only the
//! scan-end variants reach the caller of [`load_kernel`](crate::load_kernel).

use core::fmt;

use crate::disk::DiskError;
use crate::secdata::SecdataError;

/// Main verification error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "verification errors must be handled, not silently discarded"]
pub enum VbootError {
    /// Keyblock-related faults
    Keyblock(KeyblockError),

    /// Preamble-related faults
    Preamble(PreambleError),

    /// Kernel body layout or signature faults
    Body(BodyError),

    /// Packed-key parsing faults
    Key(KeyError),

    /// Work buffer exhausted
    WorkBufExhausted {
        requested: usize,
        available: usize,
    },

    /// Storage stream fault
    Disk(DiskError),

    /// Secure-counter store fault
    Secdata(SecdataError),

    /// Candidates were enumerated but none verified
    InvalidKernelFound,

    /// No kernel candidate was enumerated at all
    NoKernelFound,
}

/// Keyblock verification faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyblockError {
    /// Buffer too small for the header, or internal sizes inconsistent
    Header,
    /// Magic bytes mismatch
    Magic,
    /// Signature invalid while policy requires a signed keyblock
    Signature,
    /// Fallback hash check failed
    Hash,
    /// Keyblock does not authorize the current developer-mode state
    DevFlag { flags: u32 },
    /// Keyblock does not authorize the current recovery-mode state
    RecFlag { flags: u32 },
    /// Data-key version exceeds the 16-bit storable range
    VersionRange { key_version: u32 },
    /// Data-key version is below the secured counter
    VersionRollback { key_version: u32, secured: u32 },
    /// Data-key hash does not match the owner-pinned developer key hash
    DevKeyHashMismatch,
}

/// Preamble verification faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreambleError {
    /// Buffer too small for the header, or internal sizes inconsistent
    Header,
    /// Preamble signature invalid under the keyblock data key
    Signature,
    /// Kernel version exceeds the 16-bit storable range
    VersionRange { kernel_version: u32 },
    /// Composite version is below the secured counter
    VersionRollback { composite: u32, secured: u32 },
}

/// Kernel-body faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyError {
    /// Body starts beyond the pre-read prefix window
    Offset { body_offset: u64, prefix: usize },
    /// Body does not fit the partition or the caller's buffer
    Size { body_size: u64, limit: u64 },
    /// Body signature invalid under the keyblock data key
    Signature,
}

/// Packed-key parsing faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// Buffer too small for the packed-key header
    Header,
    /// Unknown algorithm identifier
    Algorithm { algorithm: u32 },
    /// Key material exceeds the containing buffer
    Bounds { key_offset: u32, key_size: u32 },
    /// Key material length does not match the algorithm's modulus size
    MaterialSize { key_size: u32, expected: u32 },
    /// Key version exceeds the 16-bit storable range
    VersionRange { key_version: u32 },
    /// Modulus rejected by the RSA backend
    BadModulus,
}

/// Result type alias for verification operations
pub type VbootResult<T> = Result<T, VbootError>;

impl VbootError {
    /// True for faults that condemn a single candidate but not the scan.
    ///
    /// The scan-end outcomes and secure-counter faults abort the whole load;
    /// everything else makes the scanner mark the entry bad and move on.
    pub fn is_per_candidate(&self) -> bool {
        !matches!(
            self,
            Self::InvalidKernelFound | Self::NoKernelFound | Self::Secdata(_)
        )
    }
}

impl fmt::Display for VbootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyblock(e) => write!(f, "keyblock: {}", e),
            Self::Preamble(e) => write!(f, "preamble: {}", e),
            Self::Body(e) => write!(f, "kernel body: {}", e),
            Self::Key(e) => write!(f, "packed key: {}", e),
            Self::WorkBufExhausted {
                requested,
                available,
            } => {
                write!(
                    f,
                    "work buffer exhausted: requested {} bytes, {} available",
                    requested, available
                )
            }
            Self::Disk(e) => write!(f, "disk: {}", e),
            Self::Secdata(e) => write!(f, "secure counter store: {}", e),
            Self::InvalidKernelFound => write!(f, "kernel partitions found, none verified"),
            Self::NoKernelFound => write!(f, "no kernel partition found"),
        }
    }
}

impl fmt::Display for KeyblockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "malformed header"),
            Self::Magic => write!(f, "bad magic"),
            Self::Signature => write!(f, "signature invalid"),
            Self::Hash => write!(f, "hash invalid"),
            Self::DevFlag { flags } => {
                write!(f, "developer-mode flag mismatch (flags 0x{:x})", flags)
            }
            Self::RecFlag { flags } => {
                write!(f, "recovery-mode flag mismatch (flags 0x{:x})", flags)
            }
            Self::VersionRange { key_version } => {
                write!(f, "key version 0x{:x} out of range", key_version)
            }
            Self::VersionRollback {
                key_version,
                secured,
            } => {
                write!(
                    f,
                    "key version 0x{:x} below secured 0x{:x}",
                    key_version, secured
                )
            }
            Self::DevKeyHashMismatch => write!(f, "developer key hash mismatch"),
        }
    }
}

impl fmt::Display for PreambleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "malformed header"),
            Self::Signature => write!(f, "signature invalid"),
            Self::VersionRange { kernel_version } => {
                write!(f, "kernel version 0x{:x} out of range", kernel_version)
            }
            Self::VersionRollback { composite, secured } => {
                write!(
                    f,
                    "composite version 0x{:08x} below secured 0x{:08x}",
                    composite, secured
                )
            }
        }
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offset {
                body_offset,
                prefix,
            } => {
                write!(
                    f,
                    "body offset {} beyond {}-byte prefix",
                    body_offset, prefix
                )
            }
            Self::Size { body_size, limit } => {
                write!(f, "body size {} exceeds limit {}", body_size, limit)
            }
            Self::Signature => write!(f, "signature invalid"),
        }
    }
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "truncated header"),
            Self::Algorithm { algorithm } => write!(f, "unknown algorithm {}", algorithm),
            Self::Bounds {
                key_offset,
                key_size,
            } => {
                write!(
                    f,
                    "key material ({} bytes at offset {}) out of bounds",
                    key_size, key_offset
                )
            }
            Self::MaterialSize { key_size, expected } => {
                write!(
                    f,
                    "key material {} bytes, algorithm expects {}",
                    key_size, expected
                )
            }
            Self::VersionRange { key_version } => {
                write!(f, "key version 0x{:x} out of range", key_version)
            }
            Self::BadModulus => write!(f, "modulus rejected"),
        }
    }
}

// Conversion implementations
impl From<KeyblockError> for VbootError {
    fn from(err: KeyblockError) -> Self {
        Self::Keyblock(err)
    }
}

impl From<PreambleError> for VbootError {
    fn from(err: PreambleError) -> Self {
        Self::Preamble(err)
    }
}

impl From<BodyError> for VbootError {
    fn from(err: BodyError) -> Self {
        Self::Body(err)
    }
}

impl From<KeyError> for VbootError {
    fn from(err: KeyError) -> Self {
        Self::Key(err)
    }
}

impl From<DiskError> for VbootError {
    fn from(err: DiskError) -> Self {
        Self::Disk(err)
    }
}

impl From<SecdataError> for VbootError {
    fn from(err: SecdataError) -> Self {
        Self::Secdata(err)
    }
}
