//! Verified kernel load
//!
//! This library is the kernel-selection core of a verified boot flow: given
//! a storage device and a partition-table cursor, it verifies each kernel
//! candidate's signature chain (keyblock → preamble → body) under the
//! policy for the current boot mode, enforces monotonic rollback protection
//! against a secured counter, and returns the kernel to hand off to. It
//! also exposes the fixed boot-state digest the platform extends into its
//! measurement register.
//!
//! The core is single-threaded and synchronous; disk access, the
//! partition-table format, non-volatile stores, and the secured counter are
//! all seams the platform implements ([`disk`], [`gpt`], [`secdata`]).
//! Cryptographic primitives come from the RustCrypto crates; this crate
//! owns only structure parsing, algorithm dispatch, and policy.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod context;
pub mod crypto;
pub mod disk;
pub mod error;
pub mod gpt;
pub mod keyblock;
pub mod load;
pub mod measure;
pub mod policy;
pub mod preamble;
pub mod rollback;
pub mod secdata;
pub mod time;
pub mod workbuf;

pub use context::{BootFlags, BootMode, LoadContext, SharedData};
pub use error::{VbootError, VbootResult};
pub use gpt::{Guid, KernelEntry, PartitionTable};
pub use load::{
    load_kernel, KernelBody, LoadKernelParams, LoadedKernel, VBLOCK_PREFIX_SIZE,
};
pub use measure::{boot_state_digest, BOOT_STATE_DIGEST_SIZE};
