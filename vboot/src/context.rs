//! Boot context threaded through the verification pipeline
//!
//! Everything a load needs rides in one [`LoadContext`]: the boot-mode
//! flags, the platform store seams, the scratch arena, and the shared-data
//! block whose outputs the firmware reads after the call. No global state.

use alloc::vec::Vec;

use bitflags::bitflags;

use crate::secdata::{FwmpStore, NvStorage, SecdataStore};
use crate::time::BootClock;
use crate::workbuf::WorkBuf;

bitflags! {
    /// Boot-mode and capability flags for one load call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BootFlags: u32 {
        /// Booting for recovery.
        const RECOVERY = 1 << 0;
        /// Developer switch is on.
        const DEVELOPER = 1 << 1;
        /// Platform offers a hardware crypto engine.
        const HW_CRYPTO_ALLOWED = 1 << 2;
        /// Do not modify the partition table's try state.
        const NOFAIL_BOOT = 1 << 3;
        /// Partition table lives on a different device than the kernels.
        const EXTERNAL_GPT = 1 << 4;
    }
}

/// The three boot modes, in dominance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Normal,
    Recovery,
    Developer,
}

impl BootMode {
    /// Classify the current boot. Recovery dominates developer dominates
    /// normal.
    pub fn resolve(flags: BootFlags) -> Self {
        if flags.contains(BootFlags::RECOVERY) {
            Self::Recovery
        } else if flags.contains(BootFlags::DEVELOPER) {
            Self::Developer
        } else {
            Self::Normal
        }
    }
}

/// Block shared with the outer firmware: the kernel subkey comes in, the
/// verification outcome goes out.
pub struct SharedData {
    /// Packed subkey that must have signed the kernel keyblock (from
    /// firmware verification, or the recovery root key).
    pub kernel_subkey: Vec<u8>,
    /// Whether the chosen kernel's keyblock was fully signature-valid.
    pub kernel_signed: bool,
    /// Counter target published at scan end; the firmware advances the
    /// secured counter to this value.
    pub kernel_version: u32,
    /// Snapshot of the secured counter taken when the load began.
    pub kernel_version_secdata: u32,
}

impl SharedData {
    pub fn new(kernel_subkey: Vec<u8>) -> Self {
        Self {
            kernel_subkey,
            kernel_signed: false,
            kernel_version: 0,
            kernel_version_secdata: 0,
        }
    }
}

/// Process-wide state for one kernel-load call.
pub struct LoadContext<'a> {
    pub flags: BootFlags,
    pub nv: &'a dyn NvStorage,
    pub secdata: &'a dyn SecdataStore,
    pub fwmp: &'a dyn FwmpStore,
    pub clock: &'a dyn BootClock,
    pub workbuf: WorkBuf<'a>,
    pub shared: SharedData,
}

impl<'a> LoadContext<'a> {
    pub fn new(
        flags: BootFlags,
        nv: &'a dyn NvStorage,
        secdata: &'a dyn SecdataStore,
        fwmp: &'a dyn FwmpStore,
        clock: &'a dyn BootClock,
        workbuf: WorkBuf<'a>,
        kernel_subkey: Vec<u8>,
    ) -> Self {
        Self {
            flags,
            nv,
            secdata,
            fwmp,
            clock,
            workbuf,
            shared: SharedData::new(kernel_subkey),
        }
    }

    pub fn mode(&self) -> BootMode {
        BootMode::resolve(self.flags)
    }

    pub fn recovery(&self) -> bool {
        self.flags.contains(BootFlags::RECOVERY)
    }

    pub fn developer(&self) -> bool {
        self.flags.contains(BootFlags::DEVELOPER)
    }
}
