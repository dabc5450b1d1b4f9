//! Kernel selection scan
//!
//! Drives the whole pipeline: iterate the partition table's kernel entries,
//! run each candidate through keyblock → preamble → body verification, mark
//! rejects bad, and pick the kernel to hand off. Per-candidate faults are
//! consumed here; the caller only ever sees the scan-end outcomes.
//!
//! A fixed 64 KiB prefix of each partition is read up front. It bounds the
//! scratch arena, lets the vblock be judged before committing to a body
//! read, and covers the common case that the body starts inside it.

use alloc::vec;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::context::{BootFlags, BootMode, LoadContext};
use crate::disk::{DiskAccess, DiskStream};
use crate::error::{BodyError, PreambleError, VbootError, VbootResult};
use crate::gpt::{Guid, KernelEntry, PartitionTable};
use crate::keyblock;
use crate::policy;
use crate::preamble;
use crate::rollback::LowestVersion;

/// Bytes of each partition read before any verification decision.
pub const VBLOCK_PREFIX_SIZE: usize = 0x10000;

/// Caller-supplied parameters for one load.
pub struct LoadKernelParams<'a> {
    pub bytes_per_lba: u64,
    pub streaming_lba_count: u64,
    pub gpt_lba_count: u64,
    /// Preallocated body destination. When absent the body is returned in
    /// an owned buffer sized by the body signature, for the caller to place
    /// at the preamble's load address.
    pub kernel_buffer: Option<&'a mut [u8]>,
}

/// Where the verified body ended up.
#[derive(Debug)]
pub enum KernelBody {
    Owned(Vec<u8>),
    InCallerBuffer { len: usize },
}

/// The selected kernel, written back to the caller on success.
#[derive(Debug)]
pub struct LoadedKernel {
    /// 1-based partition number.
    pub partition_number: u32,
    pub partition_guid: Guid,
    pub body: KernelBody,
    pub body_load_address: u64,
    pub bootloader_address: u64,
    pub bootloader_size: u32,
    /// Preamble flags, passed through untouched.
    pub flags: u32,
}

struct Candidate {
    signed: bool,
    composite: u32,
    loaded: Option<LoadedKernel>,
}

/// Locate, verify, and load a kernel from `disk`.
///
/// The partition table is written back and released on every exit path,
/// success or failure.
pub fn load_kernel(
    ctx: &mut LoadContext<'_>,
    disk: &mut dyn DiskAccess,
    table: &mut dyn PartitionTable,
    params: &mut LoadKernelParams<'_>,
) -> VbootResult<LoadedKernel> {
    let started_ms = ctx.clock.uptime_ms();
    let result = scan(ctx, disk, table, params);
    let write_back = table.write_back();
    let elapsed_ms = ctx.clock.uptime_ms().saturating_sub(started_ms);

    match &result {
        Ok(kernel) => info!(
            "selected kernel partition {} ({}) in {} ms",
            kernel.partition_number, kernel.partition_guid, elapsed_ms
        ),
        Err(e) => warn!("kernel selection failed after {} ms: {}", elapsed_ms, e),
    }

    let kernel = result?;
    write_back.map_err(VbootError::Disk)?;
    Ok(kernel)
}

fn scan(
    ctx: &mut LoadContext<'_>,
    disk: &mut dyn DiskAccess,
    table: &mut dyn PartitionTable,
    params: &mut LoadKernelParams<'_>,
) -> VbootResult<LoadedKernel> {
    let secured = ctx.secdata.kernel_versions()?;
    ctx.shared.kernel_version_secdata = secured;
    ctx.shared.kernel_version = secured;

    let require_signed = policy::require_signed(ctx);
    let recovery = ctx.mode() == BootMode::Recovery;
    debug!(
        "scan start: mode {:?}, secured 0x{:08x}, require_signed {}, geometry {}/{} LBAs at {} bytes",
        ctx.mode(),
        secured,
        require_signed,
        params.streaming_lba_count,
        params.gpt_lba_count,
        params.bytes_per_lba
    );

    let mut lowest = LowestVersion::new();
    let mut chosen: Option<LoadedKernel> = None;
    let mut chosen_signed = false;
    let mut saw_candidate = false;

    while let Some(entry) = table.next_kernel_entry() {
        saw_candidate = true;
        let vblock_only = chosen.is_some();

        let mark = ctx.workbuf.mark();
        let candidate = examine_candidate(ctx, disk, params, &entry, require_signed, vblock_only);
        ctx.workbuf.release(mark);

        match candidate {
            Ok(c) => {
                if c.signed {
                    lowest.observe(c.composite);
                }
                if let Some(loaded) = c.loaded {
                    if !ctx.flags.contains(BootFlags::NOFAIL_BOOT) {
                        table.mark_current_try();
                    }
                    chosen_signed = c.signed;
                    info!(
                        "partition {} verified: signed {}, version 0x{:08x}",
                        loaded.partition_number, c.signed, c.composite
                    );
                    chosen = Some(loaded);

                    // Self-signed kernels and recovery boots get no
                    // rollback protection; the first valid kernel wins.
                    if recovery || !c.signed {
                        break;
                    }
                    // Counter already matches; no lower version matters.
                    if c.composite == secured {
                        break;
                    }
                }
            }
            Err(e) if e.is_per_candidate() => {
                warn!("partition {} rejected: {}", entry.index + 1, e);
                table.mark_current_bad();
            }
            Err(e) => return Err(e),
        }
    }

    let Some(loaded) = chosen else {
        return Err(if saw_candidate {
            VbootError::InvalidKernelFound
        } else {
            VbootError::NoKernelFound
        });
    };

    // Published once, for the kernel actually returned; candidates examined
    // after it never touch the shared block.
    ctx.shared.kernel_signed = chosen_signed;

    if let Some(target) = lowest.counter_target(secured, ctx.nv.kernel_max_rollforward()) {
        ctx.shared.kernel_version = target;
        info!("secured counter may advance to 0x{:08x}", target);
    }

    Ok(loaded)
}

/// Run one partition through the verification chain.
///
/// `vblock_only` skips the body once a good kernel is already in hand; the
/// candidate then only contributes to version tracking.
fn examine_candidate(
    ctx: &mut LoadContext<'_>,
    disk: &mut dyn DiskAccess,
    params: &mut LoadKernelParams<'_>,
    entry: &KernelEntry,
    require_signed: bool,
    vblock_only: bool,
) -> VbootResult<Candidate> {
    let mut stream = disk.open_stream(entry.start_lba, entry.lba_count)?;

    let prefix_region = ctx.workbuf.alloc(VBLOCK_PREFIX_SIZE)?;
    stream.read(ctx.workbuf.get_mut(&prefix_region))?;

    let prefix = ctx.workbuf.get(&prefix_region);
    let keyblock = keyblock::verify_keyblock(prefix, ctx, require_signed)?;
    let keyblock_size = keyblock.header.keyblock_size as usize;

    let preamble = preamble::verify_preamble(
        &prefix[keyblock_size..],
        &keyblock.data_key,
        ctx,
        require_signed,
        keyblock.signed,
    )?;

    if vblock_only {
        return Ok(Candidate {
            signed: preamble.signed,
            composite: preamble.composite,
            loaded: None,
        });
    }

    let header = &preamble.header;
    let preamble_size = header.preamble_size as usize;

    // Body layout. Arbitrary gaps between preamble and body are refused:
    // the body must begin inside the prefix already read.
    let body_offset = (keyblock_size + preamble_size) as u64;
    if body_offset > VBLOCK_PREFIX_SIZE as u64 {
        return Err(BodyError::Offset {
            body_offset,
            prefix: VBLOCK_PREFIX_SIZE,
        }
        .into());
    }

    let body_size = header.body_signature.data_size as u64;
    let partition_bytes = entry.lba_count.saturating_mul(params.bytes_per_lba);
    if body_size == 0 || body_offset.saturating_add(body_size) > partition_bytes {
        return Err(BodyError::Size {
            body_size,
            limit: partition_bytes.saturating_sub(body_offset),
        }
        .into());
    }
    let body_len = body_size as usize;

    let body_sig = header
        .body_signature
        .signature(&prefix[keyblock_size..keyblock_size + preamble_size])
        .ok_or(PreambleError::Header)?;

    let body = match params.kernel_buffer.as_deref_mut() {
        Some(dest) => {
            if dest.len() < body_len {
                return Err(BodyError::Size {
                    body_size,
                    limit: dest.len() as u64,
                }
                .into());
            }
            let dest = &mut dest[..body_len];
            fill_body(dest, prefix, body_offset as usize, stream.as_mut())?;
            if !keyblock.data_key.verify_data(dest, body_sig) {
                return Err(BodyError::Signature.into());
            }
            KernelBody::InCallerBuffer { len: body_len }
        }
        None => {
            let mut owned = vec![0u8; body_len];
            fill_body(&mut owned, prefix, body_offset as usize, stream.as_mut())?;
            if !keyblock.data_key.verify_data(&owned, body_sig) {
                return Err(BodyError::Signature.into());
            }
            KernelBody::Owned(owned)
        }
    };

    Ok(Candidate {
        signed: preamble.signed,
        composite: preamble.composite,
        loaded: Some(LoadedKernel {
            partition_number: entry.index + 1,
            partition_guid: entry.guid,
            body,
            body_load_address: header.body_load_address,
            bootloader_address: header.bootloader_address,
            bootloader_size: header.bootloader_size,
            flags: header.flags,
        }),
    })
}

/// Copy the part of the body the prefix already holds, then stream the
/// remainder straight into the destination.
fn fill_body(
    dest: &mut [u8],
    prefix: &[u8],
    body_offset: usize,
    stream: &mut dyn DiskStream,
) -> VbootResult<()> {
    let already = prefix.len().saturating_sub(body_offset).min(dest.len());
    dest[..already].copy_from_slice(&prefix[body_offset..body_offset + already]);
    if already < dest.len() {
        stream.read(&mut dest[already..])?;
    }
    Ok(())
}
