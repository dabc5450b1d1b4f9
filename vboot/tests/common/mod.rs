//! Shared fixtures for kernel-load integration tests
//!
//! Builds fully-signed kernel partitions in memory: real RSA-2048 keys
//! (deterministic, generated once per test binary), a RAM-backed disk with
//! bounded per-partition streams, and an inspectable partition table that
//! records bad/try marks and write-backs.

#![allow(dead_code)]

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use vboot::context::{BootFlags, LoadContext};
use vboot::disk::{DiskAccess, DiskError, DiskStream};
use vboot::gpt::{Guid, KernelEntry, PartitionTable};
use vboot::keyblock::KeyblockFlags;
use vboot::load::{load_kernel, LoadKernelParams, LoadedKernel, VBLOCK_PREFIX_SIZE};
use vboot::secdata::{FwmpStore, NvStorage, SecdataError, SecdataStore};
use vboot::time::NullClock;
use vboot::workbuf::WorkBuf;
use vboot::VbootResult;

pub const BYTES_PER_LBA: u64 = 512;

/// Every mode bit set: the keyblock boots anywhere.
pub const KEYBLOCK_FLAGS_ALL: u32 = KeyblockFlags::all().bits();

// ---------------------------------------------------------------------------
// Deterministic signing keys, generated once per test binary
// ---------------------------------------------------------------------------

fn subkey_private() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut StdRng::seed_from_u64(0x5EED_0001), 2048).unwrap()
    })
}

fn data_key_private() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut StdRng::seed_from_u64(0x5EED_0002), 2048).unwrap()
    })
}

fn modulus_bytes(key: &RsaPublicKey) -> Vec<u8> {
    let n = key.n().to_bytes_be();
    assert!(n.len() <= 256);
    let mut out = vec![0u8; 256 - n.len()];
    out.extend_from_slice(&n);
    out
}

fn sign(key: &RsaPrivateKey, data: &[u8]) -> Vec<u8> {
    let digest = Sha256::digest(data);
    let sig = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest).unwrap();
    assert_eq!(sig.len(), 256);
    sig
}

/// Packed form of the subkey the firmware hands to the loader.
pub fn packed_subkey() -> Vec<u8> {
    packed_key(&RsaPublicKey::from(subkey_private()), 0, 1)
}

/// SHA-256 of the data key's packed material, as FWMP would pin it.
pub fn data_key_material_hash() -> [u8; 32] {
    let material = modulus_bytes(&RsaPublicKey::from(data_key_private()));
    Sha256::digest(&material).into()
}

fn packed_key(key: &RsaPublicKey, algorithm: u32, key_version: u32) -> Vec<u8> {
    let material = modulus_bytes(key);
    let mut buf = Vec::with_capacity(16 + material.len());
    buf.extend_from_slice(&algorithm.to_le_bytes());
    buf.extend_from_slice(&key_version.to_le_bytes());
    buf.extend_from_slice(&(material.len() as u32).to_le_bytes());
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&material);
    buf
}

// ---------------------------------------------------------------------------
// Image building
// ---------------------------------------------------------------------------

// Keyblock layout: 56-byte header, data-key material at 56..312, hash digest
// at 312..344, subkey signature at 344..600.
const KEYBLOCK_SIZE: usize = 600;
const KEYBLOCK_COVERED: usize = 312;

// Preamble layout: 56-byte header, body signature at 56..312, preamble
// signature at 312..568.
const PREAMBLE_SIZE: usize = 568;
const PREAMBLE_COVERED: usize = 312;

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

/// Everything that varies between test kernel images.
pub struct ImageSpec {
    pub data_key_version: u32,
    pub kernel_version: u32,
    pub keyblock_flags: u32,
    pub corrupt_keyblock_sig: bool,
    pub corrupt_body: bool,
    pub body: Vec<u8>,
    pub body_load_address: u64,
    pub bootloader_address: u64,
    pub bootloader_size: u32,
    pub preamble_flags: u32,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            data_key_version: 1,
            kernel_version: 1,
            keyblock_flags: KEYBLOCK_FLAGS_ALL,
            corrupt_keyblock_sig: false,
            corrupt_body: false,
            body: (0..4096u32).map(|i| (i.wrapping_mul(7) >> 3) as u8).collect(),
            body_load_address: 0x10_0000,
            bootloader_address: 0x20_0000,
            bootloader_size: 512,
            preamble_flags: 0,
        }
    }
}

fn build_keyblock(spec: &ImageSpec) -> Vec<u8> {
    let material = modulus_bytes(&RsaPublicKey::from(data_key_private()));
    let mut kb = vec![0u8; KEYBLOCK_SIZE];

    kb[..8].copy_from_slice(b"KEYBLOCK");
    put_u32(&mut kb, 8, KEYBLOCK_SIZE as u32);
    put_u32(&mut kb, 12, spec.keyblock_flags);
    // signature descriptor
    put_u32(&mut kb, 16, 344);
    put_u32(&mut kb, 20, 256);
    put_u32(&mut kb, 24, KEYBLOCK_COVERED as u32);
    // hash descriptor
    put_u32(&mut kb, 28, 312);
    put_u32(&mut kb, 32, 32);
    put_u32(&mut kb, 36, KEYBLOCK_COVERED as u32);
    // embedded data key
    put_u32(&mut kb, 40, 0);
    put_u32(&mut kb, 44, spec.data_key_version);
    put_u32(&mut kb, 48, 256);
    put_u32(&mut kb, 52, 16);
    kb[56..312].copy_from_slice(&material);

    let digest: [u8; 32] = Sha256::digest(&kb[..KEYBLOCK_COVERED]).into();
    kb[312..344].copy_from_slice(&digest);

    let sig = sign(subkey_private(), &kb[..KEYBLOCK_COVERED]);
    kb[344..600].copy_from_slice(&sig);
    if spec.corrupt_keyblock_sig {
        kb[350] ^= 0xFF;
    }
    kb
}

fn build_preamble(spec: &ImageSpec) -> Vec<u8> {
    let mut pre = vec![0u8; PREAMBLE_SIZE];

    put_u32(&mut pre, 0, PREAMBLE_SIZE as u32);
    put_u32(&mut pre, 4, spec.kernel_version);
    put_u64(&mut pre, 8, spec.body_load_address);
    put_u64(&mut pre, 16, spec.bootloader_address);
    put_u32(&mut pre, 24, spec.bootloader_size);
    put_u32(&mut pre, 28, spec.preamble_flags);
    // preamble signature descriptor
    put_u32(&mut pre, 32, 312);
    put_u32(&mut pre, 36, 256);
    put_u32(&mut pre, 40, PREAMBLE_COVERED as u32);
    // body signature descriptor
    put_u32(&mut pre, 44, 56);
    put_u32(&mut pre, 48, 256);
    put_u32(&mut pre, 52, spec.body.len() as u32);

    let body_sig = sign(data_key_private(), &spec.body);
    pre[56..312].copy_from_slice(&body_sig);

    let pre_sig = sign(data_key_private(), &pre[..PREAMBLE_COVERED]);
    pre[312..568].copy_from_slice(&pre_sig);
    pre
}

/// Assemble a padded kernel partition image from a spec.
pub fn kernel_partition(spec: &ImageSpec) -> Vec<u8> {
    let kb = build_keyblock(spec);
    let pre = build_preamble(spec);

    let mut part = Vec::new();
    part.extend_from_slice(&kb);
    part.extend_from_slice(&pre);
    part.extend_from_slice(&spec.body);
    if spec.corrupt_body {
        let off = kb.len() + pre.len();
        part[off] ^= 0xFF;
    }

    let min = part.len().max(VBLOCK_PREFIX_SIZE);
    let padded = min.div_ceil(BYTES_PER_LBA as usize) * BYTES_PER_LBA as usize;
    part.resize(padded, 0);
    part
}

/// A partition too short to yield the 64 KiB prefix.
pub fn runt_partition() -> Vec<u8> {
    vec![0u8; 8 * BYTES_PER_LBA as usize]
}

// ---------------------------------------------------------------------------
// Disk and partition table
// ---------------------------------------------------------------------------

pub struct RamDisk {
    pub data: Vec<u8>,
}

struct RamStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DiskStream for RamStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), DiskError> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(DiskError::ReadFailed {
                offset: self.pos as u64,
                len: buf.len(),
            });
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}

impl DiskAccess for RamDisk {
    fn open_stream(
        &mut self,
        start_lba: u64,
        lba_count: u64,
    ) -> Result<Box<dyn DiskStream + '_>, DiskError> {
        let start = (start_lba * BYTES_PER_LBA) as usize;
        let end = start + (lba_count * BYTES_PER_LBA) as usize;
        if end > self.data.len() {
            return Err(DiskError::OpenFailed {
                start_lba,
                lba_count,
            });
        }
        Ok(Box::new(RamStream {
            data: &self.data[start..end],
            pos: 0,
        }))
    }
}

pub struct TestTable {
    entries: Vec<KernelEntry>,
    pub bad: Vec<bool>,
    pub tried: Vec<bool>,
    pub write_backs: usize,
    cursor: usize,
    current: Option<usize>,
}

impl TestTable {
    pub fn new(entries: Vec<KernelEntry>) -> Self {
        let n = entries.len();
        Self {
            entries,
            bad: vec![false; n],
            tried: vec![false; n],
            write_backs: 0,
            cursor: 0,
            current: None,
        }
    }
}

impl PartitionTable for TestTable {
    fn next_kernel_entry(&mut self) -> Option<KernelEntry> {
        let entry = *self.entries.get(self.cursor)?;
        self.current = Some(self.cursor);
        self.cursor += 1;
        Some(entry)
    }

    fn mark_current_bad(&mut self) {
        let i = self.current.expect("no current entry");
        self.bad[i] = true;
    }

    fn mark_current_try(&mut self) {
        let i = self.current.expect("no current entry");
        self.tried[i] = true;
    }

    fn write_back(&mut self) -> Result<(), DiskError> {
        self.write_backs += 1;
        Ok(())
    }
}

pub fn test_guid(index: usize) -> Guid {
    let mut g = [0u8; 16];
    g.fill(0x40 + index as u8);
    g[0] = index as u8 + 1;
    Guid(g)
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

pub struct TestNv {
    pub dev_boot_signed_only: bool,
    pub kernel_max_rollforward: u32,
}

impl Default for TestNv {
    fn default() -> Self {
        Self {
            dev_boot_signed_only: false,
            kernel_max_rollforward: u32::MAX,
        }
    }
}

impl NvStorage for TestNv {
    fn dev_boot_signed_only(&self) -> bool {
        self.dev_boot_signed_only
    }
    fn kernel_max_rollforward(&self) -> u32 {
        self.kernel_max_rollforward
    }
}

pub struct TestSecdata(pub u32);

impl SecdataStore for TestSecdata {
    fn kernel_versions(&self) -> Result<u32, SecdataError> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct TestFwmp {
    pub enable_official_only: bool,
    pub use_dev_key_hash: bool,
    pub dev_key_hash: [u8; 32],
}

impl FwmpStore for TestFwmp {
    fn enable_official_only(&self) -> bool {
        self.enable_official_only
    }
    fn use_dev_key_hash(&self) -> bool {
        self.use_dev_key_hash
    }
    fn dev_key_hash(&self) -> [u8; 32] {
        self.dev_key_hash
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub disk: RamDisk,
    pub table: TestTable,
    pub nv: TestNv,
    pub secdata: TestSecdata,
    pub fwmp: TestFwmp,
}

/// Lay partitions out on a RAM disk, starting at LBA 64, and build the
/// matching table entries.
pub fn harness(partitions: Vec<Vec<u8>>, secured: u32) -> Harness {
    let mut data = vec![0u8; 64 * BYTES_PER_LBA as usize];
    let mut entries = Vec::new();
    for (i, part) in partitions.iter().enumerate() {
        assert_eq!(part.len() % BYTES_PER_LBA as usize, 0);
        let start_lba = data.len() as u64 / BYTES_PER_LBA;
        data.extend_from_slice(part);
        entries.push(KernelEntry {
            index: i as u32,
            start_lba,
            lba_count: part.len() as u64 / BYTES_PER_LBA,
            guid: test_guid(i),
        });
    }
    Harness {
        disk: RamDisk { data },
        table: TestTable::new(entries),
        nv: TestNv::default(),
        secdata: TestSecdata(secured),
        fwmp: TestFwmp::default(),
    }
}

pub struct RunOutcome {
    pub result: VbootResult<LoadedKernel>,
    pub kernel_signed: bool,
    pub kernel_version: u32,
}

pub fn run(h: &mut Harness, flags: BootFlags) -> RunOutcome {
    run_with_buffer(h, flags, None)
}

pub fn run_with_buffer(
    h: &mut Harness,
    flags: BootFlags,
    kernel_buffer: Option<&mut [u8]>,
) -> RunOutcome {
    let mut storage = vec![0u8; VBLOCK_PREFIX_SIZE + 64];
    let clock = NullClock;
    let mut ctx = LoadContext::new(
        flags,
        &h.nv,
        &h.secdata,
        &h.fwmp,
        &clock,
        WorkBuf::new(&mut storage),
        packed_subkey(),
    );
    let streaming_lba_count = h.disk.data.len() as u64 / BYTES_PER_LBA;
    let mut params = LoadKernelParams {
        bytes_per_lba: BYTES_PER_LBA,
        streaming_lba_count,
        gpt_lba_count: 32,
        kernel_buffer,
    };
    let result = load_kernel(&mut ctx, &mut h.disk, &mut h.table, &mut params);
    RunOutcome {
        result,
        kernel_signed: ctx.shared.kernel_signed,
        kernel_version: ctx.shared.kernel_version,
    }
}
