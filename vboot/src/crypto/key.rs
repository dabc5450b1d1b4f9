//! Packed public keys and signature descriptors
//!
//! A packed key is a small fixed header followed by the big-endian RSA
//! modulus (public exponent fixed at 65537). The header's algorithm field
//! selects the RSA size / digest combination; dispatch is a closed enum, not
//! runtime polymorphism. Unpacking validates every size field before the
//! modulus reaches the RSA backend.

use core::mem;

use log::debug;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256, Sha512};

use crate::error::KeyError;

/// Largest modulus any supported algorithm carries, in bits.
const MAX_RSA_MODULUS_BITS: usize = 8192;

/// RSA public exponent used by every packed key.
const RSA_EXPONENT: u32 = 65537;

/// Signature (or digest) placement descriptor.
///
/// Offsets are relative to the start of the structure that embeds this
/// descriptor. The covered region is always that structure's first
/// `data_size` bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SigHeader {
    pub sig_offset: u32,
    pub sig_size: u32,
    pub data_size: u32,
}

impl SigHeader {
    pub const SIZE: usize = mem::size_of::<Self>();

    /// The signature bytes inside `container`, or `None` when the
    /// descriptor reaches outside it.
    pub fn signature<'b>(&self, container: &'b [u8]) -> Option<&'b [u8]> {
        let start = self.sig_offset as usize;
        let end = start.checked_add(self.sig_size as usize)?;
        container.get(start..end)
    }

    /// The covered region: the first `data_size` bytes of `container`.
    pub fn signed_region<'b>(&self, container: &'b [u8]) -> Option<&'b [u8]> {
        container.get(..self.data_size as usize)
    }
}

/// Fixed header of a packed public key.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PackedKeyHeader {
    pub algorithm: u32,
    pub key_version: u32,
    pub key_size: u32,
    pub key_offset: u32,
}

impl PackedKeyHeader {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn read_from(buf: &[u8]) -> Result<Self, KeyError> {
        if buf.len() < Self::SIZE {
            return Err(KeyError::Header);
        }
        // SAFETY: the bounds check above guarantees SIZE readable bytes,
        // the struct is repr(C) with only integer fields (every byte
        // pattern is a valid value), and read_unaligned places no alignment
        // requirement on the source pointer.
        Ok(unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Self) })
    }

    /// Raw key material (the modulus bytes), bounds-checked against the
    /// containing buffer. `buf` starts at this header.
    pub fn material<'b>(&self, buf: &'b [u8]) -> Result<&'b [u8], KeyError> {
        let start = self.key_offset as usize;
        let end = start
            .checked_add(self.key_size as usize)
            .ok_or(KeyError::Bounds {
                key_offset: self.key_offset,
                key_size: self.key_size,
            })?;
        buf.get(start..end).ok_or(KeyError::Bounds {
            key_offset: self.key_offset,
            key_size: self.key_size,
        })
    }
}

/// Supported signature algorithm / digest combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa2048Sha256 = 0,
    Rsa4096Sha256 = 1,
    Rsa8192Sha512 = 2,
}

impl KeyAlgorithm {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Rsa2048Sha256),
            1 => Some(Self::Rsa4096Sha256),
            2 => Some(Self::Rsa8192Sha512),
            _ => None,
        }
    }

    /// Modulus length in bytes; also the signature length.
    pub fn modulus_size(self) -> usize {
        match self {
            Self::Rsa2048Sha256 => 256,
            Self::Rsa4096Sha256 => 512,
            Self::Rsa8192Sha512 => 1024,
        }
    }

    pub fn signature_size(self) -> usize {
        self.modulus_size()
    }
}

/// An unpacked, validated verification key.
#[derive(Debug)]
pub struct DataKey {
    algorithm: KeyAlgorithm,
    key_version: u32,
    key: RsaPublicKey,
    hw_crypto: bool,
}

impl DataKey {
    /// Unpack a key from a buffer beginning with a [`PackedKeyHeader`].
    ///
    /// `allow_hw_crypto` is recorded on the key; it selects no different
    /// verification behavior in this core.
    pub fn unpack(buf: &[u8], allow_hw_crypto: bool) -> Result<Self, KeyError> {
        let header = PackedKeyHeader::read_from(buf)?;

        if header.key_version > 0xFFFF {
            return Err(KeyError::VersionRange {
                key_version: header.key_version,
            });
        }

        let algorithm =
            KeyAlgorithm::from_id(header.algorithm).ok_or(KeyError::Algorithm {
                algorithm: header.algorithm,
            })?;

        let material = header.material(buf)?;
        if material.len() != algorithm.modulus_size() {
            return Err(KeyError::MaterialSize {
                key_size: header.key_size,
                expected: algorithm.modulus_size() as u32,
            });
        }

        let key = RsaPublicKey::new_with_max_size(
            BigUint::from_bytes_be(material),
            BigUint::from(RSA_EXPONENT),
            MAX_RSA_MODULUS_BITS,
        )
        .map_err(|_| KeyError::BadModulus)?;

        if allow_hw_crypto {
            debug!(
                "hardware crypto allowed for {:?} key v{}; software path in use",
                algorithm, header.key_version
            );
        }

        Ok(Self {
            algorithm,
            key_version: header.key_version,
            key,
            hw_crypto: allow_hw_crypto,
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    pub fn hw_crypto_allowed(&self) -> bool {
        self.hw_crypto
    }

    /// Verify `sig` over `data` under this key. Returns false on any
    /// mismatch, including a wrong-length signature.
    pub fn verify_data(&self, data: &[u8], sig: &[u8]) -> bool {
        if sig.len() != self.algorithm.signature_size() {
            return false;
        }
        match self.algorithm {
            KeyAlgorithm::Rsa2048Sha256 | KeyAlgorithm::Rsa4096Sha256 => {
                let digest = Sha256::digest(data);
                self.key
                    .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, sig)
                    .is_ok()
            }
            KeyAlgorithm::Rsa8192Sha512 => {
                let digest = Sha512::digest(data);
                self.key
                    .verify(Pkcs1v15Sign::new::<Sha512>(), &digest, sig)
                    .is_ok()
            }
        }
    }
}
