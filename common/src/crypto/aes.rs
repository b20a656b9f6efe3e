//! Functionality related to AES encryption

use crate::{km_err, wire::KeySizeInBits, Error};
use alloc::vec::Vec;
use core::convert::TryInto;

/// Size of an AES block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Size of AES-OCB nonce in bytes.
pub const OCB_NONCE_SIZE: usize = 12; // 96 bits

/// Size of the AES-OCB tag in bytes; the only tag length accepted.
pub const OCB_TAG_SIZE: usize = 16;

/// AES variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Aes128,
    Aes192,
    Aes256,
}

impl TryFrom<KeySizeInBits> for Variant {
    type Error = Error;
    fn try_from(size: KeySizeInBits) -> Result<Self, Error> {
        match size.0 {
            128 => Ok(Variant::Aes128),
            192 => Ok(Variant::Aes192),
            256 => Ok(Variant::Aes256),
            s => Err(km_err!(UnsupportedKeySize, "AES key size {} not one of 128/192/256", s)),
        }
    }
}

/// An AES-128, AES-192 or AES-256 key.
#[derive(Clone, PartialEq, Eq)]
pub enum Key {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl Key {
    /// Create a new [`Key`] from raw data, which must be 16, 24 or 32 bytes long.
    pub fn new(data: Vec<u8>) -> Result<Self, Error> {
        Self::new_from(&data)
    }

    /// Create a new [`Key`] from raw data, which must be 16, 24 or 32 bytes long.
    pub fn new_from(data: &[u8]) -> Result<Self, Error> {
        let len_err =
            |l| km_err!(UnsupportedKeySize, "AES keys must be 16, 24 or 32 bytes not {}", l);
        match data.len() {
            16 => Ok(Key::Aes128(data.try_into().map_err(|_e| len_err(16))?)),
            24 => Ok(Key::Aes192(data.try_into().map_err(|_e| len_err(24))?)),
            32 => Ok(Key::Aes256(data.try_into().map_err(|_e| len_err(32))?)),
            l => Err(len_err(l)),
        }
    }

    /// Indicate the size of the key in bits.
    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits(match self {
            Key::Aes128(_) => 128,
            Key::Aes192(_) => 192,
            Key::Aes256(_) => 256,
        })
    }

    /// Return the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Key::Aes128(k) => &k[..],
            Key::Aes192(k) => &k[..],
            Key::Aes256(k) => &k[..],
        }
    }
}

/// Mode of AES plain cipher operation.  Associated value is the nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherMode {
    EcbNoPadding,
    EcbPkcs7Padding,
    CbcNoPadding { nonce: [u8; BLOCK_SIZE] },
    CbcPkcs7Padding { nonce: [u8; BLOCK_SIZE] },
}

impl CipherMode {
    /// Indicate whether the mode pads its input.
    pub fn is_padded(&self) -> bool {
        matches!(self, CipherMode::EcbPkcs7Padding | CipherMode::CbcPkcs7Padding { .. })
    }
}

/// Parameters of a chunked AES-OCB operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OcbMode {
    /// Nonce for the first chunk; later chunks increment it.
    pub nonce: [u8; OCB_NONCE_SIZE],
    /// Plaintext size of every chunk but the last.
    pub chunk_len: usize,
    /// Tag size appended to each chunk.
    pub tag_len: usize,
}

impl OcbMode {
    /// Build the mode, checking the nonce size and chunk length.
    pub fn new(nonce: &[u8], chunk_len: usize) -> Result<Self, Error> {
        let nonce: [u8; OCB_NONCE_SIZE] = nonce.try_into().map_err(|_e| {
            km_err!(
                InvalidArgument,
                "want {} byte nonce for AES-OCB, got {}",
                OCB_NONCE_SIZE,
                nonce.len()
            )
        })?;
        if chunk_len == 0 {
            return Err(km_err!(InvalidArgument, "zero chunk length for AES-OCB"));
        }
        Ok(OcbMode { nonce, chunk_len, tag_len: OCB_TAG_SIZE })
    }
}

/// Mode of AES operation, as resolved at operation start.  The nonce for CBC is either the
/// caller's or is generated (encrypt) or read from the start of the input (decrypt) later on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Ecb { pkcs7: bool },
    Cbc { pkcs7: bool, nonce: Option<[u8; BLOCK_SIZE]> },
    Ocb { chunk_len: usize, nonce: Option<[u8; OCB_NONCE_SIZE]> },
}

impl Mode {
    /// Build the [`CipherMode`] for a non-AEAD mode once the IV is known.
    pub fn cipher_mode(&self, iv: Option<[u8; BLOCK_SIZE]>) -> Result<CipherMode, Error> {
        match (self, iv) {
            (Mode::Ecb { pkcs7: false }, _) => Ok(CipherMode::EcbNoPadding),
            (Mode::Ecb { pkcs7: true }, _) => Ok(CipherMode::EcbPkcs7Padding),
            (Mode::Cbc { pkcs7: false, .. }, Some(nonce)) => {
                Ok(CipherMode::CbcNoPadding { nonce })
            }
            (Mode::Cbc { pkcs7: true, .. }, Some(nonce)) => {
                Ok(CipherMode::CbcPkcs7Padding { nonce })
            }
            (Mode::Cbc { .. }, None) => Err(km_err!(UnknownError, "no IV available for AES-CBC")),
            (Mode::Ocb { .. }, _) => Err(km_err!(UnknownError, "AES-OCB is not a plain cipher")),
        }
    }
}
