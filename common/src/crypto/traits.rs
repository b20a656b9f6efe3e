//! Traits representing abstractions of cryptographic functionality.

use super::*;
use crate::{vec_try, Error};
use alloc::{boxed::Box, vec::Vec};
use skm_wire::{keymaster, keymaster::Digest, KeySizeInBits, RsaExponent};

/// Combined collection of trait implementations that must be provided.
pub struct Implementation<'a> {
    /// Random number generator.
    pub rng: &'a mut dyn Rng,

    /// Wall clock, used to enforce key validity periods.
    pub clock: &'a dyn Clock,

    /// A constant-time equality implementation.
    pub compare: &'a dyn ConstTimeEq,

    /// AES implementation.
    pub aes: &'a dyn Aes,

    /// HMAC implementation.
    pub hmac: &'a dyn Hmac,

    /// RSA implementation.
    pub rsa: &'a dyn Rsa,

    /// EC implementation.
    pub ec: &'a dyn Ec,
}

/// Abstraction of a random number generator that is cryptographically secure
/// and which accepts additional entropy to be mixed in.
pub trait Rng {
    /// Add entropy to the generator's pool.
    fn add_entropy(&mut self, data: &[u8]);
    /// Generate random data.
    fn fill_bytes(&mut self, dest: &mut [u8]);
    /// Return a random `u64` value.
    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }
}

/// Abstraction of constant-time comparisons, for use in cryptographic contexts where timing attacks
/// need to be avoided.
pub trait ConstTimeEq {
    /// Indicate whether arguments are the same.
    fn eq(&self, left: &[u8], right: &[u8]) -> bool;
    /// Indicate whether arguments are the different.
    fn ne(&self, left: &[u8], right: &[u8]) -> bool {
        !self.eq(left, right)
    }
}

/// Abstraction of a wall clock.
pub trait Clock {
    /// Return the current time in milliseconds since the Unix epoch.
    fn now(&self) -> MillisecondsSinceEpoch;
}

/// Abstraction of AES functionality.
pub trait Aes {
    /// Generate an AES key.  The default implementation fills with random data.  Key generation
    /// parameters are passed in for reference, to allow for implementations that might have
    /// parameter-specific behaviour.
    fn generate_key(
        &self,
        rng: &mut dyn Rng,
        variant: aes::Variant,
        _params: &[keymaster::KeyParam],
    ) -> Result<KeyMaterial, Error> {
        Ok(match variant {
            aes::Variant::Aes128 => {
                let mut key = [0; 16];
                rng.fill_bytes(&mut key[..]);
                KeyMaterial::Aes(aes::Key::Aes128(key))
            }
            aes::Variant::Aes192 => {
                let mut key = [0; 24];
                rng.fill_bytes(&mut key[..]);
                KeyMaterial::Aes(aes::Key::Aes192(key))
            }
            aes::Variant::Aes256 => {
                let mut key = [0; 32];
                rng.fill_bytes(&mut key[..]);
                KeyMaterial::Aes(aes::Key::Aes256(key))
            }
        })
    }

    /// Import an AES key, also returning the key size in bits.  Key import parameters are passed in
    /// for reference, to allow for implementations that might have parameter-specific behaviour.
    fn import_key(
        &self,
        data: &[u8],
        _params: &[keymaster::KeyParam],
    ) -> Result<(KeyMaterial, KeySizeInBits), Error> {
        let aes_key = aes::Key::new_from(data)?;
        let key_size = aes_key.size();
        Ok((KeyMaterial::Aes(aes_key), key_size))
    }

    /// Create an AES operation.  For block mode operations with no padding
    /// ([`aes::CipherMode::EcbNoPadding`] and [`aes::CipherMode::CbcNoPadding`]) the operation
    /// implementation should reject (with [`ErrorCode::InvalidInputLength`]) input data that does
    /// not end up being a multiple of the block size.
    ///
    /// [`ErrorCode::InvalidInputLength`]: skm_wire::keymaster::ErrorCode::InvalidInputLength
    fn begin(
        &self,
        key: aes::Key,
        mode: aes::CipherMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn EmittingOperation>, Error>;

    /// Create a single-chunk AES-OCB cipher with the given tag length.
    fn ocb_chunk_cipher(
        &self,
        key: aes::Key,
        tag_len: usize,
    ) -> Result<Box<dyn ChunkCipher>, Error>;

    /// Create a chunked AES-OCB operation.  The default implementation frames the data into
    /// chunks and seals or opens each one with [`Aes::ocb_chunk_cipher`].
    fn begin_aead(
        &self,
        key: aes::Key,
        mode: aes::OcbMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn AadOperation>, Error> {
        let cipher = self.ocb_chunk_cipher(key, mode.tag_len)?;
        Ok(Box::new(ocb::ChunkedOperation::new(cipher, mode, dir)))
    }
}

/// Abstraction of HMAC functionality.
pub trait Hmac {
    /// Generate an HMAC key. Key generation parameters are passed in for reference, to allow for
    /// implementations that might have parameter-specific behaviour.
    fn generate_key(
        &self,
        rng: &mut dyn Rng,
        key_size: KeySizeInBits,
        _params: &[keymaster::KeyParam],
    ) -> Result<KeyMaterial, Error> {
        hmac::valid_size(key_size)?;

        let key_len = (key_size.0 / 8) as usize;
        let mut key = vec_try![0; key_len]?;
        rng.fill_bytes(&mut key);
        Ok(KeyMaterial::Hmac(hmac::Key::new(key)))
    }

    /// Import an HMAC key, also returning the key size in bits. Key import parameters are passed in
    /// for reference, to allow for implementations that might have parameter-specific behaviour.
    fn import_key(
        &self,
        data: &[u8],
        _params: &[keymaster::KeyParam],
    ) -> Result<(KeyMaterial, KeySizeInBits), Error> {
        let hmac_key = hmac::Key::new_from(data)?;
        let key_size = hmac_key.size();
        hmac::valid_size(key_size)?;
        Ok((KeyMaterial::Hmac(hmac_key), key_size))
    }

    /// Create an HMAC operation. Implementations can assume that `digest` will not be
    /// [`Digest::None`] or [`Digest::Md5`].
    fn begin(&self, key: hmac::Key, digest: Digest)
        -> Result<Box<dyn AccumulatingOperation>, Error>;
}

/// Abstraction of RSA functionality.
pub trait Rsa {
    /// Generate an RSA key. Key generation parameters are passed in for reference, to allow for
    /// implementations that might have parameter-specific behaviour.
    fn generate_key(
        &self,
        rng: &mut dyn Rng,
        key_size: KeySizeInBits,
        pub_exponent: RsaExponent,
        params: &[keymaster::KeyParam],
    ) -> Result<KeyMaterial, Error>;

    /// Import an RSA key in PKCS#8 format, also returning the key size in bits and public exponent.
    /// Key import parameters are passed in for reference, to allow for implementations that might
    /// have parameter-specific behaviour.
    fn import_pkcs8_key(
        &self,
        data: &[u8],
        _params: &[keymaster::KeyParam],
    ) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error> {
        rsa::import_pkcs8_key(data)
    }

    /// Create an RSA encryption operation, using the public half of `key`.  The implementation
    /// should reject (with [`ErrorCode::InvalidInputLength`]) accumulated input that is too long
    /// for the key size and padding.
    ///
    /// [`ErrorCode::InvalidInputLength`]: skm_wire::keymaster::ErrorCode::InvalidInputLength
    fn begin_encrypt(
        &self,
        key: rsa::Key,
        mode: rsa::EncryptionMode,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// Create an RSA decryption operation.
    fn begin_decrypt(
        &self,
        key: rsa::Key,
        mode: rsa::EncryptionMode,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// Create an RSA signing operation.
    fn begin_sign(
        &self,
        key: rsa::Key,
        mode: rsa::SignMode,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// Create an RSA signature verification operation.
    fn begin_verify(
        &self,
        key: rsa::Key,
        mode: rsa::SignMode,
    ) -> Result<Box<dyn VerifyingOperation>, Error>;
}

/// Abstraction of EC functionality.
pub trait Ec {
    /// Generate an EC key for a NIST curve.  Key generation parameters are passed in for reference,
    /// to allow for implementations that might have parameter-specific behaviour.
    fn generate_nist_key(
        &self,
        rng: &mut dyn Rng,
        curve: ec::NistCurve,
        params: &[keymaster::KeyParam],
    ) -> Result<KeyMaterial, Error>;

    /// Import an EC key in PKCS#8 format.  Key import parameters are passed in for reference, to
    /// allow for implementations that might have parameter-specific behaviour.
    fn import_pkcs8_key(
        &self,
        data: &[u8],
        _params: &[keymaster::KeyParam],
    ) -> Result<KeyMaterial, Error> {
        ec::import_pkcs8_key(data)
    }

    /// Return the public key data that corresponds to the provided private `key`, as a SEC-1
    /// encoded uncompressed point.
    fn nist_public_key(&self, key: &ec::NistKey, curve: ec::NistCurve) -> Result<Vec<u8>, Error>;

    /// Create an ECDSA signing operation.  Accumulated input longer than the curve's coordinate
    /// size is truncated before signing; the signature is a DER-encoded `ECDSA-Sig-Value`.
    fn begin_sign(
        &self,
        key: ec::NistKey,
        curve: ec::NistCurve,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// Create an ECDSA signature verification operation.
    fn begin_verify(
        &self,
        key: ec::NistKey,
        curve: ec::NistCurve,
    ) -> Result<Box<dyn VerifyingOperation>, Error>;
}

/// Abstraction of a single-chunk AEAD cipher.
pub trait ChunkCipher {
    /// Encrypt and authenticate `plaintext`, returning the ciphertext followed by the tag.
    fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Authenticate and decrypt `data`, which holds ciphertext followed by the tag.  A tag
    /// mismatch is reported as [`ErrorCode::VerificationFailed`].
    ///
    /// [`ErrorCode::VerificationFailed`]: skm_wire::keymaster::ErrorCode::VerificationFailed
    fn open(&self, nonce: &[u8], aad: &[u8], data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Abstraction of an in-progress operation that emits data as it progresses.
pub trait EmittingOperation {
    /// Update operation with data.
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Complete operation, consuming `self`.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error>;
}

/// Abstraction of an in-progress operation that has authenticated associated data.
pub trait AadOperation: EmittingOperation {
    /// Set the associated data that applies to data processed from now on.
    fn update_aad(&mut self, aad: &[u8]) -> Result<(), Error>;
}

/// Abstraction of an in-progress operation that only emits data when it completes.
pub trait AccumulatingOperation {
    /// Update operation with data.
    fn update(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Complete operation, consuming `self`.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error>;
}

/// Abstraction of an in-progress signature verification.
pub trait VerifyingOperation {
    /// Update operation with message data.
    fn update(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Complete operation, consuming `self`.  Fails with
    /// [`ErrorCode::VerificationFailed`] if `signature` does not match the accumulated message.
    ///
    /// [`ErrorCode::VerificationFailed`]: skm_wire::keymaster::ErrorCode::VerificationFailed
    fn finish(self: Box<Self>, signature: &[u8]) -> Result<(), Error>;
}
