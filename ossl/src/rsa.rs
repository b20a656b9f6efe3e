use crate::{openssl_err, ossl, required_digest};
use alloc::boxed::Box;
use alloc::vec::Vec;
use log::warn;
use openssl::bn::{BigNum, BigNumContext, BigNumRef};
use openssl::hash::Hasher;
use openssl::md::{Md, MdRef};
use openssl::pkey::{PKey, Private};
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::Padding;
use openssl::sign::RsaPssSaltlen;
use skm_common::crypto::rsa::{pss_salt_len, zero_pad_left, EncryptionMode, SignMode};
use skm_common::{crypto, km_err, try_to_vec, vec_try, Error, FallibleAllocExt};
use skm_wire::{keymaster, keymaster::Digest, KeySizeInBits, RsaExponent};

/// Smallest key size that OpenSSL's own key generation will produce.
const MIN_OPENSSL_KEYGEN_BITS: u32 = 512;

/// Number of prime pairs to try before giving up on generating a small key.
const MAX_SMALL_KEYGEN_ATTEMPTS: usize = 100;

/// [`crypto::Rsa`] implementation based on OpenSSL.
#[derive(Default)]
pub struct OpenSslRsa;

impl crypto::Rsa for OpenSslRsa {
    fn generate_key(
        &self,
        _rng: &mut dyn crypto::Rng,
        key_size: KeySizeInBits,
        pub_exponent: RsaExponent,
        _params: &[keymaster::KeyParam],
    ) -> Result<crypto::KeyMaterial, Error> {
        crypto::rsa::check_generation_params(key_size, pub_exponent)?;
        let exponent = BigNum::from_slice(&pub_exponent.0.to_be_bytes()[..])
            .map_err(openssl_err!("failed to create BigNum for exponent {:?}", pub_exponent))?;

        let rsa_key = if key_size.0 < MIN_OPENSSL_KEYGEN_BITS {
            generate_small_key(key_size.0, &exponent)?
        } else {
            openssl::rsa::Rsa::generate_with_e(key_size.0, &exponent).map_err(openssl_err!(
                "failed to generate RSA key size {:?} exponent {:?}",
                key_size,
                pub_exponent
            ))?
        };
        let asn1_data = ossl!(rsa_key.private_key_to_der())?;
        Ok(crypto::KeyMaterial::Rsa(crypto::rsa::Key(asn1_data)))
    }

    fn begin_encrypt(
        &self,
        key: crypto::rsa::Key,
        mode: EncryptionMode,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let rsa_key = ossl!(openssl::rsa::Rsa::private_key_from_der(&key.0))?;
        Ok(Box::new(OpenSslRsaCipherOperation {
            rsa_key,
            mode,
            dir: crypto::SymmetricOperation::Encrypt,
            pending_input: Vec::new(),
        }))
    }

    fn begin_decrypt(
        &self,
        key: crypto::rsa::Key,
        mode: EncryptionMode,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let rsa_key = ossl!(openssl::rsa::Rsa::private_key_from_der(&key.0))?;
        Ok(Box::new(OpenSslRsaCipherOperation {
            rsa_key,
            mode,
            dir: crypto::SymmetricOperation::Decrypt,
            pending_input: Vec::new(),
        }))
    }

    fn begin_sign(
        &self,
        key: crypto::rsa::Key,
        mode: SignMode,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        Ok(Box::new(OpenSslRsaSignOperation { inner: SignatureState::new(key, mode)? }))
    }

    fn begin_verify(
        &self,
        key: crypto::rsa::Key,
        mode: SignMode,
    ) -> Result<Box<dyn crypto::VerifyingOperation>, Error> {
        Ok(Box::new(OpenSslRsaVerifyOperation { inner: SignatureState::new(key, mode)? }))
    }
}

/// Generate an RSA key below the size that OpenSSL is willing to generate, by building it from
/// a pair of random primes of half the size.
fn generate_small_key(bits: u32, e: &BigNumRef) -> Result<openssl::rsa::Rsa<Private>, Error> {
    let half_bits = (bits / 2) as i32;
    let one = ossl!(BigNum::from_u32(1))?;
    let mut ctx = ossl!(BigNumContext::new())?;
    for _ in 0..MAX_SMALL_KEYGEN_ATTEMPTS {
        // The top two bits of each prime are set, so the modulus has exactly `bits` bits.
        let mut p = ossl!(BigNum::new())?;
        ossl!(p.generate_prime(half_bits, false, None, None))?;
        let mut q = ossl!(BigNum::new())?;
        ossl!(q.generate_prime(half_bits, false, None, None))?;
        if p == q {
            continue;
        }

        let mut p1 = ossl!(BigNum::new())?;
        ossl!(p1.checked_sub(&p, &one))?;
        let mut q1 = ossl!(BigNum::new())?;
        ossl!(q1.checked_sub(&q, &one))?;
        let mut phi = ossl!(BigNum::new())?;
        ossl!(phi.checked_mul(&p1, &q1, &mut ctx))?;
        let mut gcd = ossl!(BigNum::new())?;
        ossl!(gcd.gcd(e, &phi, &mut ctx))?;
        if gcd != one {
            continue;
        }

        let mut n = ossl!(BigNum::new())?;
        ossl!(n.checked_mul(&p, &q, &mut ctx))?;
        if n.num_bits() != bits as i32 {
            continue;
        }
        let mut d = ossl!(BigNum::new())?;
        ossl!(d.mod_inverse(e, &phi, &mut ctx))?;
        let mut dmp1 = ossl!(BigNum::new())?;
        ossl!(dmp1.checked_rem(&d, &p1, &mut ctx))?;
        let mut dmq1 = ossl!(BigNum::new())?;
        ossl!(dmq1.checked_rem(&d, &q1, &mut ctx))?;
        let mut iqmp = ossl!(BigNum::new())?;
        ossl!(iqmp.mod_inverse(&q, &p, &mut ctx))?;

        let e = ossl!(e.to_owned())?;
        return ossl!(openssl::rsa::Rsa::from_private_components(
            n, e, d, p, q, dmp1, dmq1, iqmp
        ));
    }
    Err(km_err!(UnknownError, "failed to generate {}-bit RSA key", bits))
}

/// RSA encryption or decryption based on OpenSSL.  Input is accumulated and processed in one go
/// at the end.
pub struct OpenSslRsaCipherOperation {
    rsa_key: openssl::rsa::Rsa<Private>,
    mode: EncryptionMode,
    dir: crypto::SymmetricOperation,
    pending_input: Vec<u8>,
}

impl OpenSslRsaCipherOperation {
    fn padding(&self) -> Padding {
        match self.mode {
            EncryptionMode::OaepSha1 => Padding::PKCS1_OAEP,
            EncryptionMode::Pkcs1_1_5Padding => Padding::PKCS1,
        }
    }
}

impl crypto::AccumulatingOperation for OpenSslRsaCipherOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let key_len = self.rsa_key.size() as usize;
        let mut output = vec_try![0; key_len]?;
        let out_len = match self.dir {
            crypto::SymmetricOperation::Encrypt => {
                let max_len = self.mode.max_input_len(key_len);
                if self.pending_input.len() > max_len {
                    return Err(km_err!(
                        InvalidInputLength,
                        "{} bytes of input too long for {:?} with {} byte key (max {})",
                        self.pending_input.len(),
                        self.mode,
                        key_len,
                        max_len
                    ));
                }
                self.rsa_key
                    .public_encrypt(&self.pending_input, &mut output, self.padding())
                    .map_err(openssl_err!("RSA encryption with {:?} failed", self.mode))?
            }
            crypto::SymmetricOperation::Decrypt => {
                if self.pending_input.len() > key_len {
                    return Err(km_err!(
                        InvalidInputLength,
                        "{} bytes of ciphertext too long for {} byte key",
                        self.pending_input.len(),
                        key_len
                    ));
                }
                self.rsa_key
                    .private_decrypt(&self.pending_input, &mut output, self.padding())
                    .map_err(openssl_err!("RSA decryption with {:?} failed", self.mode))?
            }
        };
        output.truncate(out_len);
        Ok(output)
    }
}

/// Message data for a signature operation: either the raw message or a running digest of it.
enum MessageInput {
    Raw(Vec<u8>),
    Digested(Hasher),
}

/// State shared between RSA signing and verification.
struct SignatureState {
    rsa_key: openssl::rsa::Rsa<Private>,
    mode: SignMode,
    input: MessageInput,
}

impl SignatureState {
    fn new(key: crypto::rsa::Key, mode: SignMode) -> Result<Self, Error> {
        let rsa_key = ossl!(openssl::rsa::Rsa::private_key_from_der(&key.0))?;
        let input = match mode.digest() {
            Digest::None => MessageInput::Raw(Vec::new()),
            digest => MessageInput::Digested(ossl!(Hasher::new(required_digest(digest)?))?),
        };
        Ok(Self { rsa_key, mode, input })
    }

    fn key_len(&self) -> usize {
        self.rsa_key.size() as usize
    }

    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        match &mut self.input {
            MessageInput::Raw(pending) => pending.try_extend_from_slice(data)?,
            MessageInput::Digested(hasher) => ossl!(hasher.update(data))?,
        }
        Ok(())
    }

    /// Return the data that gets padded and signed: the message itself, or its digest.
    fn take_data(&mut self) -> Result<Vec<u8>, Error> {
        match &mut self.input {
            MessageInput::Raw(pending) => Ok(core::mem::take(pending)),
            MessageInput::Digested(hasher) => {
                let digest = ossl!(hasher.finish())?;
                try_to_vec(&digest[..])
            }
        }
    }

    /// Build the full-width block used with unpadded RSA.
    fn unpadded_block(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let key_len = self.key_len();
        match self.mode.digest() {
            Digest::None if data.len() != key_len => Err(km_err!(
                UnknownError,
                "unpadded RSA needs exactly {} bytes of input, got {}",
                key_len,
                data.len()
            )),
            Digest::None => try_to_vec(data),
            _ => zero_pad_left(data, key_len).map_err(|_e| {
                let len = data.len();
                km_err!(UnknownError, "{} byte digest too long for {} byte key", len, key_len)
            }),
        }
    }

    /// Build a context for PSS signing or verification of a digest of `digest_len` bytes.  Fails
    /// with `IncompatibleDigest` if the key is too small for the digest.
    fn pss_context(&self, digest_len: usize, sign: bool) -> Result<PkeyCtx<Private>, Error> {
        let salt_len = pss_salt_len(digest_len, self.key_len())?;
        let salt_len = libc::c_int::try_from(salt_len)
            .map_err(|_e| km_err!(UnknownError, "PSS salt length {} out of range", salt_len))?;
        let pkey = ossl!(PKey::from_rsa(self.rsa_key.clone()))?;
        let mut ctx = ossl!(PkeyCtx::new(&pkey))?;
        if sign {
            ossl!(ctx.sign_init())?;
        } else {
            ossl!(ctx.verify_init())?;
        }
        ossl!(ctx.set_rsa_padding(Padding::PKCS1_PSS))?;
        ossl!(ctx.set_signature_md(pss_digest(self.mode.digest())?))?;
        ossl!(ctx.set_rsa_pss_saltlen(RsaPssSaltlen::custom(salt_len)))?;
        Ok(ctx)
    }
}

/// Translate a [`Digest`] into the OpenSSL digest used for PSS encoding.
fn pss_digest(digest: Digest) -> Result<&'static MdRef, Error> {
    match digest {
        Digest::Sha1 => Ok(Md::sha1()),
        Digest::Sha224 => Ok(Md::sha224()),
        Digest::Sha256 => Ok(Md::sha256()),
        Digest::Sha384 => Ok(Md::sha384()),
        Digest::Sha512 => Ok(Md::sha512()),
        d => Err(km_err!(UnsupportedDigest, "digest {:?} not supported for PSS", d)),
    }
}

/// RSA signing based on OpenSSL.
///
/// PKCS#1 v1.5 padding is applied directly to the digest (or message), without a `DigestInfo`
/// prefix.
pub struct OpenSslRsaSignOperation {
    inner: SignatureState,
}

impl crypto::AccumulatingOperation for OpenSslRsaSignOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.inner.update(data)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        let data = self.inner.take_data()?;
        let state = &self.inner;
        match state.mode {
            SignMode::NoPadding(_) => {
                let block = state.unpadded_block(&data)?;
                private_encrypt(&state.rsa_key, &block, Padding::NONE)
            }
            SignMode::Pkcs1_1_5Padding(_) => {
                private_encrypt(&state.rsa_key, &data, Padding::PKCS1)
            }
            SignMode::PssPadding(_) => {
                let mut ctx = state.pss_context(data.len(), true)?;
                let mut sig = Vec::new();
                ossl!(ctx.sign_to_vec(&data, &mut sig))?;
                Ok(sig)
            }
        }
    }
}

/// RSA signature verification based on OpenSSL.
pub struct OpenSslRsaVerifyOperation {
    inner: SignatureState,
}

impl crypto::VerifyingOperation for OpenSslRsaVerifyOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.inner.update(data)
    }

    fn finish(mut self: Box<Self>, signature: &[u8]) -> Result<(), Error> {
        let data = self.inner.take_data()?;
        let state = &self.inner;
        let key_len = state.key_len();
        let verified = if signature.len() != key_len {
            warn!("RSA signature of {} bytes for {} byte key", signature.len(), key_len);
            false
        } else {
            match state.mode {
                SignMode::NoPadding(_) => match state.unpadded_block(&data) {
                    Ok(expected) => {
                        recovers_to(&state.rsa_key, signature, &expected, Padding::NONE)?
                    }
                    Err(_) => false,
                },
                SignMode::Pkcs1_1_5Padding(_) => {
                    recovers_to(&state.rsa_key, signature, &data, Padding::PKCS1)?
                }
                SignMode::PssPadding(_) => {
                    let mut ctx = state.pss_context(data.len(), false)?;
                    // Malformed signatures leave errors on the OpenSSL stack.
                    ctx.verify(&data, signature).unwrap_or(false)
                }
            }
        };
        if verified {
            Ok(())
        } else {
            Err(km_err!(VerificationFailed, "RSA signature mismatch for {:?}", state.mode))
        }
    }
}

/// Apply the private key to `data` with the given padding.
fn private_encrypt(
    rsa_key: &openssl::rsa::Rsa<Private>,
    data: &[u8],
    padding: Padding,
) -> Result<Vec<u8>, Error> {
    let mut sig = vec_try![0; rsa_key.size() as usize]?;
    let sig_len = rsa_key
        .private_encrypt(data, &mut sig, padding)
        .map_err(openssl_err!("RSA signing of {} bytes failed", data.len()))?;
    sig.truncate(sig_len);
    Ok(sig)
}

/// Indicate whether applying the public key to `signature` gives `expected`.
fn recovers_to(
    rsa_key: &openssl::rsa::Rsa<Private>,
    signature: &[u8],
    expected: &[u8],
    padding: Padding,
) -> Result<bool, Error> {
    let mut recovered = vec_try![0; rsa_key.size() as usize]?;
    match rsa_key.public_decrypt(signature, &mut recovered, padding) {
        Ok(len) => {
            recovered.truncate(len);
            Ok(recovered.len() == expected.len() && openssl::memcmp::eq(&recovered, expected))
        }
        Err(e) => {
            warn!("RSA signature recovery failed: {:?}", e);
            Ok(false)
        }
    }
}
