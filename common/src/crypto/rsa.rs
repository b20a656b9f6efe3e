//! Functionality related to RSA.

use super::KeyMaterial;
use crate::{
    km_err,
    wire::keymaster::{Digest, PaddingMode},
    wire::{KeySizeInBits, RsaExponent},
    Error,
};
use alloc::vec::Vec;
use der::{asn1::BitStringRef, AnyRef, Decode, Encode};
use pkcs1::RsaPrivateKey;
use spki::{AlgorithmIdentifier, SubjectPublicKeyInfoRef};
use zeroize::ZeroizeOnDrop;

/// Overhead for PKCS#1 v1.5 encryption padding.
pub const PKCS1_ENCRYPTION_PADDING_OVERHEAD: usize = 11;

/// Overhead for OAEP encryption padding with SHA-1 (`2 * 20 + 2`).
pub const OAEP_SHA1_PADDING_OVERHEAD: usize = 42;

/// Minimum overhead for PSS padding on top of the digest length.
pub const PSS_MIN_OVERHEAD: usize = 10;

/// Default public exponent (F4).
pub const DEFAULT_EXPONENT: RsaExponent = RsaExponent(65537);

/// Default key size.
pub const DEFAULT_KEY_SIZE: KeySizeInBits = KeySizeInBits(2048);

/// Smallest key size accepted for generation.
pub const MIN_KEY_SIZE_BITS: u32 = 256;

/// Largest key size accepted for generation.
pub const MAX_KEY_SIZE_BITS: u32 = 4096;

/// OID value for PKCS#1-encoded RSA keys held in PKCS#8 and X.509; see RFC 3447 A.1.
pub const X509_OID: pkcs8::ObjectIdentifier =
    pkcs8::ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// An RSA key, in the form of an ASN.1 DER encoding of an PKCS#1 `RSAPrivateKey` structure,
/// as specified by RFC 3447 sections A.1.2 and 3.2:
///
/// ```asn1
/// RSAPrivateKey ::= SEQUENCE {
///     version           Version,
///     modulus           INTEGER,  -- n
///     publicExponent    INTEGER,  -- e
///     privateExponent   INTEGER,  -- d
///     prime1            INTEGER,  -- p
///     prime2            INTEGER,  -- q
///     exponent1         INTEGER,  -- d mod (p-1)
///     exponent2         INTEGER,  -- d mod (q-1)
///     coefficient       INTEGER,  -- (inverse of q) mod p
///     otherPrimeInfos   OtherPrimeInfos OPTIONAL
/// }
/// ```
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

impl Key {
    /// Return the public key information as an ASN.1 DER encoded `SubjectPublicKeyInfo`, as
    /// described in RFC 5280 section 4.1.
    ///
    /// ```asn1
    /// SubjectPublicKeyInfo  ::=  SEQUENCE  {
    ///    algorithm            AlgorithmIdentifier,
    ///    subjectPublicKey     BIT STRING  }
    ///
    /// AlgorithmIdentifier  ::=  SEQUENCE  {
    ///    algorithm               OBJECT IDENTIFIER,
    ///    parameters              ANY DEFINED BY algorithm OPTIONAL  }
    /// ```
    ///
    /// For RSA keys, the contents are described in RFC 3279 section 2.3.1.
    ///
    /// - The `AlgorithmIdentifier` has an algorithm OID of 1.2.840.113549.1.1.1.
    /// - The `AlgorithmIdentifier` has `NULL` parameters.
    /// - The `subjectPublicKey` bit string holds an ASN.1 DER-encoded `SEQUENCE`:
    ///     ```asn1
    ///     RSAPublicKey ::= SEQUENCE {
    ///        modulus            INTEGER,    -- n
    ///        publicExponent     INTEGER  }  -- e
    ///     ```
    pub fn subject_public_key_info(&self) -> Result<Vec<u8>, Error> {
        let rsa_pvt_key = RsaPrivateKey::from_der(self.0.as_slice())?;
        let pub_key = rsa_pvt_key.public_key().to_der()?;
        let spki = SubjectPublicKeyInfoRef {
            algorithm: AlgorithmIdentifier { oid: X509_OID, parameters: Some(AnyRef::NULL) },
            subject_public_key: BitStringRef::from_bytes(&pub_key)?,
        };
        Ok(spki.to_der()?)
    }

    /// Size of the key in bytes, i.e. the length of the modulus.
    pub fn size(&self) -> Result<usize, Error> {
        let (bits, _exponent) = key_params(&self.0)?;
        Ok((bits.0 as usize + 7) / 8)
    }
}

/// Determine the modulus size in bits and the public exponent of a DER-encoded
/// `RSAPrivateKey`.
pub fn key_params(der_key: &[u8]) -> Result<(KeySizeInBits, RsaExponent), Error> {
    let key = RsaPrivateKey::from_der(der_key)?;
    let modulus = key.modulus.as_bytes();
    let bits = match modulus.first() {
        Some(top) => (modulus.len() - 1) * 8 + (8 - top.leading_zeros() as usize),
        None => return Err(km_err!(InvalidArgument, "empty RSA modulus")),
    };
    let exponent = key.public_exponent.as_bytes();
    if exponent.len() > 8 {
        return Err(km_err!(UnsupportedKeySize, "RSA exponent of {} bytes", exponent.len()));
    }
    let exponent = exponent.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    Ok((KeySizeInBits(bits as u32), RsaExponent(exponent)))
}

/// Import an RSA key in PKCS#8 format, also returning the key size in bits and public exponent.
pub fn import_pkcs8_key(data: &[u8]) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error> {
    let key_info = pkcs8::PrivateKeyInfo::try_from(data)
        .map_err(|e| km_err!(InvalidArgument, "failed to parse PKCS#8 RSA key: {:?}", e))?;
    if key_info.algorithm.oid != X509_OID {
        return Err(km_err!(
            ImportParameterMismatch,
            "unexpected OID {:?} for PKCS#8 RSA key import",
            key_info.algorithm.oid,
        ));
    }
    let (key_size, exponent) = key_params(key_info.private_key)?;
    Ok((KeyMaterial::Rsa(Key(crate::try_to_vec(key_info.private_key)?)), key_size, exponent))
}

/// Check that a requested key size and public exponent can be used for key generation.
pub fn check_generation_params(size: KeySizeInBits, exponent: RsaExponent) -> Result<(), Error> {
    if !(MIN_KEY_SIZE_BITS..=MAX_KEY_SIZE_BITS).contains(&size.0) || size.0 % 8 != 0 {
        return Err(km_err!(UnsupportedKeySize, "unsupported RSA key size {}", size.0));
    }
    if exponent.0 < 3 || exponent.0 % 2 == 0 {
        return Err(km_err!(InvalidArgument, "unsupported RSA public exponent {}", exponent.0));
    }
    Ok(())
}

/// RSA encryption and decryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// OAEP with SHA-1 for both the message digest and MGF1.
    OaepSha1,
    Pkcs1_1_5Padding,
}

impl EncryptionMode {
    /// Determine the [`EncryptionMode`] for a padding mode.
    pub fn new(padding: PaddingMode) -> Result<Self, Error> {
        match padding {
            PaddingMode::RsaOaep => Ok(EncryptionMode::OaepSha1),
            PaddingMode::RsaPkcs115Encrypt => Ok(EncryptionMode::Pkcs1_1_5Padding),
            _ => Err(km_err!(
                UnsupportedPaddingMode,
                "padding mode {:?} not supported for RSA encryption",
                padding
            )),
        }
    }

    /// Maximum plaintext length for a key of `key_len` bytes.
    pub fn max_input_len(&self, key_len: usize) -> usize {
        let overhead = match self {
            EncryptionMode::OaepSha1 => OAEP_SHA1_PADDING_OVERHEAD,
            EncryptionMode::Pkcs1_1_5Padding => PKCS1_ENCRYPTION_PADDING_OVERHEAD,
        };
        key_len.saturating_sub(overhead)
    }
}

/// RSA signature mode.  The associated digest is applied to the message first; with
/// [`Digest::None`] the message itself is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode {
    NoPadding(Digest),
    PssPadding(Digest),
    Pkcs1_1_5Padding(Digest),
}

impl SignMode {
    /// Determine the [`SignMode`] from a padding mode and digest.
    pub fn new(padding: PaddingMode, digest: Digest) -> Result<Self, Error> {
        match padding {
            PaddingMode::None => Ok(SignMode::NoPadding(digest)),
            PaddingMode::RsaPss => {
                if digest == Digest::None {
                    return Err(km_err!(IncompatibleDigest, "PSS padding requires a digest"));
                }
                Ok(SignMode::PssPadding(digest))
            }
            PaddingMode::RsaPkcs115Sign => Ok(SignMode::Pkcs1_1_5Padding(digest)),
            _ => Err(km_err!(
                UnsupportedPaddingMode,
                "padding mode {:?} not supported for RSA signing",
                padding
            )),
        }
    }

    /// Return the digest applied to the message.
    pub fn digest(&self) -> Digest {
        match self {
            SignMode::NoPadding(d) | SignMode::PssPadding(d) | SignMode::Pkcs1_1_5Padding(d) => *d,
        }
    }
}

/// Salt length used for PSS signatures, given the digest and key lengths in bytes.  Fails with
/// `IncompatibleDigest` if the key is too small for the digest.
pub fn pss_salt_len(digest_len: usize, key_len: usize) -> Result<usize, Error> {
    if key_len < digest_len + PSS_MIN_OVERHEAD {
        return Err(km_err!(
            IncompatibleDigest,
            "{} byte key too small for PSS with {} byte digest",
            key_len,
            digest_len
        ));
    }
    Ok(core::cmp::min(digest_len, key_len - digest_len - 2))
}

/// Left-pad `data` with zeros to `len` bytes.  Fails if `data` is already longer.
pub fn zero_pad_left(data: &[u8], len: usize) -> Result<Vec<u8>, Error> {
    if data.len() > len {
        return Err(km_err!(InvalidInputLength, "{} bytes too long for {}", data.len(), len));
    }
    let mut result = crate::vec_try![0u8; len]?;
    result[len - data.len()..].copy_from_slice(data);
    Ok(result)
}
