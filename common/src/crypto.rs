//! Abstractions and related types for accessing cryptographic primitives
//! and related functionality.

use crate::{
    cbor, km_err,
    wire::keymaster::{Algorithm, Digest},
    wire::{KeySizeInBits, RsaExponent},
    AsCborValue, CborError, Error,
};
use alloc::{vec, vec::Vec};
use core::convert::TryInto;

pub mod aes;
pub mod ec;
pub mod hmac;
pub mod ocb;
pub mod rsa;
mod traits;
pub use traits::*;


/// Size of SHA-256 output in bytes.
pub const SHA256_DIGEST_LEN: usize = 32;

/// Milliseconds since the Unix epoch.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MillisecondsSinceEpoch(pub i64);

impl From<MillisecondsSinceEpoch> for crate::wire::keymaster::DateTime {
    fn from(value: MillisecondsSinceEpoch) -> Self {
        crate::wire::keymaster::DateTime { ms_since_epoch: value.0 }
    }
}

/// Information for key generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyGenInfo {
    Aes(aes::Variant),
    Hmac(KeySizeInBits),
    Rsa(KeySizeInBits, RsaExponent),
    NistEc(ec::NistCurve),
}

/// Plaintext key material.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Aes(aes::Key),
    Hmac(hmac::Key),
    Rsa(rsa::Key),
    Ec(ec::NistCurve, ec::NistKey),
}

impl KeyMaterial {
    /// Return the algorithm that this key material is for.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Aes(_) => Algorithm::Aes,
            Self::Hmac(_) => Algorithm::Hmac,
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Ec(_, _) => Algorithm::Ec,
        }
    }

    /// Indicate whether the key material is for an asymmetric key.
    pub fn is_asymmetric(&self) -> bool {
        match self {
            Self::Aes(_) | Self::Hmac(_) => false,
            Self::Ec(_, _) | Self::Rsa(_) => true,
        }
    }

    /// Return the public key information as an ASN.1 DER encoded `SubjectPublicKeyInfo`, as
    /// described in RFC 5280 section 4.1.
    ///
    /// Returns `None` for a symmetric key.
    pub fn subject_public_key_info(&self, ec: &dyn Ec) -> Result<Option<Vec<u8>>, Error> {
        match self {
            Self::Rsa(key) => Ok(Some(key.subject_public_key_info()?)),
            Self::Ec(curve, key) => Ok(Some(key.subject_public_key_info(*curve, ec)?)),
            Self::Aes(_) | Self::Hmac(_) => Ok(None),
        }
    }
}

/// Manual implementation of [`Debug`] that skips emitting plaintext key material.
impl core::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Aes(k) => match k {
                aes::Key::Aes128(_) => f.write_str("Aes128(...)"),
                aes::Key::Aes192(_) => f.write_str("Aes192(...)"),
                aes::Key::Aes256(_) => f.write_str("Aes256(...)"),
            },
            Self::Hmac(k) => f.write_fmt(format_args!("Hmac({} bytes)", k.0.len())),
            Self::Rsa(k) => f.write_fmt(format_args!("Rsa({} bytes)", k.0.len())),
            Self::Ec(c, _) => f.write_fmt(format_args!("Ec({:?}, ...)", c)),
        }
    }
}

impl AsCborValue for KeyMaterial {
    fn from_cbor_value(value: cbor::value::Value) -> Result<Self, CborError> {
        let mut a = match value {
            cbor::value::Value::Array(a) if a.len() == 2 => a,
            _ => return crate::cbor_type_error(&value, "arr len 2"),
        };
        let raw_key_value = a.remove(1);
        let algo: i32 = match a.remove(0) {
            cbor::value::Value::Integer(i) => i.try_into()?,
            v => return crate::cbor_type_error(&v, "uint"),
        };

        match algo {
            x if x == Algorithm::Aes as i32 => {
                let raw_key = <Vec<u8>>::from_cbor_value(raw_key_value)?;
                match aes::Key::new(raw_key) {
                    Ok(k) => Ok(Self::Aes(k)),
                    Err(_e) => Err(CborError::UnexpectedItem("bstr", "bstr len 16/24/32")),
                }
            }
            x if x == Algorithm::Hmac as i32 => {
                let raw_key = <Vec<u8>>::from_cbor_value(raw_key_value)?;
                Ok(Self::Hmac(hmac::Key(raw_key)))
            }
            x if x == Algorithm::Rsa as i32 => {
                let raw_key = <Vec<u8>>::from_cbor_value(raw_key_value)?;
                Ok(Self::Rsa(rsa::Key(raw_key)))
            }
            x if x == Algorithm::Ec as i32 => {
                let mut a = match raw_key_value {
                    cbor::value::Value::Array(a) if a.len() == 2 => a,
                    _ => return crate::cbor_type_error(&raw_key_value, "arr len 2"),
                };
                let raw_key = <Vec<u8>>::from_cbor_value(a.remove(1))?;
                let curve = <i32>::from_cbor_value(a.remove(0))?;
                let curve = ec::NistCurve::try_from(curve).map_err(|_e| CborError::NonEnumValue)?;
                Ok(Self::Ec(curve, ec::NistKey(raw_key)))
            }
            _ => Err(CborError::UnexpectedItem("unknown enum", "algo enum")),
        }
    }

    fn to_cbor_value(self) -> Result<cbor::value::Value, CborError> {
        Ok(cbor::value::Value::Array(match self {
            Self::Aes(k) => {
                let raw_key =
                    crate::try_to_vec(k.as_bytes()).map_err(|_e| CborError::AllocationFailed)?;
                vec![
                    cbor::value::Value::Integer((Algorithm::Aes as i32).into()),
                    cbor::value::Value::Bytes(raw_key),
                ]
            }
            Self::Hmac(k) => vec![
                cbor::value::Value::Integer((Algorithm::Hmac as i32).into()),
                cbor::value::Value::Bytes(k.0.clone()),
            ],
            Self::Rsa(k) => vec![
                cbor::value::Value::Integer((Algorithm::Rsa as i32).into()),
                cbor::value::Value::Bytes(k.0.clone()),
            ],
            Self::Ec(curve, k) => vec![
                cbor::value::Value::Integer((Algorithm::Ec as i32).into()),
                cbor::value::Value::Array(vec![
                    cbor::value::Value::Integer((curve as i32).into()),
                    cbor::value::Value::Bytes(k.0.clone()),
                ]),
            ],
        }))
    }
}

/// Direction of cipher operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymmetricOperation {
    Encrypt,
    Decrypt,
}

/// Extract or generate a nonce of the given size.
pub fn nonce(
    size: usize,
    caller_nonce: Option<&Vec<u8>>,
    rng: &mut dyn Rng,
) -> Result<Vec<u8>, Error> {
    match caller_nonce {
        Some(n) => match n.len() {
            l if l == size => crate::try_to_vec(n),
            l => Err(km_err!(InvalidArgument, "want {} byte nonce, got {}", size, l)),
        },
        None => {
            let mut n = crate::vec_try![0; size]?;
            rng.fill_bytes(&mut n);
            Ok(n)
        }
    }
}

/// Convenience wrapper to perform one-shot HMAC.
pub fn hmac(hmac: &dyn Hmac, key: &[u8], digest: Digest, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut op = hmac.begin(hmac::Key::new_from(key)?, digest)?;
    op.update(data)?;
    op.finish()
}
