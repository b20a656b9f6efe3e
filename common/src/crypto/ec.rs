//! Functionality related to elliptic curve support.

use super::KeyMaterial;
use crate::{km_err, try_to_vec, wire::KeySizeInBits, Error};
use alloc::vec::Vec;
use der::{asn1::BitStringRef, AnyRef, Decode, Encode};
use spki::{AlgorithmIdentifier, SubjectPublicKeyInfoRef};
use zeroize::ZeroizeOnDrop;

/// Default curve size for key generation.
pub const DEFAULT_KEY_SIZE: KeySizeInBits = KeySizeInBits(224);

/// OID value for general-use NIST EC keys held in PKCS#8 and X.509; see RFC 5480 s2.1.1.
pub const X509_NIST_OID: pkcs8::ObjectIdentifier =
    pkcs8::ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// OID value in `AlgorithmIdentifier.parameters` for P-224; see RFC 5480 s2.1.1.1.
pub const ALGO_PARAM_P224_OID: pkcs8::ObjectIdentifier =
    pkcs8::ObjectIdentifier::new_unwrap("1.3.132.0.33");

/// OID value in `AlgorithmIdentifier.parameters` for P-256; see RFC 5480 s2.1.1.1.
pub const ALGO_PARAM_P256_OID: pkcs8::ObjectIdentifier =
    pkcs8::ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// OID value in `AlgorithmIdentifier.parameters` for P-384; see RFC 5480 s2.1.1.1.
pub const ALGO_PARAM_P384_OID: pkcs8::ObjectIdentifier =
    pkcs8::ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// OID value in `AlgorithmIdentifier.parameters` for P-521; see RFC 5480 s2.1.1.1.
pub const ALGO_PARAM_P521_OID: pkcs8::ObjectIdentifier =
    pkcs8::ObjectIdentifier::new_unwrap("1.3.132.0.35");

/// Supported NIST curves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum NistCurve {
    P224 = 0,
    P256 = 1,
    P384 = 2,
    P521 = 3,
}

impl NistCurve {
    // Curve coordinate size in bytes.
    pub fn coord_len(&self) -> usize {
        match self {
            NistCurve::P224 => 28,
            NistCurve::P256 => 32,
            NistCurve::P384 => 48,
            NistCurve::P521 => 66,
        }
    }

    /// Curve size in bits.
    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits(match self {
            NistCurve::P224 => 224,
            NistCurve::P256 => 256,
            NistCurve::P384 => 384,
            NistCurve::P521 => 521,
        })
    }

    fn params_oid(&self) -> &'static pkcs8::ObjectIdentifier {
        match self {
            NistCurve::P224 => &ALGO_PARAM_P224_OID,
            NistCurve::P256 => &ALGO_PARAM_P256_OID,
            NistCurve::P384 => &ALGO_PARAM_P384_OID,
            NistCurve::P521 => &ALGO_PARAM_P521_OID,
        }
    }
}

impl TryFrom<KeySizeInBits> for NistCurve {
    type Error = Error;
    fn try_from(size: KeySizeInBits) -> Result<Self, Error> {
        match size.0 {
            224 => Ok(NistCurve::P224),
            256 => Ok(NistCurve::P256),
            384 => Ok(NistCurve::P384),
            521 => Ok(NistCurve::P521),
            s => Err(km_err!(UnsupportedKeySize, "EC key size {} not a supported curve", s)),
        }
    }
}

impl TryFrom<i32> for NistCurve {
    type Error = Error;
    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            x if x == NistCurve::P224 as i32 => Ok(NistCurve::P224),
            x if x == NistCurve::P256 as i32 => Ok(NistCurve::P256),
            x if x == NistCurve::P384 as i32 => Ok(NistCurve::P384),
            x if x == NistCurve::P521 as i32 => Ok(NistCurve::P521),
            x => Err(km_err!(InvalidKeyBlob, "unknown curve {}", x)),
        }
    }
}

/// A NIST EC key, in the form of an ASN.1 DER encoding of a `ECPrivateKey` structure,
/// as specified by RFC 5915 section 3:
///
/// ```asn1
/// ECPrivateKey ::= SEQUENCE {
///    version        INTEGER { ecPrivkeyVer1(1) } (ecPrivkeyVer1),
///    privateKey     OCTET STRING,
///    parameters [0] ECParameters {{ NamedCurve }} OPTIONAL,
///    publicKey  [1] BIT STRING OPTIONAL
/// }
/// ```
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct NistKey(pub Vec<u8>);

impl NistKey {
    /// Return the public key information as an ASN.1 DER encoded `SubjectPublicKeyInfo`, as
    /// described in RFC 5280 section 4.1.
    ///
    /// For NIST curve EC keys, the contents are described in RFC 5480 section 2.1.
    /// - The `AlgorithmIdentifier` has an `algorithm` OID of 1.2.840.10045.2.1.
    /// - The `AlgorithmIdentifier` has `parameters` that hold an OID identifying the curve.
    /// - The `subjectPublicKey` bit string holds a SEC-1 encoded public key.
    pub fn subject_public_key_info(
        &self,
        nist_curve: NistCurve,
        ec: &dyn super::Ec,
    ) -> Result<Vec<u8>, Error> {
        let ec_pvt_key = sec1::EcPrivateKey::from_der(self.0.as_slice())?;
        let pub_key = match ec_pvt_key.public_key {
            Some(pub_key) => try_to_vec(pub_key)?,
            // Key structure doesn't include optional public key, so regenerate it.
            None => ec.nist_public_key(self, nist_curve)?,
        };
        let spki = SubjectPublicKeyInfoRef {
            algorithm: AlgorithmIdentifier {
                oid: X509_NIST_OID,
                parameters: Some(AnyRef::from(nist_curve.params_oid())),
            },
            subject_public_key: BitStringRef::from_bytes(&pub_key)?,
        };
        Ok(spki.to_der()?)
    }
}

/// Import an EC key in PKCS#8 format, identifying the curve from the algorithm parameters.
pub fn import_pkcs8_key(data: &[u8]) -> Result<KeyMaterial, Error> {
    let key_info = pkcs8::PrivateKeyInfo::try_from(data)
        .map_err(|e| km_err!(InvalidArgument, "failed to parse PKCS#8 EC key: {:?}", e))?;
    if key_info.algorithm.oid != X509_NIST_OID {
        return Err(km_err!(
            ImportParameterMismatch,
            "unexpected OID {:?} for PKCS#8 EC key import",
            key_info.algorithm.oid,
        ));
    }
    let params_oid = key_info
        .algorithm
        .parameters_oid()
        .map_err(|_e| km_err!(InvalidArgument, "missing curve OID in PKCS#8 EC key"))?;
    let curve = [NistCurve::P224, NistCurve::P256, NistCurve::P384, NistCurve::P521]
        .into_iter()
        .find(|c| *c.params_oid() == params_oid)
        .ok_or_else(|| km_err!(UnsupportedKeySize, "unsupported curve OID {:?}", params_oid))?;
    let mut ec_key = sec1::EcPrivateKey::from_der(key_info.private_key)?;
    let der = match ec_key.parameters {
        Some(sec1::EcParameters::NamedCurve(oid)) if oid != params_oid => {
            return Err(km_err!(
                ImportParameterMismatch,
                "inner curve {:?} differs from outer curve {:?}",
                oid,
                params_oid
            ));
        }
        Some(_) => try_to_vec(key_info.private_key)?,
        None => {
            // The outer structure carried the curve; keep it with the key so the stored
            // encoding is self-describing.
            ec_key.parameters = Some(sec1::EcParameters::NamedCurve(*curve.params_oid()));
            ec_key.to_der()?
        }
    };
    Ok(KeyMaterial::Ec(curve, NistKey(der)))
}
