//! Helper functionality for working with tags.

use crate::{
    capability,
    crypto::{self, aes, ec, hmac, rsa, KeyGenInfo, KeyMaterial, MillisecondsSinceEpoch},
    km_err, km_verr, try_to_vec, vec_try_with_capacity, Error, FallibleAllocExt,
};
use alloc::vec::Vec;
use core::fmt::Debug;
use log::debug;
use skm_wire::{
    keymaster::{
        Algorithm, BlockMode, DateTime, Digest, ErrorCode, KeyCharacteristics, KeyFormat,
        KeyOrigin, KeyParam, KeyPurpose, PaddingMode, Tag,
    },
    KeySizeInBits,
};

pub mod legacy;
mod set;
pub use set::*;

/// Tags that bind a key to the caller that uses it, but which are never stored in the key's
/// characteristics.
pub const HIDDEN_TAGS: &[Tag] = &[Tag::ApplicationId, Tag::ApplicationData, Tag::RootOfTrust];

/// Tags that only make sense for a single operation, and so are never stored in the key's
/// characteristics.
pub const OPERATION_TAGS: &[Tag] = &[Tag::AssociatedData, Tag::Nonce];

/// Tags that are added to key characteristics by the engine itself, and which must not be
/// supplied by the caller.
pub const AUTO_ADDED_CHARACTERISTICS: &[Tag] = &[Tag::Origin, Tag::CreationDatetime];

/// Macro to retrieve a copy of the (single) value of a tag in a collection of `KeyParam`s.  There
/// can be only one.  Only works for variants whose data type implements `Copy`.
#[macro_export]
macro_rules! get_tag_value {
    { $params:expr, $variant:ident, $err:expr } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::keymaster::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(*v);
                }
            }
            match (count, result) {
                (1, Some(v)) => Ok(v),
                (0, _) => Err($crate::km_verr!($err, "missing tag {}", stringify!($variant))),
                _ => Err($crate::km_verr!($err, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to retrieve the value of an optional single-valued tag in a collection of `KeyParam`s.  It
/// may or may not be present, but multiple instances of the tag are assumed to be invalid.
#[macro_export]
macro_rules! get_opt_tag_value {
    { $params:expr, $variant:ident } => {
        $crate::get_opt_tag_value!($params, $variant, InvalidTag)
    };
    { $params:expr, $variant:ident, $dup_error:ident } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::keymaster::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(v);
                }
            }
            match count {
                0 | 1 => Ok(result),
                _ => Err($crate::km_err!($dup_error, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}


/// Get the configured algorithm from a set of parameters.
pub fn get_algorithm(params: &[KeyParam]) -> Result<Algorithm, Error> {
    get_tag_value!(params, Algorithm, ErrorCode::UnsupportedAlgorithm)
}

/// Return the length in bits of a [`Digest`] function.
pub fn digest_len(digest: Digest) -> Result<u32, Error> {
    match digest {
        Digest::Md5 => Ok(128),
        Digest::Sha1 => Ok(160),
        Digest::Sha224 => Ok(224),
        Digest::Sha256 => Ok(256),
        Digest::Sha384 => Ok(384),
        Digest::Sha512 => Ok(512),
        _ => Err(km_err!(IncompatibleDigest, "invalid digest {:?}", digest)),
    }
}

/// Build the parameters that are used as the hidden input to the key blob integrity check:
/// - `ApplicationId(data)` if present
/// - `ApplicationData(data)` if present
/// - `RootOfTrust(rot)` where `rot` is the engine's configured root of trust
pub fn hidden(params: &[KeyParam], rot: &[u8]) -> Result<Vec<KeyParam>, Error> {
    let mut results = vec_try_with_capacity!(3)?;
    if let Some(app_id) = get_opt_tag_value!(params, ApplicationId)? {
        results.push(KeyParam::ApplicationId(try_to_vec(app_id)?));
    }
    if let Some(app_data) = get_opt_tag_value!(params, ApplicationData)? {
        results.push(KeyParam::ApplicationData(try_to_vec(app_data)?));
    }
    results.push(KeyParam::RootOfTrust(try_to_vec(rot)?));
    Ok(results)
}

/// Build the set of key characteristics for a key that is about to be generated,
/// checking parameter validity along the way. Also return the information needed for key
/// generation.
pub fn extract_key_gen_characteristics(
    params: &[KeyParam],
    now: MillisecondsSinceEpoch,
) -> Result<(KeyCharacteristics, KeyGenInfo), Error> {
    let (deduced_params, keygen_info) = match get_algorithm(params)? {
        Algorithm::Rsa => check_rsa_gen_params(params),
        Algorithm::Ec => check_ec_gen_params(params),
        Algorithm::Aes => check_aes_gen_params(params),
        Algorithm::Hmac => check_hmac_gen_params(params),
        Algorithm::Dsa => Err(km_err!(UnsupportedAlgorithm, "DSA keys not supported")),
    }?;
    let chars = extract_key_characteristics(params, &deduced_params, KeyOrigin::Generated, now)?;
    Ok((chars, keygen_info))
}

/// Build the set of key characteristics for a key that is about to be imported,
/// checking parameter validity along the way.
pub fn extract_key_import_characteristics(
    imp: &crypto::Implementation,
    params: &[KeyParam],
    key_format: KeyFormat,
    key_data: &[u8],
    now: MillisecondsSinceEpoch,
) -> Result<(KeyCharacteristics, KeyMaterial), Error> {
    let algo = get_algorithm(params)?;
    if !capability::supported_import_formats(algo)?.contains(&key_format) {
        return Err(km_err!(
            UnsupportedKeyFormat,
            "unsupported import format {:?} for {:?}",
            key_format,
            algo
        ));
    }
    let (deduced_params, key_material) = match algo {
        Algorithm::Rsa => check_rsa_import_params(imp.rsa, params, key_data),
        Algorithm::Ec => check_ec_import_params(imp.ec, params, key_data),
        Algorithm::Aes => check_aes_import_params(imp.aes, params, key_data),
        Algorithm::Hmac => check_hmac_import_params(imp.hmac, params, key_data),
        Algorithm::Dsa => Err(km_err!(UnsupportedAlgorithm, "DSA keys not supported")),
    }?;
    let chars = extract_key_characteristics(params, &deduced_params, KeyOrigin::Imported, now)?;
    Ok((chars, key_material))
}

/// Build the set of key characteristics for a key that is about to be generated or imported.
/// The `extra_params` argument provides additional parameters on top of `params`, such as
/// those deduced from imported key material or filled in as defaults.
fn extract_key_characteristics(
    params: &[KeyParam],
    extra_params: &[KeyParam],
    origin: KeyOrigin,
    now: MillisecondsSinceEpoch,
) -> Result<KeyCharacteristics, Error> {
    let mut chars = vec_try_with_capacity!(params.len() + extra_params.len() + 2)?;
    for param in params.iter().chain(extra_params) {
        let tag = param.tag();
        if AUTO_ADDED_CHARACTERISTICS.contains(&tag) {
            return Err(km_err!(InvalidTag, "engine-added tag {:?} included on key creation", tag));
        }
        if HIDDEN_TAGS.contains(&tag) || OPERATION_TAGS.contains(&tag) {
            continue;
        }
        chars.try_push(param.clone())?;
    }
    chars.try_push(KeyParam::Origin(origin))?;
    chars.try_push(KeyParam::CreationDatetime(DateTime::from(now)))?;

    // Keep a stable order, so that equal requests give equal characteristics.
    chars.sort_by(legacy::param_compare);

    Ok(KeyCharacteristics { hw_enforced: Vec::new(), sw_enforced: chars })
}

/// Check RSA key generation parameter validity, filling in the default size and exponent.
fn check_rsa_gen_params(params: &[KeyParam]) -> Result<(Vec<KeyParam>, KeyGenInfo), Error> {
    let mut deduced = Vec::new();
    let key_size = match get_opt_tag_value!(params, KeySize)? {
        Some(size) => *size,
        None => {
            deduced.try_push(KeyParam::KeySize(rsa::DEFAULT_KEY_SIZE))?;
            rsa::DEFAULT_KEY_SIZE
        }
    };
    let exponent = match get_opt_tag_value!(params, RsaPublicExponent)? {
        Some(exponent) => *exponent,
        None => {
            deduced.try_push(KeyParam::RsaPublicExponent(rsa::DEFAULT_EXPONENT))?;
            rsa::DEFAULT_EXPONENT
        }
    };
    rsa::check_generation_params(key_size, exponent)?;
    Ok((deduced, KeyGenInfo::Rsa(key_size, exponent)))
}

/// Check RSA key import parameter validity. Return the key material along with any key generation
/// parameters that have been deduced from the key material (but which are not present in the input
/// key parameters).
fn check_rsa_import_params(
    rsa: &dyn crypto::Rsa,
    params: &[KeyParam],
    key_data: &[u8],
) -> Result<(Vec<KeyParam>, KeyMaterial), Error> {
    let (key, key_size, public_exponent) = rsa.import_pkcs8_key(key_data, params)?;

    // If key size or exponent are explicitly specified, they must match. If they were not
    // specified, we emit them.
    let mut deduced_chars = require_matching_key_size(params, key_size)?;
    match get_opt_tag_value!(params, RsaPublicExponent)? {
        Some(param_public_exponent) => {
            if *param_public_exponent != public_exponent {
                return Err(km_err!(
                    ImportParameterMismatch,
                    "specified RSA_PUBLIC_EXPONENT {:?} != actual exponent {:?} for PKCS8 import",
                    param_public_exponent,
                    public_exponent,
                ));
            }
        }
        None => deduced_chars.try_push(KeyParam::RsaPublicExponent(public_exponent))?,
    }
    Ok((deduced_chars, key))
}

/// Check EC key generation parameter validity, filling in the default curve size.
fn check_ec_gen_params(params: &[KeyParam]) -> Result<(Vec<KeyParam>, KeyGenInfo), Error> {
    let mut deduced = Vec::new();
    let key_size = match get_opt_tag_value!(params, KeySize)? {
        Some(size) => *size,
        None => {
            deduced.try_push(KeyParam::KeySize(ec::DEFAULT_KEY_SIZE))?;
            ec::DEFAULT_KEY_SIZE
        }
    };
    let curve = ec::NistCurve::try_from(key_size)?;
    Ok((deduced, KeyGenInfo::NistEc(curve)))
}

/// Check EC key import parameter validity. Return the key material along with any key generation
/// parameters that have been deduced from the key material (but which are not present in the input
/// key parameters).
fn check_ec_import_params(
    ec: &dyn crypto::Ec,
    params: &[KeyParam],
    key_data: &[u8],
) -> Result<(Vec<KeyParam>, KeyMaterial), Error> {
    let key = ec.import_pkcs8_key(key_data, params)?;
    let curve = match &key {
        KeyMaterial::Ec(curve, _) => *curve,
        _ => return Err(km_err!(ImportParameterMismatch, "PKCS8 data is not an EC key")),
    };
    let deduced_chars = require_matching_key_size(params, curve.size())?;
    Ok((deduced_chars, key))
}

/// Check AES key generation parameter validity.
fn check_aes_gen_params(params: &[KeyParam]) -> Result<(Vec<KeyParam>, KeyGenInfo), Error> {
    // For key generation, the size must be explicitly specified.
    let key_size = get_tag_value!(params, KeySize, ErrorCode::UnsupportedKeySize)?;
    let variant = aes::Variant::try_from(key_size)?;
    Ok((Vec::new(), KeyGenInfo::Aes(variant)))
}

/// Check AES key import parameter validity. Return the key material along with any key generation
/// parameters that have been deduced from the key material (but which are not present in the input
/// key parameters).
fn check_aes_import_params(
    aes: &dyn crypto::Aes,
    params: &[KeyParam],
    key_data: &[u8],
) -> Result<(Vec<KeyParam>, KeyMaterial), Error> {
    let (key, key_size) = aes.import_key(key_data, params)?;
    let deduced_chars = require_matching_key_size(params, key_size)?;
    Ok((deduced_chars, key))
}

/// Check HMAC key generation parameter validity.
fn check_hmac_gen_params(params: &[KeyParam]) -> Result<(Vec<KeyParam>, KeyGenInfo), Error> {
    // For key generation the size must be explicitly specified.
    let key_size = get_tag_value!(params, KeySize, ErrorCode::UnsupportedKeySize)?;
    hmac::valid_size(key_size)?;
    Ok((Vec::new(), KeyGenInfo::Hmac(key_size)))
}

/// Check HMAC key import parameter validity.
fn check_hmac_import_params(
    hmac: &dyn crypto::Hmac,
    params: &[KeyParam],
    key_data: &[u8],
) -> Result<(Vec<KeyParam>, KeyMaterial), Error> {
    let (key, key_size) = hmac.import_key(key_data, params)?;
    let deduced_chars = require_matching_key_size(params, key_size)?;
    Ok((deduced_chars, key))
}

/// Check or populate a `Tag::KeySize` value.
fn require_matching_key_size(
    params: &[KeyParam],
    key_size: KeySizeInBits,
) -> Result<Vec<KeyParam>, Error> {
    let mut result = Vec::new();
    match get_opt_tag_value!(params, KeySize)? {
        Some(param_key_size) => {
            if *param_key_size != key_size {
                return Err(km_err!(
                    ImportParameterMismatch,
                    "specified KEY_SIZE {:?} bits != actual key size {:?}",
                    param_key_size,
                    key_size
                ));
            }
        }
        None => result.try_push(KeyParam::KeySize(key_size))?,
    }
    Ok(result)
}

/// Mode of an operation, as resolved from the key characteristics and begin parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationMode {
    /// RSA signing or verification.
    RsaSign(rsa::SignMode),
    /// RSA encryption or decryption.
    RsaCrypt(rsa::EncryptionMode),
    /// ECDSA signing or verification of the (truncated) message.
    Ecdsa,
    Aes(aes::Mode),
    /// HMAC, producing a tag of `mac_len` bytes.
    Hmac { digest: Digest, mac_len: usize },
}

/// Resolve the effective value of a begin parameter.  A value supplied by the caller must be
/// authorized by the key; otherwise the first value the key authorizes is used.  The resolved
/// value must appear in the `supported` list.  An empty `supported` list means the parameter
/// does not apply to the operation, and any value for it is ignored.
fn resolve<T: Copy + PartialEq + Debug>(
    requested: Option<T>,
    authorized: &[T],
    supported: &[T],
    incompatible: ErrorCode,
    unsupported: ErrorCode,
) -> Result<Option<T>, Error> {
    if supported.is_empty() {
        if requested.is_some() || !authorized.is_empty() {
            debug!("ignoring {:?} / {:?}, not applicable", requested, authorized);
        }
        return Ok(None);
    }
    let value = match requested {
        Some(v) if authorized.contains(&v) => Some(v),
        Some(v) => {
            return Err(km_verr!(
                incompatible,
                "{:?} not in key characteristics {:?}",
                v,
                authorized
            ))
        }
        None => authorized.first().copied(),
    };
    match value {
        Some(v) if !supported.contains(&v) => {
            Err(km_verr!(unsupported, "{:?} not one of supported {:?}", v, supported))
        }
        _ => Ok(value),
    }
}

/// Check that an operation with the given `purpose` and `params` can validly be started
/// using a key with characteristics `chars`, returning the resolved mode of operation.
pub fn check_begin_params(
    chars: &[KeyParam],
    purpose: KeyPurpose,
    params: &[KeyParam],
) -> Result<OperationMode, Error> {
    // General checks for all algorithms.
    let algo = get_algorithm(chars)?;
    let caps = capability::purpose_caps(algo, purpose)?;
    let auths = AuthorizationSet::from_slice(chars)?;
    if !auths.contains(&KeyParam::Purpose(purpose)) {
        return Err(km_err!(
            IncompatiblePurpose,
            "purpose {:?} not in key characteristics",
            purpose
        ));
    }
    let nonce = get_opt_tag_value!(params, Nonce)?;
    if auths.contains_tag(Tag::CallerNonce) {
        // Caller-provided nonces are allowed.
    } else if nonce.is_some() && purpose == KeyPurpose::Encrypt {
        return Err(km_err!(CallerNonceProhibited, "caller nonce not allowed for encryption"));
    }

    // For each mode parameter, a value in the begin parameters must also exist in the key
    // characteristics, and there can be only one.
    let digest = resolve(
        get_opt_tag_value!(params, Digest, UnsupportedDigest)?.copied(),
        &auths.get_all::<Digest>(Tag::Digest)?,
        caps.digests,
        ErrorCode::IncompatibleDigest,
        ErrorCode::UnsupportedDigest,
    )?;
    let padding = resolve(
        get_opt_tag_value!(params, Padding, UnsupportedPaddingMode)?.copied(),
        &auths.get_all::<PaddingMode>(Tag::Padding)?,
        caps.paddings,
        ErrorCode::IncompatiblePaddingMode,
        ErrorCode::UnsupportedPaddingMode,
    )?;
    let block_mode = resolve(
        get_opt_tag_value!(params, BlockMode, UnsupportedBlockMode)?.copied(),
        &auths.get_all::<BlockMode>(Tag::BlockMode)?,
        caps.block_modes,
        ErrorCode::IncompatibleBlockMode,
        ErrorCode::UnsupportedBlockMode,
    )?;

    // Further algorithm-specific checks.
    match algo {
        Algorithm::Rsa => check_begin_rsa_params(purpose, digest, padding),
        Algorithm::Ec => Ok(OperationMode::Ecdsa),
        Algorithm::Aes => check_begin_aes_params(
            &auths,
            purpose,
            params,
            block_mode,
            padding,
            nonce.map(|v| v.as_ref()),
        ),
        Algorithm::Hmac => check_begin_hmac_params(&auths, digest),
        Algorithm::Dsa => Err(km_err!(UnsupportedAlgorithm, "DSA keys not supported")),
    }
}

/// Indicate whether a [`KeyPurpose`] is for signing or verification.
fn for_signing(purpose: KeyPurpose) -> bool {
    purpose == KeyPurpose::Sign || purpose == KeyPurpose::Verify
}

/// Check that an RSA operation can validly be started with the resolved digest and padding.
fn check_begin_rsa_params(
    purpose: KeyPurpose,
    digest: Option<Digest>,
    padding: Option<PaddingMode>,
) -> Result<OperationMode, Error> {
    let padding =
        padding.ok_or_else(|| km_err!(UnsupportedPaddingMode, "no padding mode for RSA key"))?;
    if for_signing(purpose) {
        let digest = digest.ok_or_else(|| km_err!(UnsupportedDigest, "no digest for RSA key"))?;
        Ok(OperationMode::RsaSign(rsa::SignMode::new(padding, digest)?))
    } else {
        Ok(OperationMode::RsaCrypt(rsa::EncryptionMode::new(padding)?))
    }
}

/// Check that an AES operation can validly be started, resolving the block mode details.
fn check_begin_aes_params(
    auths: &AuthorizationSet,
    purpose: KeyPurpose,
    params: &[KeyParam],
    block_mode: Option<BlockMode>,
    padding: Option<PaddingMode>,
    caller_nonce: Option<&[u8]>,
) -> Result<OperationMode, Error> {
    let bmode = block_mode.ok_or_else(|| km_err!(UnsupportedBlockMode, "no block mode for AES"))?;
    let pkcs7 = match padding.unwrap_or(PaddingMode::None) {
        PaddingMode::None => false,
        PaddingMode::Pkcs7 => true,
        p => return Err(km_err!(UnsupportedPaddingMode, "padding {:?} not valid for AES", p)),
    };

    let mode = match bmode {
        BlockMode::Ecb => {
            if let Some(nonce) = caller_nonce {
                return Err(km_err!(
                    InvalidArgument,
                    "nonce of {} bytes not valid for AES-ECB",
                    nonce.len()
                ));
            }
            aes::Mode::Ecb { pkcs7 }
        }
        BlockMode::Cbc => {
            let nonce = match caller_nonce {
                Some(n) => Some(n.try_into().map_err(|_e| {
                    km_err!(InvalidArgument, "invalid caller nonce len {} for AES-CBC", n.len())
                })?),
                None => None,
            };
            aes::Mode::Cbc { pkcs7, nonce }
        }
        BlockMode::Ocb => {
            if pkcs7 {
                return Err(km_err!(UnsupportedPaddingMode, "padding not valid for AES-OCB"));
            }
            let chunk_len: u32 = auths.get(Tag::ChunkLength)?;
            if chunk_len == 0 {
                return Err(km_err!(InvalidArgument, "zero CHUNK_LENGTH for AES-OCB"));
            }
            if let Some(requested) = get_opt_tag_value!(params, ChunkLength)? {
                if *requested != chunk_len {
                    return Err(km_err!(
                        InvalidArgument,
                        "CHUNK_LENGTH {} differs from key's {}",
                        requested,
                        chunk_len
                    ));
                }
            }
            let mac_len: u32 = auths.get(Tag::MacLength)?;
            if mac_len as usize != aes::OCB_TAG_SIZE {
                return Err(km_err!(InvalidArgument, "unsupported AES-OCB tag length {}", mac_len));
            }
            if let Some(requested) = get_opt_tag_value!(params, MacLength)? {
                if *requested != mac_len {
                    return Err(km_err!(
                        InvalidArgument,
                        "MAC_LENGTH {} differs from key's {}",
                        requested,
                        mac_len
                    ));
                }
            }
            let nonce = match caller_nonce {
                Some(n) => Some(n.try_into().map_err(|_e| {
                    km_err!(InvalidArgument, "invalid caller nonce len {} for AES-OCB", n.len())
                })?),
                None if purpose == KeyPurpose::Decrypt => {
                    return Err(km_err!(InvalidArgument, "AES-OCB decryption requires a nonce"))
                }
                None => None,
            };
            aes::Mode::Ocb { chunk_len: chunk_len as usize, nonce }
        }
        _ => return Err(km_err!(UnsupportedBlockMode, "block mode {:?} not valid for AES", bmode)),
    };
    Ok(OperationMode::Aes(mode))
}

/// Check that an HMAC operation can validly be started with the resolved digest, returning the
/// MAC length bound to the key.
fn check_begin_hmac_params(
    auths: &AuthorizationSet,
    digest: Option<Digest>,
) -> Result<OperationMode, Error> {
    let digest = digest.ok_or_else(|| km_err!(UnsupportedDigest, "no digest for HMAC key"))?;
    if auths.find(Tag::MacLength).is_none() {
        return Err(km_err!(UnsupportedMacLength, "no MAC_LENGTH for HMAC key"));
    }
    let mac_len: u32 = auths.get(Tag::MacLength)?;
    let digest_bits = digest_len(digest)?;
    if mac_len == 0 || mac_len.checked_mul(8).map_or(true, |bits| bits > digest_bits) {
        return Err(km_err!(
            UnsupportedMacLength,
            "MAC_LENGTH {} bytes invalid for {:?}",
            mac_len,
            digest
        ));
    }
    Ok(OperationMode::Hmac { digest, mac_len: mac_len as usize })
}

/// Check that the key's validity period allows it to be used for `purpose` at time `now`.
pub fn check_validity(
    chars: &[KeyParam],
    purpose: KeyPurpose,
    now: MillisecondsSinceEpoch,
) -> Result<(), Error> {
    let now = DateTime::from(now);
    if let Some(active) = get_opt_tag_value!(chars, ActiveDatetime)? {
        if now < *active {
            return Err(km_err!(KeyNotYetValid, "key not active until {:?}", active));
        }
    }
    let expiry = match purpose {
        KeyPurpose::Encrypt | KeyPurpose::Sign => {
            get_opt_tag_value!(chars, OriginationExpireDatetime)?
        }
        KeyPurpose::Decrypt | KeyPurpose::Verify => get_opt_tag_value!(chars, UsageExpireDatetime)?,
    };
    if let Some(expiry) = expiry {
        if now > *expiry {
            return Err(km_err!(KeyExpired, "key expired at {:?} for {:?}", expiry, purpose));
        }
    }
    Ok(())
}
