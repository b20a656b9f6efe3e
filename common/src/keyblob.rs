//! Key blob manipulation functionality.
//!
//! A key blob holds the plaintext key material along with the key characteristics, protected
//! against modification by a truncated HMAC:
//!
//! ```text
//! version (1 byte) || CBOR([key_material, hw_enforced, sw_enforced]) || mac (8 bytes)
//! ```
//!
//! where `mac = HMAC-SHA256(HK, version || CBOR || serialize(hidden))[..8]`, with `HK` a fixed
//! key and `hidden` the caller's application id/data plus the engine's root of trust.

use crate::{
    cbor_type_error, crypto, km_err, tag, try_to_vec, vec_try, AsCborValue, CborError, Error,
    FallibleAllocExt,
};
use alloc::{vec, vec::Vec};
use log::warn;
use skm_derive::AsCborValue;
use skm_wire::keymaster::{Digest, KeyCharacteristics, KeyParam};


/// Key blob format version.
pub const VERSION: u8 = 0;

/// Size (in bytes) of appended MAC.
pub const MAC_LEN: usize = 8;

/// Hard-coded HMAC key used for keyblob authentication.
const HMAC_KEY: &[u8] = b"IntegrityAssuredBlob0\0";

/// Plaintext key blob, with key characteristics.
#[derive(Clone, Debug, PartialEq, Eq, AsCborValue)]
pub struct PlaintextKeyBlob {
    pub key_material: crypto::KeyMaterial,
    pub hw_enforced: Vec<KeyParam>,
    pub sw_enforced: Vec<KeyParam>,
}

impl PlaintextKeyBlob {
    /// Build a key blob from key material and its characteristics.
    pub fn new(key_material: crypto::KeyMaterial, chars: KeyCharacteristics) -> Self {
        Self { key_material, hw_enforced: chars.hw_enforced, sw_enforced: chars.sw_enforced }
    }

    /// Return a copy of the key characteristics.
    pub fn characteristics(&self) -> Result<KeyCharacteristics, Error> {
        Ok(KeyCharacteristics {
            hw_enforced: try_to_vec(&self.hw_enforced)?,
            sw_enforced: try_to_vec(&self.sw_enforced)?,
        })
    }
}

/// Compute the authentication HMAC for a key blob:
///   HMAC-SHA256(HK, data || serialize(hidden))
/// with HK = b"IntegrityAssuredBlob0\0", truncated to [`MAC_LEN`] bytes.
fn compute_mac(
    hmac: &dyn crypto::Hmac,
    data: &[u8],
    hidden: &[KeyParam],
) -> Result<Vec<u8>, Error> {
    let hidden_data = tag::legacy::serialize(hidden)?;
    let mut op = hmac.begin(crypto::hmac::Key::new_from(HMAC_KEY)?, Digest::Sha256)?;
    op.update(data)?;
    op.update(&hidden_data)?;
    let mut mac = op.finish()?;
    if mac.len() < MAC_LEN {
        return Err(km_err!(UnknownError, "HMAC output of {} bytes too short", mac.len()));
    }
    mac.truncate(MAC_LEN);
    Ok(mac)
}

/// Serialize a [`PlaintextKeyBlob`], binding it to the `hidden` parameters.
pub fn encode(
    hmac: &dyn crypto::Hmac,
    keyblob: PlaintextKeyBlob,
    hidden: &[KeyParam],
) -> Result<Vec<u8>, Error> {
    let mut result = vec_try![VERSION]?;
    result.try_extend_from_slice(&keyblob.into_vec()?)?;
    let mac = compute_mac(hmac, &result, hidden)?;
    result.try_extend_from_slice(&mac)?;
    Ok(result)
}

/// Parse a serialized key blob, checking its integrity against the `hidden` parameters.  All
/// failures are reported as `InvalidKeyBlob`.
pub fn decode(
    hmac: &dyn crypto::Hmac,
    comparator: &dyn crypto::ConstTimeEq,
    data: &[u8],
    hidden: &[KeyParam],
) -> Result<PlaintextKeyBlob, Error> {
    if data.len() < 1 + MAC_LEN {
        return Err(km_err!(InvalidKeyBlob, "blob not long enough (len = {})", data.len()));
    }

    // Check the HMAC in the last 8 bytes before doing anything else.
    let (contents, mac) = data.split_at(data.len() - MAC_LEN);
    let computed_mac = compute_mac(hmac, contents, hidden)?;
    if comparator.ne(mac, &computed_mac) {
        warn!("key blob integrity check failed");
        return Err(km_err!(InvalidKeyBlob, "invalid key blob"));
    }

    match contents.split_first() {
        Some((&VERSION, cbor_data)) => PlaintextKeyBlob::from_slice(cbor_data)
            .map_err(|e| km_err!(InvalidKeyBlob, "failed to parse keyblob: {:?}", e)),
        Some((version, _)) => {
            Err(km_err!(InvalidKeyBlob, "unexpected blob version {}", version))
        }
        None => Err(km_err!(InvalidKeyBlob, "empty key blob")),
    }
}
