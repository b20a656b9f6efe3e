//! Engine functionality related to key generation, import, export and inspection.

use crate::SoftKeymaster;
use alloc::vec::Vec;
use log::{debug, warn};
use skm_common::{
    capability,
    crypto::{self, KeyMaterial},
    keyblob, km_err, tag, try_to_vec, Error,
};
use skm_wire::keymaster::{KeyCharacteristics, KeyCreationResult, KeyFormat, KeyParam};

impl<'a> SoftKeymaster<'a> {
    pub fn generate_key(&mut self, params: &[KeyParam]) -> Result<KeyCreationResult, Error> {
        let (chars, keygen_info) =
            tag::extract_key_gen_characteristics(params, self.imp.clock.now())?;
        let key_material = match keygen_info {
            crypto::KeyGenInfo::Aes(variant) => {
                self.imp.aes.generate_key(&mut *self.imp.rng, variant, params)?
            }
            crypto::KeyGenInfo::Hmac(key_size) => {
                self.imp.hmac.generate_key(&mut *self.imp.rng, key_size, params)?
            }
            crypto::KeyGenInfo::Rsa(key_size, pub_exponent) => {
                self.imp.rsa.generate_key(&mut *self.imp.rng, key_size, pub_exponent, params)?
            }
            crypto::KeyGenInfo::NistEc(curve) => {
                self.imp.ec.generate_nist_key(&mut *self.imp.rng, curve, params)?
            }
        };
        debug!("generated {:?} key", key_material.algorithm());

        self.finish_keyblob_creation(params, chars, key_material)
    }

    pub fn import_key(
        &mut self,
        params: &[KeyParam],
        key_format: KeyFormat,
        key_data: &[u8],
    ) -> Result<KeyCreationResult, Error> {
        let (chars, key_material) = tag::extract_key_import_characteristics(
            &self.imp,
            params,
            key_format,
            key_data,
            self.imp.clock.now(),
        )?;
        debug!("imported {:?} key from {:?}", key_material.algorithm(), key_format);

        self.finish_keyblob_creation(params, chars, key_material)
    }

    /// Perform common processing for keyblob creation (for both generation and import).
    fn finish_keyblob_creation(
        &mut self,
        params: &[KeyParam],
        characteristics: KeyCharacteristics,
        key_material: KeyMaterial,
    ) -> Result<KeyCreationResult, Error> {
        let hidden = self.hidden_params(params)?;
        let plaintext_keyblob = keyblob::PlaintextKeyBlob::new(key_material, characteristics);
        let characteristics = plaintext_keyblob.characteristics()?;
        let key_blob = keyblob::encode(self.imp.hmac, plaintext_keyblob, &hidden)?;
        Ok(KeyCreationResult { key_blob, characteristics })
    }

    /// Return the characteristics of a key.  The `client_id` and `app_data` must match the
    /// application id and data supplied when the key was created.
    pub fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<KeyCharacteristics, Error> {
        let params = app_params(client_id, app_data)?;
        let keyblob = self.keyblob_parse(key_blob, &params)?;
        keyblob.characteristics()
    }

    /// Export the public part of an asymmetric key.
    pub fn export_key(
        &self,
        key_format: KeyFormat,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let params = app_params(client_id, app_data)?;
        let keyblob = self.keyblob_parse(key_blob, &params)?;
        let algorithm = keyblob.key_material.algorithm();
        if !capability::supported_export_formats(algorithm)?.contains(&key_format) {
            warn!("refusing to export {:?} key as {:?}", algorithm, key_format);
            return Err(km_err!(
                UnsupportedKeyFormat,
                "export of {:?} key as {:?} not supported",
                algorithm,
                key_format
            ));
        }
        keyblob
            .key_material
            .subject_public_key_info(self.imp.ec)?
            .ok_or_else(|| km_err!(UnsupportedKeyFormat, "{:?} key has no public part", algorithm))
    }
}

/// Build the application binding parameters for a key blob access.
fn app_params(client_id: Option<&[u8]>, app_data: Option<&[u8]>) -> Result<Vec<KeyParam>, Error> {
    let mut params = Vec::new();
    params.try_reserve(2)?;
    if let Some(client_id) = client_id {
        params.push(KeyParam::ApplicationId(try_to_vec(client_id)?));
    }
    if let Some(app_data) = app_data {
        params.push(KeyParam::ApplicationData(try_to_vec(app_data)?));
    }
    Ok(params)
}
