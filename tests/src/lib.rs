//! Shared fixtures for end-to-end tests of the software keymaster.

use skm_common::Error;
use skm_crypto_ossl::{rng::OpenSslRng, OpenSslBackend};
use skm_engine::{EngineConfig, OpHandle, SoftKeymaster};
use skm_wire::{
    keymaster::{
        Algorithm, BlockMode, Digest, ErrorCode, KeyFormat, KeyParam, KeyPurpose, PaddingMode,
    },
    KeySizeInBits,
};

/// RSA-1024 private key (public exponent 65537) in PKCS#8 form.
pub const RSA_1024_PKCS8: &str = concat!(
    "30820277020100300d06092a864886f70d0101010500048202613082025d0201",
    "0002818100955ea931badd06d626c9d35cb824f7abadb153d7dab03fa54f28ac",
    "948658ab34d9f5544662a147fccbc244701e14c0d859dc918e53560e5b310ca9",
    "1f181f9566ff75553c83552264370fc2beefbc1684a3d2a4f61c4485ca730d91",
    "c970e0c5b24f841bd4f9d350cfcde5f582aa02a15b423f55a603ae08919cf676",
    "4428a205b902030100010281803b9e52cde495bfdace14946657a179b16e5c6e",
    "e8a302e2046b3a02d82d5f4ac687906218cdd92dd07acb89616ec03dd09cdd6a",
    "c37203d12b18c2c2e6044ce6e65f4a66a5a0d5f325f2081604b9046fa1959337",
    "e59171f885ca706027e379d09b0c9b2846557cc6aeeec606e802e529375f9ee0",
    "a5b84f535c88e3321d4ed5f5d9024100c38ea6098c3d0e8816b25a28dd6ae02e",
    "49ab955107d4f7b969ccb332ba7989de1bfc1864f87420cd058ef032dd0ab5c7",
    "fc5b6781d63ee9824ad580f9d0f0dbb7024100c3897501d754a3415e2d600152",
    "ccd4cd94ce5c1c3ab4c9473eb4e50196303b54c4503d8444202de15646cc2d3c",
    "6d60fd9b5d615d256b17a9987a61096d900a0f0241009de116af72a7008a6238",
    "8f8d9a64e4a4ba196aad46b36b6427c4799024f8669408e7d811fc7c54d6f0fb",
    "db7454fc8691f46d1efdb5a8890105c5a5210accc9b5024100c2126dd573f907",
    "47dbc741604ee409da39754faa9d01ce3c2e1ab0a8907e3285018b7a630a92bd",
    "b6c740e1698c6e2b33cabe35e2933ee56f686d1e5e9325c1350240517d7475e1",
    "fe8ba6018bf8d0d5594aef21dd42aa198484c1e40e85e3ac14186039236f7376",
    "cab94ea52d841b85b9032fa2ab963cfc04d5821defaf40ac1f47cf",
);

/// `SubjectPublicKeyInfo` for [`RSA_1024_PKCS8`].
pub const RSA_1024_SPKI: &str = concat!(
    "30819f300d06092a864886f70d010101050003818d0030818902818100955ea9",
    "31badd06d626c9d35cb824f7abadb153d7dab03fa54f28ac948658ab34d9f554",
    "4662a147fccbc244701e14c0d859dc918e53560e5b310ca91f181f9566ff7555",
    "3c83552264370fc2beefbc1684a3d2a4f61c4485ca730d91c970e0c5b24f841b",
    "d4f9d350cfcde5f582aa02a15b423f55a603ae08919cf6764428a205b9020301",
    "0001",
);

/// Signature by [`RSA_1024_PKCS8`] over [`QUICK_FOX`] with PKCS#1 v1.5 padding applied to the
/// bare SHA-256 digest.
pub const RSA_1024_PKCS1_SHA256_SIG: &str = concat!(
    "1127872800a5290dd094e179e26f34e4969d420f68bd834d8f60249206a6cbfc",
    "2dd01871f09dc1b3399aa142c4044a2607212d982e3c5111633e79a7e9843265",
    "edfa1dacc0f5c06810e1e40d6f68f1130a4ab4d3de17b11ff1bbdbde61ee03f1",
    "50141c3755d565de9a288dc30721fa0a32e92e22b495a5a476027dfe12172842",
);

/// P-256 private key in PKCS#8 form.  The inner `ECPrivateKey` carries the public key but no
/// curve parameters.
pub const P256_PKCS8: &str = concat!(
    "308187020100301306072a8648ce3d020106082a8648ce3d030107046d306b02",
    "01010420f9666e78c7245412d144d6229fd9ab8115e8de80e8de1950cdd81595",
    "c7487f97a1440342000481860992db957c18bc1ed562ce258ac9ac2c4c68081e",
    "666505b456dd1b0c1e090acd1929dc40da359d5ce9c4b2ebdfad1d86a5732d27",
    "a8690565f41ae5c0c355",
);

/// `SubjectPublicKeyInfo` for [`P256_PKCS8`].
pub const P256_SPKI: &str = concat!(
    "3059301306072a8648ce3d020106082a8648ce3d0301070342000481860992db",
    "957c18bc1ed562ce258ac9ac2c4c68081e666505b456dd1b0c1e090acd1929dc",
    "40da359d5ce9c4b2ebdfad1d86a5732d27a8690565f41ae5c0c355",
);

pub const QUICK_FOX: &[u8] = b"The quick brown fox jumps over the lazy dog";

pub fn hex(s: &str) -> Vec<u8> {
    ::hex::decode(s).unwrap()
}

/// Run `f` against a freshly created engine backed by OpenSSL.
pub fn with_engine<F>(f: F)
where
    F: FnOnce(&mut SoftKeymaster),
{
    with_config(EngineConfig::default(), f)
}

pub fn with_config<F>(config: EngineConfig, f: F)
where
    F: FnOnce(&mut SoftKeymaster),
{
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = OpenSslBackend::default();
    let mut rng = OpenSslRng;
    let mut km = SoftKeymaster::new(backend.implementation(&mut rng), config);
    f(&mut km)
}

/// Return the error code of a result that is expected to fail.
pub fn error_code<T: std::fmt::Debug>(result: Result<T, Error>) -> ErrorCode {
    match result {
        Ok(v) => panic!("unexpected success: {:?}", v),
        Err(e) => e.code(),
    }
}

pub fn aes_key(size: u32, block_mode: BlockMode, padding: PaddingMode) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(size)),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Purpose(KeyPurpose::Decrypt),
        KeyParam::BlockMode(block_mode),
        KeyParam::Padding(padding),
    ]
}

/// Parameters for a 128-bit AES-OCB key with a full-size tag.
pub fn ocb_key(chunk_len: u32) -> Vec<KeyParam> {
    let mut params = aes_key(128, BlockMode::Ocb, PaddingMode::None);
    params.push(KeyParam::ChunkLength(chunk_len));
    params.push(KeyParam::MacLength(16));
    params
}

pub fn hmac_key(size: u32, digest: Digest, mac_len: u32) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Hmac),
        KeyParam::KeySize(KeySizeInBits(size)),
        KeyParam::Digest(digest),
        KeyParam::MacLength(mac_len),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::Verify),
    ]
}

pub fn rsa_signing_key(size: u32, padding: PaddingMode, digest: Digest) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(size)),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::Verify),
        KeyParam::Padding(padding),
        KeyParam::Digest(digest),
    ]
}

pub fn rsa_encryption_key(size: u32, padding: PaddingMode) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(size)),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Purpose(KeyPurpose::Decrypt),
        KeyParam::Padding(padding),
    ]
}

pub fn ec_signing_key(size: u32, digest: Digest) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::KeySize(KeySizeInBits(size)),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::Verify),
        KeyParam::Digest(digest),
    ]
}

/// Import a fixture key given as hex.
pub fn import(
    km: &mut SoftKeymaster,
    params: &[KeyParam],
    format: KeyFormat,
    key_hex: &str,
) -> Result<Vec<u8>, Error> {
    Ok(km.import_key(params, format, &hex(key_hex))?.key_blob)
}

/// Run a complete operation over `data`, fed to the engine in pieces of at most `chunk` bytes.
pub fn process_in_chunks(
    km: &mut SoftKeymaster,
    purpose: KeyPurpose,
    key_blob: &[u8],
    params: &[KeyParam],
    data: &[u8],
    chunk: usize,
    signature: &[u8],
) -> Result<Vec<u8>, Error> {
    let op = OpHandle(km.begin(purpose, key_blob, params)?.op_handle);
    let mut output = Vec::new();
    for piece in data.chunks(chunk.max(1)) {
        let (consumed, out) = km.update(op, &[], piece)?;
        assert_eq!(consumed, piece.len());
        output.extend_from_slice(&out);
    }
    output.extend_from_slice(&km.finish(op, &[], signature)?);
    Ok(output)
}

/// Run a complete operation over `data` in a single update.
pub fn process_message(
    km: &mut SoftKeymaster,
    purpose: KeyPurpose,
    key_blob: &[u8],
    params: &[KeyParam],
    data: &[u8],
) -> Result<Vec<u8>, Error> {
    process_in_chunks(km, purpose, key_blob, params, data, data.len(), &[])
}

pub fn sign(
    km: &mut SoftKeymaster,
    key_blob: &[u8],
    params: &[KeyParam],
    msg: &[u8],
) -> Result<Vec<u8>, Error> {
    process_message(km, KeyPurpose::Sign, key_blob, params, msg)
}

pub fn verify(
    km: &mut SoftKeymaster,
    key_blob: &[u8],
    params: &[KeyParam],
    msg: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    let output =
        process_in_chunks(km, KeyPurpose::Verify, key_blob, params, msg, msg.len(), signature)?;
    assert!(output.is_empty(), "verification produced output");
    Ok(())
}
