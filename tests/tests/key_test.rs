use skm_common::tag::AuthorizationSet;
use skm_crypto_ossl::{rng::OpenSslRng, OpenSslBackend};
use skm_engine::{device::KeymasterDevice, EngineConfig, OpHandle, SoftKeymaster};
use skm_tests::{
    aes_key, ec_signing_key, error_code, hmac_key, process_message, rsa_signing_key,
    with_engine, QUICK_FOX,
};
use skm_wire::{
    keymaster::{
        Algorithm, BlockMode, DateTime, Digest, ErrorCode, KeyCharacteristics, KeyFormat,
        KeyOrigin, KeyParam, KeyPurpose, PaddingMode,
    },
    KeySizeInBits, RsaExponent,
};

fn has(chars: &KeyCharacteristics, param: KeyParam) -> bool {
    chars.sw_enforced.contains(&param)
}

#[test]
fn test_generation_defaults() {
    with_engine(|km| {
        let params = [
            KeyParam::Algorithm(Algorithm::Rsa),
            KeyParam::Purpose(KeyPurpose::Sign),
            KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
            KeyParam::Digest(Digest::Sha256),
        ];
        let chars = km.generate_key(&params).unwrap().characteristics;
        assert!(has(&chars, KeyParam::KeySize(KeySizeInBits(2048))));
        assert!(has(&chars, KeyParam::RsaPublicExponent(RsaExponent(65537))));
        assert!(has(&chars, KeyParam::Origin(KeyOrigin::Generated)));

        let params = [KeyParam::Algorithm(Algorithm::Ec), KeyParam::Purpose(KeyPurpose::Sign)];
        let result = km.generate_key(&params).unwrap();
        assert!(has(&result.characteristics, KeyParam::KeySize(KeySizeInBits(224))));
        let sig = process_message(km, KeyPurpose::Sign, &result.key_blob, &[], QUICK_FOX);
        assert!(!sig.unwrap().is_empty());
    });
}

#[test]
fn test_generation_errors() {
    with_engine(|km| {
        let mut params = aes_key(128, BlockMode::Ecb, PaddingMode::None);
        params.retain(|p| !matches!(p, KeyParam::KeySize(_)));
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::UnsupportedKeySize);
        let params = aes_key(100, BlockMode::Ecb, PaddingMode::None);
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::UnsupportedKeySize);

        let params = hmac_key(4, Digest::Sha256, 32);
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::UnsupportedKeySize);
        let params = ec_signing_key(200, Digest::None);
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::UnsupportedKeySize);

        let params = [
            KeyParam::Algorithm(Algorithm::Rsa),
            KeyParam::KeySize(KeySizeInBits(512)),
            KeyParam::RsaPublicExponent(RsaExponent(4)),
        ];
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::InvalidArgument);

        let params = [KeyParam::Purpose(KeyPurpose::Sign)];
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::UnsupportedAlgorithm);
        let params = [KeyParam::Algorithm(Algorithm::Dsa)];
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::UnsupportedAlgorithm);

        // Tags that the engine adds itself cannot be supplied.
        let mut params = aes_key(128, BlockMode::Ecb, PaddingMode::None);
        params.push(KeyParam::Origin(KeyOrigin::Imported));
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::InvalidTag);
        let mut params = aes_key(128, BlockMode::Ecb, PaddingMode::None);
        params.push(KeyParam::CreationDatetime(DateTime { ms_since_epoch: 0 }));
        assert_eq!(error_code(km.generate_key(&params)), ErrorCode::InvalidTag);
    });
}

#[test]
fn test_characteristics() {
    with_engine(|km| {
        let mut params = hmac_key(256, Digest::Sha256, 32);
        params.push(KeyParam::ApplicationId(b"app".to_vec()));
        params.push(KeyParam::Nonce(vec![0; 12]));
        let result = km.generate_key(&params).unwrap();
        let chars = &result.characteristics;

        assert!(chars.hw_enforced.is_empty());
        assert!(has(chars, KeyParam::Algorithm(Algorithm::Hmac)));
        assert!(has(chars, KeyParam::MacLength(32)));
        assert!(has(chars, KeyParam::Origin(KeyOrigin::Generated)));
        assert!(chars.sw_enforced.iter().any(|p| matches!(p, KeyParam::CreationDatetime(_))));
        // Binding and per-operation tags are not recorded.
        assert!(!chars.sw_enforced.iter().any(|p| matches!(p, KeyParam::ApplicationId(_))));
        assert!(!chars.sw_enforced.iter().any(|p| matches!(p, KeyParam::Nonce(_))));

        let got = km.get_key_characteristics(&result.key_blob, Some(b"app"), None).unwrap();
        assert_eq!(&got, chars);
        let result = km.get_key_characteristics(&result.key_blob, None, None);
        assert_eq!(error_code(result), ErrorCode::InvalidKeyBlob);
    });
}

#[test]
fn test_characteristics_are_copies() {
    with_engine(|km| {
        let key = km.generate_key(&hmac_key(128, Digest::Sha256, 32)).unwrap();
        let mut chars = km.get_key_characteristics(&key.key_blob, None, None).unwrap();
        chars.sw_enforced.clear();
        chars.sw_enforced.push(KeyParam::Purpose(KeyPurpose::Encrypt));

        let again = km.get_key_characteristics(&key.key_blob, None, None).unwrap();
        assert_eq!(again, key.characteristics);
        let mac = process_message(km, KeyPurpose::Sign, &key.key_blob, &[], b"data").unwrap();
        assert_eq!(mac.len(), 32);
    });
}

#[test]
fn test_characteristics_simple_rsa() {
    with_engine(|km| {
        let key = km
            .generate_key(&rsa_signing_key(1024, PaddingMode::RsaPss, Digest::Sha256))
            .unwrap();
        let got = km.get_key_characteristics(&key.key_blob, None, None).unwrap();

        let expected = AuthorizationSet::from(key.characteristics.sw_enforced.clone());
        assert_eq!(AuthorizationSet::from(got.sw_enforced.clone()), expected);
        let reversed: Vec<KeyParam> = got.sw_enforced.iter().rev().cloned().collect();
        assert_eq!(AuthorizationSet::from(reversed), expected);
        assert!(expected.contains(&KeyParam::KeySize(KeySizeInBits(1024))));
        assert!(expected.contains(&KeyParam::Purpose(KeyPurpose::Verify)));
        assert!(got.hw_enforced.is_empty());

        let mut missing = got.sw_enforced;
        missing.retain(|p| *p != KeyParam::Purpose(KeyPurpose::Verify));
        assert_ne!(AuthorizationSet::from(missing), expected);
    });
}

#[test]
fn test_corrupt_key_blob() {
    with_engine(|km| {
        let key = km.generate_key(&hmac_key(128, Digest::Sha256, 32)).unwrap().key_blob;
        for i in [0, 1, key.len() / 2, key.len() - 9, key.len() - 1] {
            let mut corrupt = key.clone();
            corrupt[i] ^= 0x01;
            let result = km.get_key_characteristics(&corrupt, None, None);
            assert_eq!(error_code(result), ErrorCode::InvalidKeyBlob, "flip at {}", i);
            let result = km.begin(KeyPurpose::Sign, &corrupt, &[]);
            assert_eq!(error_code(result), ErrorCode::InvalidKeyBlob, "flip at {}", i);
        }
        for len in [0, 1, 8, key.len() - 1] {
            let result = km.begin(KeyPurpose::Sign, &key[..len], &[]);
            assert_eq!(error_code(result), ErrorCode::InvalidKeyBlob, "truncated to {}", len);
        }
        let mut extended = key.clone();
        extended.push(0);
        let result = km.get_key_characteristics(&extended, None, None);
        assert_eq!(error_code(result), ErrorCode::InvalidKeyBlob);
        assert_eq!(km.live_operations(), 0);
    });
}

#[test]
fn test_device_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = OpenSslBackend::default();
    let mut rng = OpenSslRng;
    let engine = SoftKeymaster::new(backend.implementation(&mut rng), EngineConfig::default());
    let mut dev = KeymasterDevice::new(engine);

    let mut algorithms = Vec::new();
    assert_eq!(dev.get_supported_algorithms(Some(&mut algorithms)), ErrorCode::Ok);
    assert_eq!(algorithms.len(), 4);

    let params = aes_key(256, BlockMode::Ecb, PaddingMode::Pkcs7);
    let mut key_blob = Vec::new();
    let mut chars = KeyCharacteristics::default();
    assert_eq!(dev.generate_key(&params, Some(&mut key_blob), Some(&mut chars)), ErrorCode::Ok);
    assert!(chars.sw_enforced.contains(&KeyParam::KeySize(KeySizeInBits(256))));

    let mut out_params = Vec::new();
    let mut op = OpHandle(0);
    let rc = dev.begin(KeyPurpose::Encrypt, &key_blob, &[], Some(&mut out_params), Some(&mut op));
    assert_eq!(rc, ErrorCode::Ok);
    assert!(out_params.is_empty());
    let (mut consumed, mut output) = (0, Vec::new());
    let rc = dev.update(op, &[], QUICK_FOX, Some(&mut consumed), Some(&mut output));
    assert_eq!(rc, ErrorCode::Ok);
    assert_eq!(consumed, QUICK_FOX.len());
    let mut ct = output.clone();
    assert_eq!(dev.finish(op, &[], &[], Some(&mut output)), ErrorCode::Ok);
    ct.extend_from_slice(&output);
    assert_eq!(ct.len(), 48);

    let pt = process_message(dev.engine(), KeyPurpose::Decrypt, &key_blob, &[], &ct).unwrap();
    assert_eq!(pt, QUICK_FOX);

    // Failures are reported as error codes, and leave the outputs alone.
    let mut export = vec![1, 2, 3];
    let rc = dev.export_key(KeyFormat::X509, &key_blob, None, None, Some(&mut export));
    assert_eq!(rc, ErrorCode::UnsupportedKeyFormat);
    assert_eq!(export, vec![1, 2, 3]);
    assert_eq!(dev.abort(op), ErrorCode::InvalidOperationHandle);
}
