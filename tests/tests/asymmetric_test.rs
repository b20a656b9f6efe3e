use skm_engine::OpHandle;
use skm_tests::{
    ec_signing_key, error_code, hex, import, process_message, rsa_encryption_key,
    rsa_signing_key, sign, verify, with_engine, P256_PKCS8, P256_SPKI, QUICK_FOX,
    RSA_1024_PKCS1_SHA256_SIG, RSA_1024_PKCS8, RSA_1024_SPKI,
};
use skm_wire::{
    keymaster::{Algorithm, Digest, ErrorCode, KeyFormat, KeyParam, KeyPurpose, PaddingMode},
    KeySizeInBits, RsaExponent,
};

/// Key parameters for importing a fixture key, leaving size and exponent to be deduced.
fn import_params(algorithm: Algorithm, extra: &[KeyParam]) -> Vec<KeyParam> {
    let mut params = vec![
        KeyParam::Algorithm(algorithm),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::Verify),
    ];
    params.extend_from_slice(extra);
    params
}

#[test]
fn test_rsa_sign_verify() {
    // Unpadded input must be exactly the key length, and below the modulus.
    let mut raw_block = vec![0x5a; 128];
    raw_block[0] = 0;
    let cases = [
        (PaddingMode::RsaPkcs115Sign, Digest::Sha256, QUICK_FOX.to_vec()),
        (PaddingMode::RsaPkcs115Sign, Digest::None, QUICK_FOX.to_vec()),
        (PaddingMode::RsaPss, Digest::Sha256, QUICK_FOX.to_vec()),
        (PaddingMode::None, Digest::Sha256, QUICK_FOX.to_vec()),
        (PaddingMode::None, Digest::None, raw_block),
    ];
    with_engine(|km| {
        for (padding, digest, msg) in cases {
            let key = km.generate_key(&rsa_signing_key(1024, padding, digest)).unwrap().key_blob;
            let sig = sign(km, &key, &[], &msg).unwrap();
            assert_eq!(sig.len(), 128, "for {:?} {:?}", padding, digest);
            verify(km, &key, &[], &msg, &sig).unwrap();

            let mut corrupt = sig.clone();
            corrupt[10] ^= 0x80;
            let result = verify(km, &key, &[], &msg, &corrupt);
            assert_eq!(error_code(result), ErrorCode::VerificationFailed);
            let mut other = msg.clone();
            other[5] ^= 0x01;
            let result = verify(km, &key, &[], &other, &sig);
            assert_eq!(error_code(result), ErrorCode::VerificationFailed);
        }
    });
}

#[test]
fn test_rsa_pkcs1_known_answer() {
    let extra = [
        KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        KeyParam::Digest(Digest::Sha256),
    ];
    with_engine(|km| {
        let params = import_params(Algorithm::Rsa, &extra);
        let key = import(km, &params, KeyFormat::Pkcs8, RSA_1024_PKCS8).unwrap();
        let sig = sign(km, &key, &[], QUICK_FOX).unwrap();
        assert_eq!(::hex::encode(&sig), RSA_1024_PKCS1_SHA256_SIG);
        verify(km, &key, &[], QUICK_FOX, &hex(RSA_1024_PKCS1_SHA256_SIG)).unwrap();
    });
}

#[test]
fn test_rsa_unpadded_input_length() {
    with_engine(|km| {
        let params = rsa_signing_key(1024, PaddingMode::None, Digest::None);
        let key = km.generate_key(&params).unwrap().key_blob;

        // Too much input is accepted as it arrives and fails on completion.
        let op = OpHandle(km.begin(KeyPurpose::Sign, &key, &[]).unwrap().op_handle);
        km.update(op, &[], &[0; 100]).unwrap();
        let (consumed, out) = km.update(op, &[], &[0; 29]).unwrap();
        assert_eq!((consumed, out.len()), (29, 0));
        assert_eq!(error_code(km.finish(op, &[], &[])), ErrorCode::UnknownError);
        assert_eq!(error_code(km.abort(op)), ErrorCode::InvalidOperationHandle);

        // Too little input only shows up on completion.
        let result = sign(km, &key, &[], &[0; 100]);
        assert_eq!(error_code(result), ErrorCode::UnknownError);
    });
}

#[test]
fn test_rsa_pss_key_too_small() {
    with_engine(|km| {
        let params = rsa_signing_key(328, PaddingMode::RsaPss, Digest::Sha256);
        let key = km.generate_key(&params).unwrap().key_blob;
        let op = OpHandle(km.begin(KeyPurpose::Sign, &key, &[]).unwrap().op_handle);
        km.update(op, &[], QUICK_FOX).unwrap();
        assert_eq!(error_code(km.finish(op, &[], &[])), ErrorCode::IncompatibleDigest);

        let params = rsa_signing_key(336, PaddingMode::RsaPss, Digest::Sha256);
        let key = km.generate_key(&params).unwrap().key_blob;
        let sig = sign(km, &key, &[], QUICK_FOX).unwrap();
        verify(km, &key, &[], QUICK_FOX, &sig).unwrap();
    });
}

#[test]
fn test_rsa_begin_errors() {
    with_engine(|km| {
        let params = rsa_signing_key(512, PaddingMode::RsaPss, Digest::None);
        let key = km.generate_key(&params).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Sign, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::IncompatibleDigest);

        let params = rsa_signing_key(512, PaddingMode::RsaPkcs115Sign, Digest::Sha256);
        let key = km.generate_key(&params).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Sign, &key, &[KeyParam::Digest(Digest::None)]);
        assert_eq!(error_code(result), ErrorCode::IncompatibleDigest);
        let result = km.begin(KeyPurpose::Sign, &key, &[KeyParam::Padding(PaddingMode::RsaPss)]);
        assert_eq!(error_code(result), ErrorCode::IncompatiblePaddingMode);
        let result = km.begin(KeyPurpose::Encrypt, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::IncompatiblePurpose);

        let mut params = rsa_signing_key(512, PaddingMode::RsaPss, Digest::Sha256);
        params.retain(|p| !matches!(p, KeyParam::Padding(_)));
        let key = km.generate_key(&params).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Sign, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::UnsupportedPaddingMode);
    });
}

#[test]
fn test_rsa_encrypt_decrypt() {
    with_engine(|km| {
        let cases = [(PaddingMode::RsaOaep, 86), (PaddingMode::RsaPkcs115Encrypt, 117)];
        for (padding, max_len) in cases {
            let key = km.generate_key(&rsa_encryption_key(1024, padding)).unwrap().key_blob;
            let msg = vec![0x42; max_len];
            let ct1 = process_message(km, KeyPurpose::Encrypt, &key, &[], &msg).unwrap();
            let ct2 = process_message(km, KeyPurpose::Encrypt, &key, &[], &msg).unwrap();
            assert_eq!(ct1.len(), 128);
            assert_ne!(ct1, ct2, "padding for {:?} should be randomized", padding);
            let pt = process_message(km, KeyPurpose::Decrypt, &key, &[], &ct1).unwrap();
            assert_eq!(pt, msg);

            // Over-long plaintext is accepted by update but fails on completion.
            let op = OpHandle(km.begin(KeyPurpose::Encrypt, &key, &[]).unwrap().op_handle);
            km.update(op, &[], &msg).unwrap();
            km.update(op, &[], &[0x42]).unwrap();
            assert_eq!(error_code(km.finish(op, &[], &[])), ErrorCode::InvalidInputLength);

            // Over-long ciphertext is also only rejected on completion.
            let op = OpHandle(km.begin(KeyPurpose::Decrypt, &key, &[]).unwrap().op_handle);
            km.update(op, &[], &ct1).unwrap();
            km.update(op, &[], &[0]).unwrap();
            assert_eq!(error_code(km.finish(op, &[], &[])), ErrorCode::InvalidInputLength);

            let mut corrupt = ct1.clone();
            corrupt[0] ^= 0x01;
            // PKCS#1 v1.5 decryption may yield a synthetic plaintext instead of an error.
            let result = process_message(km, KeyPurpose::Decrypt, &key, &[], &corrupt);
            assert!(result.map_or(true, |pt| pt != msg));
        }
    });
}

#[test]
fn test_ecdsa_sign_verify() {
    with_engine(|km| {
        for size in [224, 256, 384, 521] {
            let key = km.generate_key(&ec_signing_key(size, Digest::None)).unwrap().key_blob;
            let sig = sign(km, &key, &[], QUICK_FOX).unwrap();
            verify(km, &key, &[], QUICK_FOX, &sig).unwrap();

            let mut corrupt = sig.clone();
            corrupt[10] ^= 0x01;
            let result = verify(km, &key, &[], QUICK_FOX, &corrupt);
            assert_eq!(error_code(result), ErrorCode::VerificationFailed);
            let result = verify(km, &key, &[], b"The quick brown cat", &sig);
            assert_eq!(error_code(result), ErrorCode::VerificationFailed);
            let result = verify(km, &key, &[], QUICK_FOX, b"not DER");
            assert_eq!(error_code(result), ErrorCode::VerificationFailed);
        }
    });
}

#[test]
fn test_ecdsa_truncates_message() {
    with_engine(|km| {
        let key = km.generate_key(&ec_signing_key(224, Digest::None)).unwrap().key_blob;
        let sig = sign(km, &key, &[], QUICK_FOX).unwrap();

        // Only the first 28 bytes of the message take part in a P-224 signature.
        let mut tail_changed = QUICK_FOX.to_vec();
        tail_changed[40] ^= 0x01;
        verify(km, &key, &[], &tail_changed, &sig).unwrap();
        let mut head_changed = QUICK_FOX.to_vec();
        head_changed[27] ^= 0x01;
        let result = verify(km, &key, &[], &head_changed, &sig);
        assert_eq!(error_code(result), ErrorCode::VerificationFailed);
    });
}

#[test]
fn test_import_export() {
    with_engine(|km| {
        let params = import_params(
            Algorithm::Rsa,
            &[KeyParam::Padding(PaddingMode::RsaPss), KeyParam::Digest(Digest::Sha256)],
        );
        let result = km.import_key(&params, KeyFormat::Pkcs8, &hex(RSA_1024_PKCS8)).unwrap();
        let chars = &result.characteristics.sw_enforced;
        assert!(chars.contains(&KeyParam::KeySize(KeySizeInBits(1024))));
        assert!(chars.contains(&KeyParam::RsaPublicExponent(RsaExponent(65537))));
        let spki = km.export_key(KeyFormat::X509, &result.key_blob, None, None).unwrap();
        assert_eq!(::hex::encode(spki), RSA_1024_SPKI);
        let result = km.export_key(KeyFormat::Pkcs8, &result.key_blob, None, None);
        assert_eq!(error_code(result), ErrorCode::UnsupportedKeyFormat);

        let params = import_params(Algorithm::Ec, &[]);
        let result = km.import_key(&params, KeyFormat::Pkcs8, &hex(P256_PKCS8)).unwrap();
        let chars = &result.characteristics.sw_enforced;
        assert!(chars.contains(&KeyParam::KeySize(KeySizeInBits(256))));
        let spki = km.export_key(KeyFormat::X509, &result.key_blob, None, None).unwrap();
        assert_eq!(::hex::encode(spki), P256_SPKI);

        // The imported key is usable.
        let sig = sign(km, &result.key_blob, &[], QUICK_FOX).unwrap();
        verify(km, &result.key_blob, &[], QUICK_FOX, &sig).unwrap();
    });
}

#[test]
fn test_import_mismatch() {
    with_engine(|km| {
        let size = [KeyParam::KeySize(KeySizeInBits(2048))];
        let params = import_params(Algorithm::Rsa, &size);
        let result = import(km, &params, KeyFormat::Pkcs8, RSA_1024_PKCS8);
        assert_eq!(error_code(result), ErrorCode::ImportParameterMismatch);

        let exponent = [KeyParam::RsaPublicExponent(RsaExponent(3))];
        let params = import_params(Algorithm::Rsa, &exponent);
        let result = import(km, &params, KeyFormat::Pkcs8, RSA_1024_PKCS8);
        assert_eq!(error_code(result), ErrorCode::ImportParameterMismatch);

        let size = [KeyParam::KeySize(KeySizeInBits(224))];
        let params = import_params(Algorithm::Ec, &size);
        let result = import(km, &params, KeyFormat::Pkcs8, P256_PKCS8);
        assert_eq!(error_code(result), ErrorCode::ImportParameterMismatch);

        // Key material of the wrong algorithm.
        let params = import_params(Algorithm::Ec, &[]);
        let result = import(km, &params, KeyFormat::Pkcs8, RSA_1024_PKCS8);
        assert_eq!(error_code(result), ErrorCode::ImportParameterMismatch);

        let params = import_params(Algorithm::Rsa, &[]);
        let result = import(km, &params, KeyFormat::Raw, RSA_1024_PKCS8);
        assert_eq!(error_code(result), ErrorCode::UnsupportedKeyFormat);
    });
}
