use skm_common::Error;
use skm_engine::{OpHandle, SoftKeymaster};
use skm_tests::{
    aes_key, error_code, hex, hmac_key, ocb_key, process_in_chunks, process_message, sign,
    verify, with_engine,
};
use skm_wire::keymaster::{
    Algorithm, BlockMode, Digest, ErrorCode, KeyFormat, KeyParam, KeyPurpose, PaddingMode,
};

#[test]
fn test_aes_round_trips() {
    let cases = [
        (128, BlockMode::Ecb, PaddingMode::Pkcs7, 33),
        (192, BlockMode::Ecb, PaddingMode::None, 48),
        (256, BlockMode::Cbc, PaddingMode::Pkcs7, 0),
        (256, BlockMode::Cbc, PaddingMode::None, 64),
        (128, BlockMode::Ocb, PaddingMode::None, 100),
    ];
    with_engine(|km| {
        for (size, block_mode, padding, len) in cases {
            let mut params = aes_key(size, block_mode, padding);
            if block_mode == BlockMode::Ocb {
                params.push(KeyParam::ChunkLength(32));
                params.push(KeyParam::MacLength(16));
            }
            let key = km.generate_key(&params).unwrap().key_blob;
            let msg = vec![0x5a; len];

            let begin = km.begin(KeyPurpose::Encrypt, &key, &[]).unwrap();
            let op = OpHandle(begin.op_handle);
            let (_, mut ct) = km.update(op, &[], &msg).unwrap();
            ct.extend_from_slice(&km.finish(op, &[], &[]).unwrap());
            assert_ne!(ct, msg, "for {:?}", block_mode);

            let pt =
                process_in_chunks(km, KeyPurpose::Decrypt, &key, &begin.params, &ct, 7, &[])
                    .unwrap();
            assert_eq!(pt, msg, "for {:?} {:?} with {} bytes", block_mode, padding, len);
        }
    });
}

#[test]
fn test_aes_ecb_known_answer() {
    // FIPS-197 appendix C.1.
    let params = [
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::BlockMode(BlockMode::Ecb),
        KeyParam::Padding(PaddingMode::None),
    ];
    with_engine(|km| {
        let key = km
            .import_key(&params, KeyFormat::Raw, &hex("000102030405060708090a0b0c0d0e0f"))
            .unwrap()
            .key_blob;
        let pt = hex("00112233445566778899aabbccddeeff");
        let ct = process_message(km, KeyPurpose::Encrypt, &key, &[], &pt).unwrap();
        assert_eq!(::hex::encode(ct), "69c4e0d86a7b0430d8cdb78070b4c55a");

        // The key does not authorize decryption.
        let result = km.begin(KeyPurpose::Decrypt, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::IncompatiblePurpose);
    });
}

#[test]
fn test_aes_mode_not_authorized() {
    with_engine(|km| {
        let key = km
            .generate_key(&aes_key(128, BlockMode::Ecb, PaddingMode::None))
            .unwrap()
            .key_blob;
        let cbc = [KeyParam::BlockMode(BlockMode::Cbc)];
        let result = km.begin(KeyPurpose::Encrypt, &key, &cbc);
        assert_eq!(error_code(result), ErrorCode::IncompatibleBlockMode);
        let pkcs7 = [KeyParam::Padding(PaddingMode::Pkcs7)];
        let result = km.begin(KeyPurpose::Encrypt, &key, &pkcs7);
        assert_eq!(error_code(result), ErrorCode::IncompatiblePaddingMode);
        let result = km.begin(KeyPurpose::Sign, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::UnsupportedPurpose);
    });
}

#[test]
fn test_ocb_ciphertext_size() {
    let cases = [(1, 128, 2176), (16, 0, 16), (16, 16, 32), (16, 17, 49), (4096, 1000, 1016)];
    with_engine(|km| {
        for (chunk_len, len, want) in cases {
            let key = km.generate_key(&ocb_key(chunk_len)).unwrap().key_blob;
            let msg = vec![0xa5; len];
            let begin = km.begin(KeyPurpose::Encrypt, &key, &[]).unwrap();
            let op = OpHandle(begin.op_handle);
            let (_, mut ct) = km.update(op, &[], &msg).unwrap();
            ct.extend_from_slice(&km.finish(op, &[], &[]).unwrap());
            assert_eq!(ct.len(), want, "for chunk length {} and {} bytes", chunk_len, len);

            let pt =
                process_in_chunks(km, KeyPurpose::Decrypt, &key, &begin.params, &ct, 13, &[])
                    .unwrap();
            assert_eq!(pt, msg);
        }
    });
}

#[test]
fn test_ocb_rfc7253_vectors() {
    // RFC 7253 appendix A, with a chunk length larger than any of the messages.
    let tests = [
        ("bbaa99887766554433221100", "", "", "785407bfffc8ad9edcc5520ac9111ee6"),
        (
            "bbaa99887766554433221101",
            "0001020304050607",
            "0001020304050607",
            "6820b3657b6f615a5725bda0d3b4eb3a257c9af1f8f03009",
        ),
        ("bbaa99887766554433221102", "0001020304050607", "", "81017f8203f081277152fade694a0a00"),
        (
            "bbaa99887766554433221103",
            "",
            "0001020304050607",
            "45dd69f8f5aae72414054cd1f35d82760b2cd00d2f99bfa9",
        ),
        (
            "bbaa99887766554433221107",
            "000102030405060708090a0b0c0d0e0f1011121314151617",
            "000102030405060708090a0b0c0d0e0f1011121314151617",
            concat!(
                "1ca2207308c87c010756104d8840ce1952f09673a448a122",
                "c92c62241051f57356d7f3c90bb0e07f"
            ),
        ),
    ];
    let mut params = ocb_key(4096);
    params.retain(|p| !matches!(p, KeyParam::KeySize(_)));
    params.push(KeyParam::CallerNonce);
    with_engine(|km| {
        let key = km
            .import_key(&params, KeyFormat::Raw, &hex("000102030405060708090a0b0c0d0e0f"))
            .unwrap()
            .key_blob;
        for (nonce, aad, pt, want) in tests {
            let begin_params = [KeyParam::Nonce(hex(nonce)), KeyParam::AssociatedData(hex(aad))];
            let begin = km.begin(KeyPurpose::Encrypt, &key, &begin_params).unwrap();
            assert!(begin.params.is_empty(), "caller nonce should not be echoed");
            let op = OpHandle(begin.op_handle);
            let (_, mut ct) = km.update(op, &[], &hex(pt)).unwrap();
            ct.extend_from_slice(&km.finish(op, &[], &[]).unwrap());
            assert_eq!(::hex::encode(&ct), want);

            let got =
                process_message(km, KeyPurpose::Decrypt, &key, &begin_params, &ct).unwrap();
            assert_eq!(::hex::encode(got), pt);

            let mut corrupt = ct.clone();
            corrupt[ct.len() - 1] ^= 0x01;
            let result = process_message(km, KeyPurpose::Decrypt, &key, &begin_params, &corrupt);
            assert_eq!(error_code(result), ErrorCode::VerificationFailed);
        }
    });
}

/// Decrypt a two-chunk AES-OCB ciphertext, switching the associated data to `aad` before the
/// second chunk.
fn decrypt_two_chunks(
    km: &mut SoftKeymaster,
    key: &[u8],
    params: &[KeyParam],
    ct: &[u8],
    aad: &[KeyParam],
) -> Result<Vec<u8>, Error> {
    let split = ct.len() / 2;
    let op = OpHandle(km.begin(KeyPurpose::Decrypt, key, params)?.op_handle);
    let (_, mut pt) = km.update(op, &[], &ct[..split])?;
    pt.extend_from_slice(&km.update(op, aad, &ct[split..])?.1);
    pt.extend_from_slice(&km.finish(op, &[], &[])?);
    Ok(pt)
}

#[test]
fn test_ocb_associated_data_per_chunk() {
    with_engine(|km| {
        let key = km.generate_key(&ocb_key(8)).unwrap().key_blob;
        let first = [KeyParam::AssociatedData(b"first".to_vec())];
        let second = [KeyParam::AssociatedData(b"second".to_vec())];

        let begin = km.begin(KeyPurpose::Encrypt, &key, &first).unwrap();
        let op = OpHandle(begin.op_handle);
        let (_, mut ct) = km.update(op, &[], b"01234567").unwrap();
        ct.extend_from_slice(&km.update(op, &second, b"89abcdef").unwrap().1);
        ct.extend_from_slice(&km.finish(op, &[], &[]).unwrap());
        assert_eq!(ct.len(), 16 + 2 * 16);

        let mut params = vec![begin.params[0].clone()];
        params.extend_from_slice(&first);
        let pt = decrypt_two_chunks(km, &key, &params, &ct, &second).unwrap();
        assert_eq!(pt, b"0123456789abcdef");
        let result = decrypt_two_chunks(km, &key, &params, &ct, &first);
        assert_eq!(error_code(result), ErrorCode::VerificationFailed);
    });
}

#[test]
fn test_ocb_tag_failure_reported_on_finish() {
    with_engine(|km| {
        let key = km.generate_key(&ocb_key(16)).unwrap().key_blob;
        let msg = [0x5au8; 48];
        let begin = km.begin(KeyPurpose::Encrypt, &key, &[]).unwrap();
        let op = OpHandle(begin.op_handle);
        let (_, mut ct) = km.update(op, &[], &msg).unwrap();
        ct.extend_from_slice(&km.finish(op, &[], &[]).unwrap());
        assert_eq!(ct.len(), 64);

        let mut corrupt = ct.clone();
        corrupt[3] ^= 0x01;
        let op = OpHandle(km.begin(KeyPurpose::Decrypt, &key, &begin.params).unwrap().op_handle);
        let (consumed, out) = km.update(op, &[], &corrupt).unwrap();
        assert_eq!(consumed, corrupt.len());
        assert!(out.is_empty());
        assert_eq!(error_code(km.finish(op, &[], &[])), ErrorCode::VerificationFailed);
        assert_eq!(error_code(km.abort(op)), ErrorCode::InvalidOperationHandle);
    });
}

#[test]
fn test_ocb_parameter_errors() {
    with_engine(|km| {
        // No chunk length bound to the key.
        let mut params = aes_key(128, BlockMode::Ocb, PaddingMode::None);
        params.push(KeyParam::MacLength(16));
        let key = km.generate_key(&params).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Encrypt, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::InvalidArgument);

        // Only full-size tags are supported.
        let mut params = aes_key(128, BlockMode::Ocb, PaddingMode::None);
        params.push(KeyParam::ChunkLength(64));
        params.push(KeyParam::MacLength(12));
        let key = km.generate_key(&params).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Encrypt, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::InvalidArgument);

        // Decryption needs the nonce used for encryption.
        let key = km.generate_key(&ocb_key(64)).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Decrypt, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::InvalidArgument);

        // A chunk length in the begin parameters must agree with the key.
        let result = km.begin(KeyPurpose::Encrypt, &key, &[KeyParam::ChunkLength(32)]);
        assert_eq!(error_code(result), ErrorCode::InvalidArgument);
    });
}

#[test]
fn test_hmac_rfc4231_vectors() {
    // RFC 4231 section 4.3.
    let tests = [
        (Digest::Sha224, "a30e01098bc6dbbf45690f3a7e9e6d0f8bbea2a39e6148008fd05e44"),
        (Digest::Sha256, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"),
        (
            Digest::Sha384,
            concat!(
                "af45d2e376484031617f78d2b58a6b1b9c7ef464f5a01b47",
                "e42ec3736322445e8e2240ca5e69e2c78b3239ecfab21649"
            ),
        ),
        (
            Digest::Sha512,
            concat!(
                "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554",
                "9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
            ),
        ),
    ];
    with_engine(|km| {
        for (digest, want) in tests {
            let mac_len = want.len() as u32 / 2;
            let mut params = hmac_key(0, digest, mac_len);
            params.retain(|p| !matches!(p, KeyParam::KeySize(_)));
            let result = km.import_key(&params, KeyFormat::Raw, b"Jefe").unwrap();
            assert!(result
                .characteristics
                .sw_enforced
                .contains(&KeyParam::KeySize(skm_wire::KeySizeInBits(32))));

            let msg = b"what do ya want for nothing?";
            let mac = sign(km, &result.key_blob, &[], msg).unwrap();
            assert_eq!(::hex::encode(&mac), want, "for {:?}", digest);
            verify(km, &result.key_blob, &[], msg, &mac).unwrap();
        }
    });
}

#[test]
fn test_hmac_truncated_mac() {
    with_engine(|km| {
        let full = km.generate_key(&hmac_key(128, Digest::Sha256, 32)).unwrap();
        let key = full.key_blob;
        let mac = sign(km, &key, &[], b"Hello").unwrap();
        assert_eq!(mac.len(), 32);

        let params = hmac_key(0, Digest::Sha256, 16);
        let params: Vec<_> =
            params.into_iter().filter(|p| !matches!(p, KeyParam::KeySize(_))).collect();
        let key = km.import_key(&params, KeyFormat::Raw, &[0x0b; 20]).unwrap().key_blob;
        let mac = sign(km, &key, &[], b"Hi There").unwrap();
        // RFC 4231 section 4.2, truncated to 128 bits.
        assert_eq!(::hex::encode(&mac), "b0344c61d8db38535ca8afceaf0bf12b");

        let mut corrupt = mac.clone();
        corrupt[15] ^= 0x01;
        let result = verify(km, &key, &[], b"Hi There", &corrupt);
        assert_eq!(error_code(result), ErrorCode::VerificationFailed);
        let result = verify(km, &key, &[], b"Hi There", &mac[..15]);
        assert_eq!(error_code(result), ErrorCode::VerificationFailed);
        let result = verify(km, &key, &[], b"Hi there", &mac);
        assert_eq!(error_code(result), ErrorCode::VerificationFailed);
    });
}

#[test]
fn test_hmac_mac_length_errors() {
    with_engine(|km| {
        let key = km.generate_key(&hmac_key(128, Digest::Sha256, 33)).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Sign, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::UnsupportedMacLength);

        let key = km.generate_key(&hmac_key(128, Digest::Sha256, 0)).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Sign, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::UnsupportedMacLength);

        let mut params = hmac_key(128, Digest::Sha256, 32);
        params.retain(|p| !matches!(p, KeyParam::MacLength(_)));
        let key = km.generate_key(&params).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Sign, &key, &[]);
        assert_eq!(error_code(result), ErrorCode::UnsupportedMacLength);

        let key = km.generate_key(&hmac_key(128, Digest::Sha256, 32)).unwrap().key_blob;
        let result = km.begin(KeyPurpose::Sign, &key, &[KeyParam::Digest(Digest::Sha512)]);
        assert_eq!(error_code(result), ErrorCode::IncompatibleDigest);
    });
}
