use crate::{openssl_err, openssl_err_as};
use alloc::boxed::Box;
use alloc::vec::Vec;
use openssl::symm::{Cipher, Crypter};
use skm_common::{crypto, km_err, vec_try, Error};

/// [`crypto::Aes`] implementation based on OpenSSL.
#[derive(Default)]
pub struct OpenSslAes;

impl crypto::Aes for OpenSslAes {
    fn begin(
        &self,
        key: crypto::aes::Key,
        mode: crypto::aes::CipherMode,
        dir: crypto::SymmetricOperation,
    ) -> Result<Box<dyn crypto::EmittingOperation>, Error> {
        let dir_mode = match dir {
            crypto::SymmetricOperation::Encrypt => openssl::symm::Mode::Encrypt,
            crypto::SymmetricOperation::Decrypt => openssl::symm::Mode::Decrypt,
        };
        let mut crypter = match mode {
            crypto::aes::CipherMode::EcbNoPadding | crypto::aes::CipherMode::EcbPkcs7Padding => {
                let cipher = match &key {
                    crypto::aes::Key::Aes128(_) => Cipher::aes_128_ecb(),
                    crypto::aes::Key::Aes192(_) => Cipher::aes_192_ecb(),
                    crypto::aes::Key::Aes256(_) => Cipher::aes_256_ecb(),
                };
                Crypter::new(cipher, dir_mode, key.as_bytes(), None)
                    .map_err(openssl_err!("failed to create ECB Crypter"))?
            }

            crypto::aes::CipherMode::CbcNoPadding { nonce: n }
            | crypto::aes::CipherMode::CbcPkcs7Padding { nonce: n } => {
                let cipher = match &key {
                    crypto::aes::Key::Aes128(_) => Cipher::aes_128_cbc(),
                    crypto::aes::Key::Aes192(_) => Cipher::aes_192_cbc(),
                    crypto::aes::Key::Aes256(_) => Cipher::aes_256_cbc(),
                };
                Crypter::new(cipher, dir_mode, key.as_bytes(), Some(&n[..]))
                    .map_err(openssl_err!("failed to create CBC Crypter"))?
            }
        };
        crypter.pad(mode.is_padded());

        Ok(Box::new(OpenSslAesOperation { crypter, mode, dir, input_len: 0 }))
    }

    fn ocb_chunk_cipher(
        &self,
        key: crypto::aes::Key,
        tag_len: usize,
    ) -> Result<Box<dyn crypto::ChunkCipher>, Error> {
        if tag_len != crypto::aes::OCB_TAG_SIZE {
            return Err(km_err!(InvalidArgument, "unsupported AES-OCB tag length {}", tag_len));
        }
        let cipher = match &key {
            crypto::aes::Key::Aes128(_) => Cipher::aes_128_ocb(),
            crypto::aes::Key::Aes192(_) => Cipher::aes_192_ocb(),
            crypto::aes::Key::Aes256(_) => Cipher::aes_256_ocb(),
        };
        Ok(Box::new(OpenSslOcbChunkCipher { cipher, key, tag_len }))
    }
}

/// [`crypto::EmittingOperation`] implementation for AES-ECB and AES-CBC based on OpenSSL.
pub struct OpenSslAesOperation {
    crypter: openssl::symm::Crypter,
    mode: crypto::aes::CipherMode,
    dir: crypto::SymmetricOperation,
    // Total input so far, to detect a trailing partial block.
    input_len: usize,
}

impl crypto::EmittingOperation for OpenSslAesOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut output = vec_try![0; data.len() + crypto::aes::BLOCK_SIZE]?;
        let out_len = self
            .crypter
            .update(data, &mut output)
            .map_err(openssl_err!("update {} bytes from input failed", data.len()))?;
        self.input_len += data.len();
        output.truncate(out_len);
        Ok(output)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        let partial = self.input_len % crypto::aes::BLOCK_SIZE;
        let padded_encrypt =
            self.mode.is_padded() && self.dir == crypto::SymmetricOperation::Encrypt;
        if partial != 0 && !padded_encrypt {
            return Err(km_err!(
                InvalidInputLength,
                "{} bytes of input is not a multiple of the block size for {:?} {:?}",
                self.input_len,
                self.mode,
                self.dir
            ));
        }
        let mut output = vec_try![0; crypto::aes::BLOCK_SIZE * 2]?;
        let out_len = if self.mode.is_padded() {
            self.crypter
                .finalize(&mut output)
                .map_err(openssl_err_as!(InvalidArgument, "invalid PKCS#7 padding"))?
        } else {
            self.crypter.finalize(&mut output).map_err(openssl_err!("failed to finalize"))?
        };
        output.truncate(out_len);
        Ok(output)
    }
}

/// [`crypto::ChunkCipher`] implementation for single-chunk AES-OCB based on OpenSSL.
pub struct OpenSslOcbChunkCipher {
    cipher: Cipher,
    key: crypto::aes::Key,
    tag_len: usize,
}

impl crypto::ChunkCipher for OpenSslOcbChunkCipher {
    fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let mut tag = vec_try![0; self.tag_len]?;
        let mut output = openssl::symm::encrypt_aead(
            self.cipher,
            self.key.as_bytes(),
            Some(nonce),
            aad,
            plaintext,
            &mut tag,
        )
        .map_err(openssl_err!("AES-OCB seal of {} bytes failed", plaintext.len()))?;
        output.try_reserve(tag.len())?;
        output.extend_from_slice(&tag);
        Ok(output)
    }

    fn open(&self, nonce: &[u8], aad: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        if data.len() < self.tag_len {
            return Err(km_err!(
                VerificationFailed,
                "AES-OCB input of {} bytes shorter than tag",
                data.len()
            ));
        }
        let (ciphertext, tag) = data.split_at(data.len() - self.tag_len);
        openssl::symm::decrypt_aead(
            self.cipher,
            self.key.as_bytes(),
            Some(nonce),
            aad,
            ciphertext,
            tag,
        )
        .map_err(openssl_err_as!(VerificationFailed, "AES-OCB tag check failed"))
    }
}
