//! Engine functionality related to in-progress crypto operations.

use crate::SoftKeymaster;
use alloc::{boxed::Box, vec::Vec};
use log::{debug, warn};
use skm_common::{
    crypto::{
        self, aes, AadOperation, AccumulatingOperation, EmittingOperation, KeyMaterial,
        SymmetricOperation, VerifyingOperation,
    },
    get_opt_tag_value, km_err,
    tag::{self, OperationMode},
    try_to_vec, Error, FallibleAllocExt,
};
use skm_wire::keymaster::{BeginResult, KeyParam, KeyPurpose};

/// Union holder for in-progress cryptographic operations, each of which is an instance
/// of the relevant trait.
pub(crate) enum CryptoOperation {
    Aes(Box<dyn EmittingOperation>),
    /// AES-CBC decryption whose IV is still being read from the start of the input.
    AesCbcAwaitingIv { key: aes::Key, mode: aes::Mode, iv: Vec<u8> },
    AesOcb(Box<dyn AadOperation>),
    HmacSign(Box<dyn AccumulatingOperation>, usize), // tag length
    HmacVerify(Box<dyn AccumulatingOperation>, usize), // tag length
    RsaCrypt(Box<dyn AccumulatingOperation>),
    RsaSign(Box<dyn AccumulatingOperation>),
    RsaVerify(Box<dyn VerifyingOperation>),
    EcSign(Box<dyn AccumulatingOperation>),
    EcVerify(Box<dyn VerifyingOperation>),
}

/// Current state of an operation.
pub(crate) struct Operation {
    /// Random handle used to identify the operation.
    pub handle: OpHandle,

    pub purpose: KeyPurpose,

    pub crypto_op: CryptoOperation,

    /// Output produced at begin time (a generated AES-CBC IV), emitted ahead of the first
    /// ciphertext.
    pub pending_output: Vec<u8>,
}

/// Newtype for operation handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpHandle(pub i64);

/// Direction of a cipher operation with the given purpose.
fn direction(purpose: KeyPurpose) -> Result<SymmetricOperation, Error> {
    match purpose {
        KeyPurpose::Encrypt => Ok(SymmetricOperation::Encrypt),
        KeyPurpose::Decrypt => Ok(SymmetricOperation::Decrypt),
        _ => Err(km_err!(IncompatiblePurpose, "purpose {:?} is not a cipher direction", purpose)),
    }
}

/// Feed `aad` (if any) to an AEAD operation.
fn apply_aad(op: &mut dyn AadOperation, aad: Option<&Vec<u8>>) -> Result<(), Error> {
    if let Some(aad) = aad {
        op.update_aad(aad)?;
    }
    Ok(())
}

impl<'a> SoftKeymaster<'a> {
    /// Start a new operation with the key in `key_blob`.  Any parameters generated by the
    /// engine (such as a fresh AES-OCB nonce) are returned in the result.
    pub fn begin(
        &mut self,
        purpose: KeyPurpose,
        key_blob: &[u8],
        params: &[KeyParam],
    ) -> Result<BeginResult, Error> {
        let op_idx = self.new_operation_index()?;
        let keyblob = self.keyblob_parse(key_blob, params)?;
        let mode = tag::check_begin_params(&keyblob.sw_enforced, purpose, params)?;
        tag::check_validity(&keyblob.sw_enforced, purpose, self.imp.clock.now())?;

        let mut out_params = Vec::new();
        let mut pending_output = Vec::new();
        let crypto_op = match (keyblob.key_material, mode) {
            (KeyMaterial::Rsa(key), OperationMode::RsaSign(mode)) => match purpose {
                KeyPurpose::Sign => CryptoOperation::RsaSign(self.imp.rsa.begin_sign(key, mode)?),
                _ => CryptoOperation::RsaVerify(self.imp.rsa.begin_verify(key, mode)?),
            },
            (KeyMaterial::Rsa(key), OperationMode::RsaCrypt(mode)) => {
                CryptoOperation::RsaCrypt(match direction(purpose)? {
                    SymmetricOperation::Encrypt => self.imp.rsa.begin_encrypt(key, mode)?,
                    SymmetricOperation::Decrypt => self.imp.rsa.begin_decrypt(key, mode)?,
                })
            }
            (KeyMaterial::Ec(curve, key), OperationMode::Ecdsa) => match purpose {
                KeyPurpose::Sign => CryptoOperation::EcSign(self.imp.ec.begin_sign(key, curve)?),
                _ => CryptoOperation::EcVerify(self.imp.ec.begin_verify(key, curve)?),
            },
            (KeyMaterial::Aes(key), OperationMode::Aes(mode)) => {
                self.begin_aes(key, mode, purpose, params, &mut out_params, &mut pending_output)?
            }
            (KeyMaterial::Hmac(key), OperationMode::Hmac { digest, mac_len }) => {
                let op = self.imp.hmac.begin(key, digest)?;
                match purpose {
                    KeyPurpose::Sign => CryptoOperation::HmacSign(op, mac_len),
                    _ => CryptoOperation::HmacVerify(op, mac_len),
                }
            }
            (key_material, mode) => {
                return Err(km_err!(
                    InvalidKeyBlob,
                    "{:?} key material inconsistent with {:?}",
                    key_material.algorithm(),
                    mode
                ))
            }
        };

        let op_handle = self.new_op_handle();
        debug!("begin {:?} operation {:?}", purpose, op_handle);
        self.operations[op_idx] = Some(Operation {
            handle: op_handle,
            purpose,
            crypto_op,
            pending_output,
        });
        Ok(BeginResult { op_handle: op_handle.0, params: out_params })
    }

    /// Start an AES operation.  Without a caller nonce, AES-CBC encryption emits a random IV
    /// ahead of the ciphertext and AES-CBC decryption reads it back from the start of the input;
    /// AES-OCB encryption generates a nonce and returns it in `out_params`.
    fn begin_aes(
        &mut self,
        key: aes::Key,
        mode: aes::Mode,
        purpose: KeyPurpose,
        params: &[KeyParam],
        out_params: &mut Vec<KeyParam>,
        pending_output: &mut Vec<u8>,
    ) -> Result<CryptoOperation, Error> {
        let dir = direction(purpose)?;
        match (&mode, dir) {
            (aes::Mode::Ecb { .. }, _) => {
                Ok(CryptoOperation::Aes(self.imp.aes.begin(key, mode.cipher_mode(None)?, dir)?))
            }
            (aes::Mode::Cbc { nonce: Some(iv), .. }, _) => {
                let cipher_mode = mode.cipher_mode(Some(*iv))?;
                Ok(CryptoOperation::Aes(self.imp.aes.begin(key, cipher_mode, dir)?))
            }
            (aes::Mode::Cbc { nonce: None, .. }, SymmetricOperation::Encrypt) => {
                let mut iv = [0u8; aes::BLOCK_SIZE];
                self.imp.rng.fill_bytes(&mut iv);
                pending_output.try_extend_from_slice(&iv)?;
                let cipher_mode = mode.cipher_mode(Some(iv))?;
                Ok(CryptoOperation::Aes(self.imp.aes.begin(key, cipher_mode, dir)?))
            }
            (aes::Mode::Cbc { nonce: None, .. }, SymmetricOperation::Decrypt) => {
                Ok(CryptoOperation::AesCbcAwaitingIv { key, mode: mode.clone(), iv: Vec::new() })
            }
            (aes::Mode::Ocb { chunk_len, nonce }, _) => {
                let nonce = match nonce {
                    Some(n) => *n,
                    None => {
                        let mut n = [0u8; aes::OCB_NONCE_SIZE];
                        self.imp.rng.fill_bytes(&mut n);
                        out_params.try_push(KeyParam::Nonce(try_to_vec(&n)?))?;
                        n
                    }
                };
                let ocb_mode = aes::OcbMode::new(&nonce, *chunk_len)?;
                let aad = get_opt_tag_value!(params, AssociatedData)?;
                let mut op = self.imp.aes.begin_aead(key, ocb_mode, dir)?;
                apply_aad(&mut *op, aad)?;
                Ok(CryptoOperation::AesOcb(op))
            }
        }
    }

    /// Feed data into an operation, returning the number of input bytes consumed and any
    /// output available so far.  The operation stays live if this fails; cryptographic failures
    /// (such as a bad AES-OCB chunk tag) are only reported by [`SoftKeymaster::finish`].
    pub fn update(
        &mut self,
        op_handle: OpHandle,
        params: &[KeyParam],
        data: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        let aad = get_opt_tag_value!(params, AssociatedData)?;
        let output = self.with_operation(op_handle, |imp, op| {
            let mut output = Vec::new();
            let mut data = data;
            if let CryptoOperation::AesCbcAwaitingIv { key, mode, iv } = &mut op.crypto_op {
                let len = core::cmp::min(aes::BLOCK_SIZE - iv.len(), data.len());
                iv.try_extend_from_slice(&data[..len])?;
                data = &data[len..];
                if iv.len() < aes::BLOCK_SIZE {
                    return Ok(output);
                }
                let iv: [u8; aes::BLOCK_SIZE] = iv
                    .as_slice()
                    .try_into()
                    .map_err(|_e| km_err!(UnknownError, "AES-CBC IV of {} bytes", iv.len()))?;
                let cipher_mode = mode.cipher_mode(Some(iv))?;
                let cipher =
                    imp.aes.begin(key.clone(), cipher_mode, SymmetricOperation::Decrypt)?;
                op.crypto_op = CryptoOperation::Aes(cipher);
            }
            match &mut op.crypto_op {
                CryptoOperation::Aes(op) => output.try_extend_from_slice(&op.update(data)?)?,
                CryptoOperation::AesOcb(op) => {
                    apply_aad(&mut **op, aad)?;
                    output.try_extend_from_slice(&op.update(data)?)?
                }
                CryptoOperation::AesCbcAwaitingIv { .. } => {
                    return Err(km_err!(UnknownError, "AES-CBC IV not consumed"))
                }
                CryptoOperation::HmacSign(op, _)
                | CryptoOperation::HmacVerify(op, _)
                | CryptoOperation::RsaCrypt(op)
                | CryptoOperation::RsaSign(op)
                | CryptoOperation::EcSign(op) => op.update(data)?,
                CryptoOperation::RsaVerify(op) | CryptoOperation::EcVerify(op) => op.update(data)?,
            }
            if !op.pending_output.is_empty() {
                let mut pending = core::mem::take(&mut op.pending_output);
                pending.try_extend_from_slice(&output)?;
                output = pending;
            }
            Ok(output)
        })?;
        Ok((data.len(), output))
    }

    /// Complete an operation.  For verification operations `signature` holds the signature or
    /// tag to check; it is ignored otherwise.  The operation is always terminated.
    pub fn finish(
        &mut self,
        op_handle: OpHandle,
        params: &[KeyParam],
        signature: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let op = self.take_operation(op_handle)?;
        let purpose = op.purpose;
        let result = self.op_finish(op, params, signature);
        match &result {
            Ok(output) => {
                debug!("finished {:?} operation {:?}, {} bytes", purpose, op_handle, output.len())
            }
            Err(e) => warn!("{:?} operation {:?} failed on finish: {:?}", purpose, op_handle, e),
        }
        result
    }

    fn op_finish(
        &self,
        op: Operation,
        params: &[KeyParam],
        signature: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut output = op.pending_output;
        match op.crypto_op {
            CryptoOperation::Aes(op) => {
                output.try_extend_from_slice(&op.finish()?)?;
                Ok(output)
            }
            CryptoOperation::AesCbcAwaitingIv { iv, .. } => Err(km_err!(
                InvalidInputLength,
                "AES-CBC input of {} bytes shorter than IV",
                iv.len()
            )),
            CryptoOperation::AesOcb(mut op) => {
                apply_aad(&mut *op, get_opt_tag_value!(params, AssociatedData)?)?;
                output.try_extend_from_slice(&op.finish()?)?;
                Ok(output)
            }
            CryptoOperation::HmacSign(op, tag_len) => {
                let mut tag = op.finish()?;
                tag.truncate(tag_len);
                Ok(tag)
            }
            CryptoOperation::HmacVerify(op, tag_len) => {
                if signature.len() != tag_len {
                    return Err(km_err!(
                        VerificationFailed,
                        "signature length {} differs from MAC length {}",
                        signature.len(),
                        tag_len
                    ));
                }
                let got = op.finish()?;
                let got = got
                    .get(..tag_len)
                    .ok_or_else(|| km_err!(UnknownError, "HMAC shorter than {}", tag_len))?;
                if self.imp.compare.eq(got, signature) {
                    Ok(Vec::new())
                } else {
                    Err(km_err!(VerificationFailed, "HMAC verify failed"))
                }
            }
            CryptoOperation::RsaCrypt(op)
            | CryptoOperation::RsaSign(op)
            | CryptoOperation::EcSign(op) => op.finish(),
            CryptoOperation::RsaVerify(op) | CryptoOperation::EcVerify(op) => {
                op.finish(signature)?;
                Ok(Vec::new())
            }
        }
    }

    /// Abandon an operation, discarding its state.
    pub fn abort(&mut self, op_handle: OpHandle) -> Result<(), Error> {
        let op = self.take_operation(op_handle)?;
        debug!("aborted {:?} operation {:?}", op.purpose, op_handle);
        Ok(())
    }

    /// Return the index of a free slot in the operations table.
    fn new_operation_index(&mut self) -> Result<usize, Error> {
        self.operations.iter().position(Option::is_none).ok_or_else(|| {
            km_err!(TooManyOperations, "current op count {} >= limit", self.operations.len())
        })
    }

    /// Return a new operation handle value that is not currently in use in the
    /// operations table.
    fn new_op_handle(&mut self) -> OpHandle {
        loop {
            let op_handle = OpHandle(self.imp.rng.next_u64() as i64);
            if self.op_index(op_handle).is_err() {
                return op_handle;
            }
            // op_handle already in use, go around again.
        }
    }

    /// Return the index into the operations table of an operation identified by `op_handle`.
    fn op_index(&self, op_handle: OpHandle) -> Result<usize, Error> {
        self.operations
            .iter()
            .position(|op| matches!(op, Some(op) if op.handle == op_handle))
            .ok_or_else(|| {
                km_err!(InvalidOperationHandle, "operation handle {:?} not found", op_handle)
            })
    }

    /// Execute the provided lambda over the associated [`Operation`], logging errors.  The
    /// operation stays in place whatever the outcome.
    fn with_operation<F, T>(&mut self, op_handle: OpHandle, f: F) -> Result<T, Error>
    where
        F: FnOnce(&crypto::Implementation<'a>, &mut Operation) -> Result<T, Error>,
    {
        let op_idx = self.op_index(op_handle)?;
        let op = self.operations[op_idx]
            .as_mut()
            .ok_or_else(|| km_err!(InvalidOperationHandle, "slot {} emptied", op_idx))?;
        let result = f(&self.imp, op);
        if let Err(e) = &result {
            warn!("{:?} operation {:?} update failed: {:?}", op.purpose, op_handle, e);
        }
        result
    }

    /// Return the associated [`Operation`], removing it.
    fn take_operation(&mut self, op_handle: OpHandle) -> Result<Operation, Error> {
        let op_idx = self.op_index(op_handle)?;
        self.operations[op_idx]
            .take()
            .ok_or_else(|| km_err!(InvalidOperationHandle, "slot {} emptied", op_idx))
    }
}
