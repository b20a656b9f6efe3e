//! Chunked AES-OCB framing.
//!
//! Plaintext is split into chunks of `chunk_len` bytes (the last one possibly shorter, and
//! always at least one chunk), and each chunk is sealed independently:
//!
//! ```text
//! ciphertext = seal(N+0, AD, P[0]) || seal(N+1, AD, P[1]) || ... || seal(N+k-1, AD, P[k-1])
//! ```
//!
//! where each `seal` emits the chunk's ciphertext followed by its tag, and `N+i` is the initial
//! nonce treated as a big-endian integer incremented by the chunk index.  The ciphertext for
//! `L` bytes of plaintext is therefore `L + tag_len * max(1, ceil(L / chunk_len))` bytes.

use super::{aes, AadOperation, ChunkCipher, EmittingOperation, SymmetricOperation};
use crate::{km_err, try_to_vec, wire::keymaster::ErrorCode, Error, FallibleAllocExt};
use alloc::{boxed::Box, vec::Vec};
use log::{debug, warn};

/// Calculate the nonce for chunk `index`.
pub fn chunk_nonce(
    nonce: &[u8; aes::OCB_NONCE_SIZE],
    index: u64,
) -> Result<[u8; aes::OCB_NONCE_SIZE], Error> {
    let mut result = *nonce;
    let mut carry = index as u128;
    for b in result.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = *b as u128 + (carry & 0xff);
        *b = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    if carry != 0 {
        return Err(km_err!(InvalidArgument, "AES-OCB nonce space exhausted at chunk {}", index));
    }
    Ok(result)
}

/// Size of the ciphertext produced for `len` bytes of plaintext.
pub fn ciphertext_len(len: usize, chunk_len: usize, tag_len: usize) -> usize {
    let chunks = if len == 0 { 1 } else { (len + chunk_len - 1) / chunk_len };
    len + chunks * tag_len
}

/// In-progress chunked AES-OCB operation.
pub struct ChunkedOperation {
    cipher: Box<dyn ChunkCipher>,
    mode: aes::OcbMode,
    dir: SymmetricOperation,
    /// Associated data applied to every chunk processed from now on.
    aad: Vec<u8>,
    /// Input that does not yet make up a complete chunk.
    buffer: Vec<u8>,
    /// Number of chunks processed so far.
    chunk_count: u64,
    /// Decrypted data, released only once every chunk has been authenticated.
    plaintext: Vec<u8>,
    /// First authentication failure, reported on finish.
    failure: Option<Error>,
}

impl ChunkedOperation {
    pub fn new(cipher: Box<dyn ChunkCipher>, mode: aes::OcbMode, dir: SymmetricOperation) -> Self {
        Self {
            cipher,
            mode,
            dir,
            aad: Vec::new(),
            buffer: Vec::new(),
            chunk_count: 0,
            plaintext: Vec::new(),
            failure: None,
        }
    }

    /// Size of a complete input chunk for the current direction.
    fn input_chunk_len(&self) -> usize {
        match self.dir {
            SymmetricOperation::Encrypt => self.mode.chunk_len,
            SymmetricOperation::Decrypt => self.mode.chunk_len + self.mode.tag_len,
        }
    }

    /// Process one chunk of input, returning any data to be emitted straight away.  A chunk
    /// that fails authentication poisons the operation rather than failing the call.
    fn process_chunk(&mut self, chunk: &[u8]) -> Result<Vec<u8>, Error> {
        let index = self.chunk_count;
        let nonce = chunk_nonce(&self.mode.nonce, index)?;
        self.chunk_count += 1;
        if self.dir == SymmetricOperation::Encrypt {
            return self.cipher.seal(&nonce, &self.aad, chunk);
        }
        if self.failure.is_some() {
            return Ok(Vec::new());
        }
        let opened = if chunk.len() < self.mode.tag_len {
            let len = chunk.len();
            Err(km_err!(VerificationFailed, "AES-OCB chunk of {} bytes shorter than tag", len))
        } else {
            self.cipher.open(&nonce, &self.aad, chunk)
        };
        match opened {
            Ok(pt) => self.plaintext.try_extend_from_slice(&pt)?,
            Err(e) if e.code() == ErrorCode::VerificationFailed => {
                warn!("AES-OCB chunk {} failed authentication", index);
                self.plaintext = Vec::new();
                self.failure = Some(e);
            }
            Err(e) => return Err(e),
        }
        Ok(Vec::new())
    }
}

impl EmittingOperation for ChunkedOperation {
    fn update(&mut self, mut data: &[u8]) -> Result<Vec<u8>, Error> {
        let chunk_len = self.input_chunk_len();
        let mut output = Vec::new();
        if !self.buffer.is_empty() {
            let fill = core::cmp::min(chunk_len - self.buffer.len(), data.len());
            self.buffer.try_extend_from_slice(&data[..fill])?;
            data = &data[fill..];
            if self.buffer.len() < chunk_len {
                return Ok(output);
            }
            let chunk = core::mem::take(&mut self.buffer);
            output.try_extend_from_slice(&self.process_chunk(&chunk)?)?;
        }
        let mut chunks = data.chunks_exact(chunk_len);
        for chunk in &mut chunks {
            output.try_extend_from_slice(&self.process_chunk(chunk)?)?;
        }
        self.buffer.try_extend_from_slice(chunks.remainder())?;
        Ok(output)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        let mut output = Vec::new();
        if !self.buffer.is_empty() || self.chunk_count == 0 {
            let chunk = core::mem::take(&mut self.buffer);
            output = self.process_chunk(&chunk)?;
        }
        debug!("AES-OCB {:?} finished after {} chunks", self.dir, self.chunk_count);
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        match self.dir {
            SymmetricOperation::Encrypt => Ok(output),
            SymmetricOperation::Decrypt => Ok(core::mem::take(&mut self.plaintext)),
        }
    }
}

impl AadOperation for ChunkedOperation {
    fn update_aad(&mut self, aad: &[u8]) -> Result<(), Error> {
        self.aad = try_to_vec(aad)?;
        Ok(())
    }
}
