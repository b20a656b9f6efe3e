//! Software keymaster engine: key lifecycle and multi-step cryptographic operations.

#![no_std]
extern crate alloc;

use alloc::vec::Vec;
use log::info;
use skm_common::{capability, crypto, keyblob, tag, try_to_vec, Error};
use skm_wire::keymaster::{
    Algorithm, BlockMode, Digest, KeyFormat, KeyParam, KeyPurpose, PaddingMode, Version,
};

pub mod device;
mod keys;
mod operation;

pub use operation::OpHandle;
use operation::Operation;


/// Version reported by [`SoftKeymaster::get_version`].
pub const VERSION: Version = Version { major: 1, minor: 0, subminor: 0 };

/// Default maximum number of parallel operations.
pub const DEFAULT_MAX_OPERATIONS: usize = 16;

/// Default root of trust, mixed into the integrity check of every key blob.
pub const DEFAULT_ROOT_OF_TRUST: &[u8] = b"SW";

/// Engine configuration, fixed on construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of concurrently live operation handles.
    pub max_operations: usize,
    /// Root of trust bound into key blobs.
    pub root_of_trust: Vec<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_operations: DEFAULT_MAX_OPERATIONS, root_of_trust: DEFAULT_ROOT_OF_TRUST.into() }
    }
}

/// Software keymaster implementation.
pub struct SoftKeymaster<'a> {
    /// Trait objects that hold this engine's implementations of the abstract cryptographic
    /// functionality traits.
    imp: crypto::Implementation<'a>,

    config: EngineConfig,

    /// The operation table.
    operations: Vec<Option<Operation>>,
}

impl<'a> SoftKeymaster<'a> {
    /// Create a new [`SoftKeymaster`] instance.
    pub fn new(imp: crypto::Implementation<'a>, config: EngineConfig) -> Self {
        info!(
            "software keymaster v{}.{}.{} with {} operation slots",
            VERSION.major, VERSION.minor, VERSION.subminor, config.max_operations
        );
        Self {
            imp,
            // Work around Rust limitation that `vec![None; n]` doesn't work.
            operations: (0..config.max_operations).map(|_| None).collect(),
            config,
        }
    }

    pub fn get_version(&self) -> Version {
        VERSION
    }

    /// Number of operations currently in progress.
    pub fn live_operations(&self) -> usize {
        self.operations.iter().filter(|op| op.is_some()).count()
    }

    pub fn get_supported_algorithms(&self) -> Result<Vec<Algorithm>, Error> {
        let mut result = Vec::new();
        result.try_reserve(capability::ALGORITHMS.len())?;
        result.extend(capability::supported_algorithms());
        Ok(result)
    }

    pub fn get_supported_block_modes(
        &self,
        algorithm: Algorithm,
        purpose: KeyPurpose,
    ) -> Result<Vec<BlockMode>, Error> {
        try_to_vec(capability::supported_block_modes(algorithm, purpose)?)
    }

    pub fn get_supported_padding_modes(
        &self,
        algorithm: Algorithm,
        purpose: KeyPurpose,
    ) -> Result<Vec<PaddingMode>, Error> {
        try_to_vec(capability::supported_paddings(algorithm, purpose)?)
    }

    pub fn get_supported_digests(
        &self,
        algorithm: Algorithm,
        purpose: KeyPurpose,
    ) -> Result<Vec<Digest>, Error> {
        try_to_vec(capability::supported_digests(algorithm, purpose)?)
    }

    pub fn get_supported_import_formats(
        &self,
        algorithm: Algorithm,
    ) -> Result<Vec<KeyFormat>, Error> {
        try_to_vec(capability::supported_import_formats(algorithm)?)
    }

    pub fn get_supported_export_formats(
        &self,
        algorithm: Algorithm,
    ) -> Result<Vec<KeyFormat>, Error> {
        try_to_vec(capability::supported_export_formats(algorithm)?)
    }

    /// Parameters bound into the integrity check of a key blob: the caller's application id and
    /// data (if any) plus the root of trust.
    fn hidden_params(&self, params: &[KeyParam]) -> Result<Vec<KeyParam>, Error> {
        tag::hidden(params, &self.config.root_of_trust)
    }

    /// Parse and check a key blob.
    fn keyblob_parse(
        &self,
        key_blob: &[u8],
        params: &[KeyParam],
    ) -> Result<keyblob::PlaintextKeyBlob, Error> {
        let hidden = self.hidden_params(params)?;
        keyblob::decode(self.imp.hmac, self.imp.compare, key_blob, &hidden)
    }
}
