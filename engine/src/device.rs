//! Device entry points that write results into caller-supplied output slots and report status
//! as an [`ErrorCode`].  A missing output slot fails with [`ErrorCode::OutputParameterNull`]
//! before any work is done.

use crate::{OpHandle, SoftKeymaster};
use alloc::vec::Vec;
use log::error;
use skm_common::Error;
use skm_wire::keymaster::{
    Algorithm, BlockMode, Digest, ErrorCode, KeyCharacteristics, KeyFormat, KeyParam, KeyPurpose,
    PaddingMode, Version,
};

/// Entry points of a [`KeymasterDevice`], used to identify failing requests in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceRequest {
    GetSupportedAlgorithms,
    GetSupportedBlockModes,
    GetSupportedPaddingModes,
    GetSupportedDigests,
    GetSupportedImportFormats,
    GetSupportedExportFormats,
    GenerateKey,
    ImportKey,
    GetKeyCharacteristics,
    ExportKey,
    Begin,
    Update,
    Finish,
    Abort,
}

/// Write the outcome of `f` into `slot`, or report why that was not possible.
fn respond<T, F>(req: DeviceRequest, slot: Option<&mut T>, f: F) -> ErrorCode
where
    F: FnOnce() -> Result<T, Error>,
{
    let Some(slot) = slot else {
        error!("failing {:?} request with no output location", req);
        return ErrorCode::OutputParameterNull;
    };
    match f() {
        Ok(value) => {
            *slot = value;
            ErrorCode::Ok
        }
        Err(e) => error_rsp(req, e),
    }
}

fn error_rsp(req: DeviceRequest, err: Error) -> ErrorCode {
    error!("failing {:?} request with error {:?}", req, err);
    err.into()
}

/// Keymaster device wrapping a [`SoftKeymaster`].
pub struct KeymasterDevice<'a> {
    engine: SoftKeymaster<'a>,
}

impl<'a> KeymasterDevice<'a> {
    pub fn new(engine: SoftKeymaster<'a>) -> Self {
        Self { engine }
    }

    /// Access the underlying engine.
    pub fn engine(&mut self) -> &mut SoftKeymaster<'a> {
        &mut self.engine
    }

    pub fn get_version(&self) -> Version {
        self.engine.get_version()
    }

    pub fn get_supported_algorithms(&self, algorithms: Option<&mut Vec<Algorithm>>) -> ErrorCode {
        respond(DeviceRequest::GetSupportedAlgorithms, algorithms, || {
            self.engine.get_supported_algorithms()
        })
    }

    pub fn get_supported_block_modes(
        &self,
        algorithm: Algorithm,
        purpose: KeyPurpose,
        modes: Option<&mut Vec<BlockMode>>,
    ) -> ErrorCode {
        respond(DeviceRequest::GetSupportedBlockModes, modes, || {
            self.engine.get_supported_block_modes(algorithm, purpose)
        })
    }

    pub fn get_supported_padding_modes(
        &self,
        algorithm: Algorithm,
        purpose: KeyPurpose,
        modes: Option<&mut Vec<PaddingMode>>,
    ) -> ErrorCode {
        respond(DeviceRequest::GetSupportedPaddingModes, modes, || {
            self.engine.get_supported_padding_modes(algorithm, purpose)
        })
    }

    pub fn get_supported_digests(
        &self,
        algorithm: Algorithm,
        purpose: KeyPurpose,
        digests: Option<&mut Vec<Digest>>,
    ) -> ErrorCode {
        respond(DeviceRequest::GetSupportedDigests, digests, || {
            self.engine.get_supported_digests(algorithm, purpose)
        })
    }

    pub fn get_supported_import_formats(
        &self,
        algorithm: Algorithm,
        formats: Option<&mut Vec<KeyFormat>>,
    ) -> ErrorCode {
        respond(DeviceRequest::GetSupportedImportFormats, formats, || {
            self.engine.get_supported_import_formats(algorithm)
        })
    }

    pub fn get_supported_export_formats(
        &self,
        algorithm: Algorithm,
        formats: Option<&mut Vec<KeyFormat>>,
    ) -> ErrorCode {
        respond(DeviceRequest::GetSupportedExportFormats, formats, || {
            self.engine.get_supported_export_formats(algorithm)
        })
    }

    /// Generate a key.  The characteristics are only returned if a location is provided.
    pub fn generate_key(
        &mut self,
        params: &[KeyParam],
        key_blob: Option<&mut Vec<u8>>,
        characteristics: Option<&mut KeyCharacteristics>,
    ) -> ErrorCode {
        let engine = &mut self.engine;
        respond(DeviceRequest::GenerateKey, key_blob, || {
            let result = engine.generate_key(params)?;
            if let Some(characteristics) = characteristics {
                *characteristics = result.characteristics;
            }
            Ok(result.key_blob)
        })
    }

    /// Import a key.  The characteristics are only returned if a location is provided.
    pub fn import_key(
        &mut self,
        params: &[KeyParam],
        key_format: KeyFormat,
        key_data: &[u8],
        key_blob: Option<&mut Vec<u8>>,
        characteristics: Option<&mut KeyCharacteristics>,
    ) -> ErrorCode {
        let engine = &mut self.engine;
        respond(DeviceRequest::ImportKey, key_blob, || {
            let result = engine.import_key(params, key_format, key_data)?;
            if let Some(characteristics) = characteristics {
                *characteristics = result.characteristics;
            }
            Ok(result.key_blob)
        })
    }

    pub fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
        characteristics: Option<&mut KeyCharacteristics>,
    ) -> ErrorCode {
        respond(DeviceRequest::GetKeyCharacteristics, characteristics, || {
            self.engine.get_key_characteristics(key_blob, client_id, app_data)
        })
    }

    pub fn export_key(
        &self,
        key_format: KeyFormat,
        key_blob: &[u8],
        client_id: Option<&[u8]>,
        app_data: Option<&[u8]>,
        export_data: Option<&mut Vec<u8>>,
    ) -> ErrorCode {
        respond(DeviceRequest::ExportKey, export_data, || {
            self.engine.export_key(key_format, key_blob, client_id, app_data)
        })
    }

    /// Begin an operation.  Parameters generated by the engine are only returned if a location
    /// is provided.
    pub fn begin(
        &mut self,
        purpose: KeyPurpose,
        key_blob: &[u8],
        params: &[KeyParam],
        out_params: Option<&mut Vec<KeyParam>>,
        op_handle: Option<&mut OpHandle>,
    ) -> ErrorCode {
        let engine = &mut self.engine;
        respond(DeviceRequest::Begin, op_handle, || {
            let result = engine.begin(purpose, key_blob, params)?;
            if let Some(out_params) = out_params {
                *out_params = result.params;
            }
            Ok(OpHandle(result.op_handle))
        })
    }

    /// Feed data into an operation.  Both output locations are required.
    pub fn update(
        &mut self,
        op_handle: OpHandle,
        params: &[KeyParam],
        data: &[u8],
        input_consumed: Option<&mut usize>,
        output: Option<&mut Vec<u8>>,
    ) -> ErrorCode {
        let Some(input_consumed) = input_consumed else {
            error!("failing {:?} request with no input count location", DeviceRequest::Update);
            return ErrorCode::OutputParameterNull;
        };
        let engine = &mut self.engine;
        respond(DeviceRequest::Update, output, || {
            let (consumed, output) = engine.update(op_handle, params, data)?;
            *input_consumed = consumed;
            Ok(output)
        })
    }

    pub fn finish(
        &mut self,
        op_handle: OpHandle,
        params: &[KeyParam],
        signature: &[u8],
        output: Option<&mut Vec<u8>>,
    ) -> ErrorCode {
        let engine = &mut self.engine;
        respond(DeviceRequest::Finish, output, || engine.finish(op_handle, params, signature))
    }

    pub fn abort(&mut self, op_handle: OpHandle) -> ErrorCode {
        match self.engine.abort(op_handle) {
            Ok(()) => ErrorCode::Ok,
            Err(e) => error_rsp(DeviceRequest::Abort, e),
        }
    }
}
