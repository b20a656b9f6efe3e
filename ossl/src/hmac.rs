use crate::{malloc_err, openssl_last_err, required_digest};
use alloc::boxed::Box;
use alloc::vec::Vec;
use log::error;
use skm_common::{crypto, km_err, vec_try, Error};
use skm_wire::keymaster::Digest;

/// [`crypto::Hmac`] implementation based on OpenSSL.
#[derive(Default)]
pub struct OpenSslHmac;

impl crypto::Hmac for OpenSslHmac {
    fn begin(
        &self,
        key: crypto::hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let op = OpenSslHmacOperation {
            ctx: unsafe {
                // Safety: raw pointer is immediately checked for null below.
                ffi::HMAC_CTX_new()
            },
        };
        if op.ctx.is_null() {
            return Err(malloc_err!());
        }

        let md = required_digest(digest)?;
        let key_len = libc::c_int::try_from(key.0.len())
            .map_err(|_e| km_err!(UnsupportedKeySize, "HMAC key of {} bytes", key.0.len()))?;

        let result = unsafe {
            // Safety: `op.ctx` is known non-null, as is the digest pointer.  `key_len` is the
            // length of `key.0`, which is a valid `Vec<u8>`.
            ffi::HMAC_Init_ex(
                op.ctx,
                key.0.as_ptr() as *const libc::c_void,
                key_len,
                md.as_ptr(),
                core::ptr::null_mut(),
            )
        };
        if result != 1 {
            error!("Failed to HMAC_Init_ex()");
            return Err(openssl_last_err());
        }
        Ok(Box::new(op))
    }
}

/// [`crypto::AccumulatingOperation`] implementation for HMAC based on OpenSSL.
///
/// The raw `HMAC_*` functions are used because the `openssl::sign::Signer` wrapper borrows its
/// key, which would make the operation self-referential.
pub struct OpenSslHmacOperation {
    // Safety: `ctx` is always non-null except for initial error path in `begin()`
    ctx: *mut ffi::HMAC_CTX,
}

impl core::ops::Drop for OpenSslHmacOperation {
    fn drop(&mut self) {
        unsafe {
            // Safety: `self.ctx` might be null (in the error path when `ffi::HMAC_CTX_new` fails)
            // but `ffi::HMAC_CTX_free` copes with null.
            ffi::HMAC_CTX_free(self.ctx);
        }
    }
}

impl crypto::AccumulatingOperation for OpenSslHmacOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        let result = unsafe {
            // Safety: `self.ctx` is non-null, and `data` is a valid slice.
            ffi::HMAC_Update(self.ctx, data.as_ptr(), data.len())
        };
        if result != 1 {
            return Err(openssl_last_err());
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let mut output_len = ffi::EVP_MAX_MD_SIZE as libc::c_uint;
        let mut output = vec_try![0; ffi::EVP_MAX_MD_SIZE as usize]?;

        let result = unsafe {
            // Safety: `self.ctx` is non-null; `output_len` is correct size of `output` buffer.
            ffi::HMAC_Final(self.ctx, output.as_mut_ptr(), &mut output_len as *mut libc::c_uint)
        };
        if result != 1 {
            return Err(openssl_last_err());
        }
        output.truncate(output_len as usize);
        Ok(output)
    }
}
