//! Implementations of [`skm_common::crypto`] traits based on OpenSSL.

extern crate alloc;

use alloc::string::ToString;
use log::error;
use openssl::hash::MessageDigest;
use skm_common::{crypto, km_err, Error};
use skm_wire::keymaster::{Digest, ErrorCode};

pub mod aes;
pub mod clock;
pub mod ec;
pub mod eq;
pub mod hmac;
pub mod rng;
pub mod rsa;


/// Map an OpenSSL `ErrorStack` into an [`ErrorCode`] value.
pub(crate) fn map_openssl_errstack(errs: &openssl::error::ErrorStack) -> ErrorCode {
    let errors = errs.errors();
    if errors.is_empty() {
        error!("OpenSSL error requested but none available!");
        return ErrorCode::UnknownError;
    }
    let err = &errors[0]; // safe: length checked above
    map_openssl_err(err)
}

/// Map a single OpenSSL `Error` into an [`ErrorCode`] value.  Library failures have no more
/// specific meaning for callers, so all of them surface as `UnknownError`.
pub(crate) fn map_openssl_err(err: &openssl::error::Error) -> ErrorCode {
    error!("OpenSSL failure in {:?}: {:?}", err.library(), err.reason());
    ErrorCode::UnknownError
}

/// Macro to auto-generate error mapping around invocations of `openssl` methods.
/// An invocation like:
///
/// ```ignore
/// let x = ossl!(y.func(a, b))?;
/// ```
///
/// will map to:
///
/// ```ignore
/// let x = y.func(a, b).map_err(openssl_err!("failed to perform: y.func(a, b)"))?;
/// ```
#[macro_export]
macro_rules! ossl {
    { $e:expr } => {
        $e.map_err($crate::openssl_err!(concat!("failed to perform: ", stringify!($e))))
    }
}

/// Macro to emit a closure that builds an [`Error::Hal`] instance, based on an
/// openssl `ErrorStack` together with a format-like message.
#[macro_export]
macro_rules! openssl_err {
    { $($arg:tt)+ } => {
        |e| skm_common::Error::Hal(
            $crate::map_openssl_errstack(&e),
            alloc::format!("{}:{}: {}: {:?}", file!(), line!(), format_args!($($arg)+), e)
        )
    };
}

/// Macro to emit a closure that builds an [`Error::Hal`] instance with a fixed [`ErrorCode`],
/// for OpenSSL failures whose meaning is known from context (for example a failed tag check).
#[macro_export]
macro_rules! openssl_err_as {
    { $code:ident, $($arg:tt)+ } => {
        |e| skm_common::Error::Hal(
            skm_wire::keymaster::ErrorCode::$code,
            alloc::format!("{}:{}: {}: {:?}", file!(), line!(), format_args!($($arg)+), e)
        )
    };
}

/// Macro to emit an [`Error`] indicating allocation failure at the current location.
#[macro_export]
macro_rules! malloc_err {
    {} => {
        skm_common::km_err!(MemoryAllocationFailed, "OpenSSL allocation failed")
    };
}

/// Translate the most recent OpenSSL error into [`Error`].
fn openssl_last_err() -> Error {
    from_openssl_err(openssl::error::ErrorStack::get())
}

/// Translate a returned `openssl` error into [`Error`].
fn from_openssl_err(errs: openssl::error::ErrorStack) -> Error {
    Error::Hal(map_openssl_errstack(&errs), "OpenSSL failure".to_string())
}

/// Translate a [`Digest`] into an OpenSSL [`MessageDigest`].
fn digest_into_openssl(digest: Digest) -> Option<MessageDigest> {
    match digest {
        Digest::None => None,
        Digest::Md5 => Some(MessageDigest::md5()),
        Digest::Sha1 => Some(MessageDigest::sha1()),
        Digest::Sha224 => Some(MessageDigest::sha224()),
        Digest::Sha256 => Some(MessageDigest::sha256()),
        Digest::Sha384 => Some(MessageDigest::sha384()),
        Digest::Sha512 => Some(MessageDigest::sha512()),
    }
}

/// As [`digest_into_openssl`], but treating [`Digest::None`] as an error.
fn required_digest(digest: Digest) -> Result<MessageDigest, Error> {
    digest_into_openssl(digest)
        .ok_or_else(|| km_err!(UnsupportedDigest, "digest required, got {:?}", digest))
}

/// Build the full set of OpenSSL-backed trait implementations, other than the RNG (which is
/// mutable and so owned by the caller).
#[derive(Default)]
pub struct OpenSslBackend {
    pub clock: clock::StdClock,
    pub compare: eq::OpenSslEq,
    pub aes: aes::OpenSslAes,
    pub hmac: hmac::OpenSslHmac,
    pub rsa: rsa::OpenSslRsa,
    pub ec: ec::OpenSslEc,
}

impl OpenSslBackend {
    /// Combine with an RNG to give a [`crypto::Implementation`].
    pub fn implementation<'a>(
        &'a self,
        rng: &'a mut dyn crypto::Rng,
    ) -> crypto::Implementation<'a> {
        crypto::Implementation {
            rng,
            clock: &self.clock,
            compare: &self.compare,
            aes: &self.aes,
            hmac: &self.hmac,
            rsa: &self.rsa,
            ec: &self.ec,
        }
    }
}
