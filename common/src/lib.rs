//! Functionality for the software keymaster that is shared between the engine and the crypto
//! backends: errors, the authorization model, capability tables, key material and the key blob.

#![no_std]
extern crate alloc;

use alloc::{string::String, vec::Vec};
use core::convert::From;
use wire::keymaster::ErrorCode;

pub use skm_wire as wire;
pub use wire::{cbor, cbor_type_error, AsCborValue, CborError};

pub mod capability;
pub mod crypto;
pub mod keyblob;
pub mod tag;


/// General error type.
#[derive(Debug)]
pub enum Error {
    Cbor(CborError),
    Hal(ErrorCode, String),
}

// The following macros for error generation allow the message portion to be automatically
// compiled out in future, avoiding potential information leakage and allocation.

/// Macro to build an [`Error::Hal`] instance for a specific [`ErrorCode`] value known at compile
/// time: `km_err!(InvalidTag, "some {} format", arg)`.
#[macro_export]
macro_rules! km_err {
    { $error_code:ident, $($arg:tt)+ } => {
        $crate::Error::Hal($crate::wire::keymaster::ErrorCode::$error_code,
                           alloc::format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

/// Macro to build an [`Error::Hal`] instance:
/// `km_verr!(rc, "some {} format", arg)`.
#[macro_export]
macro_rules! km_verr {
    { $error_code:expr, $($arg:tt)+ } => {
        $crate::Error::Hal($error_code,
                           alloc::format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

/// Macro to check that a `Result` is an error with a particular [`ErrorCode`], for use in tests.
#[macro_export]
macro_rules! expect_err {
    ($result:expr, $err_msg:expr) => {
        assert!(
            $result.is_err(),
            "Expected error containing '{}', got success {:?}",
            $err_msg,
            $result
        );
        let err = $result.err();
        assert!(
            alloc::format!("{:?}", err).contains($err_msg),
            "Unexpected error {:?}, doesn't contain '{}'",
            err,
            $err_msg
        );
    };
}

impl From<Error> for ErrorCode {
    fn from(e: Error) -> Self {
        match e {
            Error::Cbor(CborError::AllocationFailed) => ErrorCode::MemoryAllocationFailed,
            Error::Cbor(_) => ErrorCode::InvalidArgument,
            Error::Hal(e, _msg) => e,
        }
    }
}

impl From<CborError> for Error {
    fn from(e: CborError) -> Self {
        Error::Cbor(e)
    }
}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_e: alloc::collections::TryReserveError) -> Self {
        alloc_err()
    }
}

impl From<der::Error> for Error {
    fn from(e: der::Error) -> Self {
        km_err!(InvalidArgument, "DER processing failed: {:?}", e)
    }
}

impl Error {
    /// Return the [`ErrorCode`] that this error will surface as.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Cbor(CborError::AllocationFailed) => ErrorCode::MemoryAllocationFailed,
            Error::Cbor(_) => ErrorCode::InvalidArgument,
            Error::Hal(e, _msg) => *e,
        }
    }
}

/// Build the error used to indicate allocation failure.
pub fn alloc_err() -> Error {
    km_err!(MemoryAllocationFailed, "allocation failed")
}

/// Macro that mimics `vec!` but which detects allocation failure, reported as
/// [`ErrorCode::MemoryAllocationFailed`].
#[macro_export]
macro_rules! vec_try {
    { $elem:expr ; $len:expr } => {
        $crate::wire::vec_try_fill_with_alloc_err($elem, $len, $crate::alloc_err)
    };
    { $($x:expr),+ $(,)? } => {
        $crate::wire::vec_try_from_array([$($x),+], $crate::alloc_err)
    };
}

/// Macro that mimics `Vec::with_capacity` but which detects allocation failure.
#[macro_export]
macro_rules! vec_try_with_capacity {
    { $size:expr } => {
        {
            let mut v = alloc::vec::Vec::new();
            match v.try_reserve($size) {
                Err(e) => Err($crate::Error::from(e)),
                Ok(_) => Ok(v),
            }
        }
    }
}

/// Return a copy of the given slice, detecting allocation failure.
pub fn try_to_vec<T: Clone>(s: &[T]) -> Result<Vec<T>, Error> {
    let mut v = vec_try_with_capacity!(s.len())?;
    v.extend_from_slice(s);
    Ok(v)
}

/// Extension trait to provide fallible-allocation variants of `Vec` methods.
pub trait FallibleAllocExt<T> {
    fn try_push(&mut self, value: T) -> Result<(), alloc::collections::TryReserveError>;
    fn try_extend_from_slice(
        &mut self,
        other: &[T],
    ) -> Result<(), alloc::collections::TryReserveError>
    where
        T: Clone;
}

impl<T> FallibleAllocExt<T> for Vec<T> {
    fn try_push(&mut self, value: T) -> Result<(), alloc::collections::TryReserveError> {
        self.try_reserve(1)?;
        self.push(value);
        Ok(())
    }
    fn try_extend_from_slice(
        &mut self,
        other: &[T],
    ) -> Result<(), alloc::collections::TryReserveError>
    where
        T: Clone,
    {
        self.try_reserve(other.len())?;
        self.extend_from_slice(other);
        Ok(())
    }
}
