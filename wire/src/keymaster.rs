//! Local types for the keymaster tag model, key characteristics and error codes.
//!
//! - Enums are encoded as exhaustive Rust enums backed by `i32`, using Rust naming
//!   conventions (CamelCase values).
//! - Structs have all fields `pub`, using Rust naming conventions (snake_case fields).
//! - Both enums and structs get a `[derive(AsCborValue)]`
//!
//! Special cases:
//! - `KeyParam` is a Rust `enum` that is used in place of a (tag, union-of-values) struct,
//!   meaning that the value kind for each tag is fixed by the type system.
//! - Tags whose value kind is boolean have no payload in `KeyParam`; their presence is the value.

use crate::{
    cbor, cbor_type_error, try_from_n, vec_try, AsCborValue, CborError, KeySizeInBits, RsaExponent,
};
use alloc::vec;
use alloc::vec::Vec;
use enumn::N;
use skm_derive::AsCborValue;

/// Representation of a date/time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTime {
    pub ms_since_epoch: i64,
}

impl AsCborValue for DateTime {
    fn from_cbor_value(value: cbor::value::Value) -> Result<Self, CborError> {
        let val = <i64>::from_cbor_value(value)?;
        Ok(Self { ms_since_epoch: val })
    }
    fn to_cbor_value(self) -> Result<cbor::value::Value, CborError> {
        self.ms_since_epoch.to_cbor_value()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum Algorithm {
    Rsa = 1,
    Dsa = 2,
    Ec = 3,
    Aes = 32,
    Hmac = 128,
}
try_from_n!(Algorithm);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum BlockMode {
    Ecb = 1,
    Cbc = 2,
    Ctr = 5,
    Gcm = 32,
    Ocb = 33,
}
try_from_n!(BlockMode);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum Digest {
    None = 0,
    Md5 = 1,
    Sha1 = 2,
    Sha224 = 3,
    Sha256 = 4,
    Sha384 = 5,
    Sha512 = 6,
}
try_from_n!(Digest);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    UnsupportedPurpose = -2,
    IncompatiblePurpose = -3,
    UnsupportedAlgorithm = -4,
    IncompatibleAlgorithm = -5,
    UnsupportedKeySize = -6,
    UnsupportedBlockMode = -7,
    IncompatibleBlockMode = -8,
    UnsupportedMacLength = -9,
    UnsupportedPaddingMode = -10,
    IncompatiblePaddingMode = -11,
    UnsupportedDigest = -12,
    IncompatibleDigest = -13,
    UnsupportedKeyFormat = -17,
    IncompatibleKeyFormat = -18,
    InvalidInputLength = -21,
    KeyNotYetValid = -24,
    KeyExpired = -25,
    OutputParameterNull = -27,
    InvalidOperationHandle = -28,
    VerificationFailed = -30,
    TooManyOperations = -31,
    InvalidKeyBlob = -33,
    InvalidArgument = -38,
    InvalidTag = -40,
    MemoryAllocationFailed = -41,
    ImportParameterMismatch = -44,
    CallerNonceProhibited = -55,
    Unimplemented = -100,
    UnknownError = -1000,
}
try_from_n!(ErrorCode);

/// The two authorization lists that describe a key.
#[derive(Clone, Debug, Default, Eq, PartialEq, AsCborValue)]
pub struct KeyCharacteristics {
    /// Authorizations enforced by secure hardware; always empty for a software engine.
    pub hw_enforced: Vec<KeyParam>,
    /// Authorizations enforced by this engine.
    pub sw_enforced: Vec<KeyParam>,
}

/// Result of key generation or import.
#[derive(Clone, Debug, Eq, PartialEq, AsCborValue)]
pub struct KeyCreationResult {
    pub key_blob: Vec<u8>,
    pub characteristics: KeyCharacteristics,
}

/// Result of starting an operation.
#[derive(Clone, Debug, Eq, PartialEq, AsCborValue)]
pub struct BeginResult {
    pub op_handle: i64,
    pub params: Vec<KeyParam>,
}

/// Version triple reported by the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, AsCborValue)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub subminor: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum KeyFormat {
    X509 = 0,
    Pkcs8 = 1,
    Raw = 3,
}
try_from_n!(KeyFormat);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum KeyOrigin {
    Generated = 0,
    Imported = 2,
    Unknown = 3,
}
try_from_n!(KeyOrigin);

/// Rust exhaustive enum for all key parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyParam {
    Purpose(KeyPurpose),
    Algorithm(Algorithm),
    KeySize(KeySizeInBits),
    BlockMode(BlockMode),
    Digest(Digest),
    Padding(PaddingMode),
    CallerNonce,
    RsaPublicExponent(RsaExponent),
    ActiveDatetime(DateTime),
    OriginationExpireDatetime(DateTime),
    UsageExpireDatetime(DateTime),
    AllUsers,
    UserId(u32),
    UserAuthId(u32),
    NoAuthRequired,
    AuthTimeout(u32),
    AllApplications,
    ApplicationId(Vec<u8>),
    ApplicationData(Vec<u8>),
    CreationDatetime(DateTime),
    Origin(KeyOrigin),
    RootOfTrust(Vec<u8>),
    AssociatedData(Vec<u8>),
    Nonce(Vec<u8>),
    MacLength(u32),
    ChunkLength(u32),
}

impl KeyParam {
    pub fn tag(&self) -> Tag {
        match self {
            KeyParam::Purpose(_) => Tag::Purpose,
            KeyParam::Algorithm(_) => Tag::Algorithm,
            KeyParam::KeySize(_) => Tag::KeySize,
            KeyParam::BlockMode(_) => Tag::BlockMode,
            KeyParam::Digest(_) => Tag::Digest,
            KeyParam::Padding(_) => Tag::Padding,
            KeyParam::CallerNonce => Tag::CallerNonce,
            KeyParam::RsaPublicExponent(_) => Tag::RsaPublicExponent,
            KeyParam::ActiveDatetime(_) => Tag::ActiveDatetime,
            KeyParam::OriginationExpireDatetime(_) => Tag::OriginationExpireDatetime,
            KeyParam::UsageExpireDatetime(_) => Tag::UsageExpireDatetime,
            KeyParam::AllUsers => Tag::AllUsers,
            KeyParam::UserId(_) => Tag::UserId,
            KeyParam::UserAuthId(_) => Tag::UserAuthId,
            KeyParam::NoAuthRequired => Tag::NoAuthRequired,
            KeyParam::AuthTimeout(_) => Tag::AuthTimeout,
            KeyParam::AllApplications => Tag::AllApplications,
            KeyParam::ApplicationId(_) => Tag::ApplicationId,
            KeyParam::ApplicationData(_) => Tag::ApplicationData,
            KeyParam::CreationDatetime(_) => Tag::CreationDatetime,
            KeyParam::Origin(_) => Tag::Origin,
            KeyParam::RootOfTrust(_) => Tag::RootOfTrust,
            KeyParam::AssociatedData(_) => Tag::AssociatedData,
            KeyParam::Nonce(_) => Tag::Nonce,
            KeyParam::MacLength(_) => Tag::MacLength,
            KeyParam::ChunkLength(_) => Tag::ChunkLength,
        }
    }
}

/// Check that a `bool` value is true (false values are represented by the absence of a tag).
fn check_bool(value: cbor::value::Value) -> Result<(), crate::CborError> {
    match value {
        cbor::value::Value::Bool(true) => Ok(()),
        cbor::value::Value::Bool(false) => Err(crate::CborError::UnexpectedItem("false", "true")),
        _ => crate::cbor_type_error(&value, "true"),
    }
}

/// Manual implementation of [`crate::AsCborValue`] for the [`KeyParam`] enum, encoding each
/// parameter as a two-element `[tag, value]` array.
impl crate::AsCborValue for KeyParam {
    fn from_cbor_value(value: cbor::value::Value) -> Result<Self, crate::CborError> {
        let mut a = match value {
            cbor::value::Value::Array(a) => a,
            _ => return crate::cbor_type_error(&value, "arr"),
        };
        if a.len() != 2 {
            return Err(crate::CborError::UnexpectedItem("arr", "arr len 2"));
        }
        // Need to know the tag value to completely parse the value.
        let raw = a.remove(1);
        let tag = <Tag>::from_cbor_value(a.remove(0))?;
        Ok(match tag {
            Tag::Purpose => KeyParam::Purpose(<KeyPurpose>::from_cbor_value(raw)?),
            Tag::Algorithm => KeyParam::Algorithm(<Algorithm>::from_cbor_value(raw)?),
            Tag::KeySize => KeyParam::KeySize(<KeySizeInBits>::from_cbor_value(raw)?),
            Tag::BlockMode => KeyParam::BlockMode(<BlockMode>::from_cbor_value(raw)?),
            Tag::Digest => KeyParam::Digest(<Digest>::from_cbor_value(raw)?),
            Tag::Padding => KeyParam::Padding(<PaddingMode>::from_cbor_value(raw)?),
            Tag::CallerNonce => {
                check_bool(raw)?;
                KeyParam::CallerNonce
            }
            Tag::RsaPublicExponent => {
                KeyParam::RsaPublicExponent(<RsaExponent>::from_cbor_value(raw)?)
            }
            Tag::ActiveDatetime => KeyParam::ActiveDatetime(<DateTime>::from_cbor_value(raw)?),
            Tag::OriginationExpireDatetime => {
                KeyParam::OriginationExpireDatetime(<DateTime>::from_cbor_value(raw)?)
            }
            Tag::UsageExpireDatetime => {
                KeyParam::UsageExpireDatetime(<DateTime>::from_cbor_value(raw)?)
            }
            Tag::AllUsers => {
                check_bool(raw)?;
                KeyParam::AllUsers
            }
            Tag::UserId => KeyParam::UserId(<u32>::from_cbor_value(raw)?),
            Tag::UserAuthId => KeyParam::UserAuthId(<u32>::from_cbor_value(raw)?),
            Tag::NoAuthRequired => {
                check_bool(raw)?;
                KeyParam::NoAuthRequired
            }
            Tag::AuthTimeout => KeyParam::AuthTimeout(<u32>::from_cbor_value(raw)?),
            Tag::AllApplications => {
                check_bool(raw)?;
                KeyParam::AllApplications
            }
            Tag::ApplicationId => KeyParam::ApplicationId(<Vec<u8>>::from_cbor_value(raw)?),
            Tag::ApplicationData => KeyParam::ApplicationData(<Vec<u8>>::from_cbor_value(raw)?),
            Tag::CreationDatetime => KeyParam::CreationDatetime(<DateTime>::from_cbor_value(raw)?),
            Tag::Origin => KeyParam::Origin(<KeyOrigin>::from_cbor_value(raw)?),
            Tag::RootOfTrust => KeyParam::RootOfTrust(<Vec<u8>>::from_cbor_value(raw)?),
            Tag::AssociatedData => KeyParam::AssociatedData(<Vec<u8>>::from_cbor_value(raw)?),
            Tag::Nonce => KeyParam::Nonce(<Vec<u8>>::from_cbor_value(raw)?),
            Tag::MacLength => KeyParam::MacLength(<u32>::from_cbor_value(raw)?),
            Tag::ChunkLength => KeyParam::ChunkLength(<u32>::from_cbor_value(raw)?),
            Tag::Invalid => return Err(crate::CborError::UnexpectedItem("tag", "known tag")),
        })
    }
    fn to_cbor_value(self) -> Result<cbor::value::Value, crate::CborError> {
        let (tag, val) = match self {
            KeyParam::Purpose(v) => (Tag::Purpose, v.to_cbor_value()?),
            KeyParam::Algorithm(v) => (Tag::Algorithm, v.to_cbor_value()?),
            KeyParam::KeySize(v) => (Tag::KeySize, v.to_cbor_value()?),
            KeyParam::BlockMode(v) => (Tag::BlockMode, v.to_cbor_value()?),
            KeyParam::Digest(v) => (Tag::Digest, v.to_cbor_value()?),
            KeyParam::Padding(v) => (Tag::Padding, v.to_cbor_value()?),
            KeyParam::CallerNonce => (Tag::CallerNonce, true.to_cbor_value()?),
            KeyParam::RsaPublicExponent(v) => (Tag::RsaPublicExponent, v.to_cbor_value()?),
            KeyParam::ActiveDatetime(v) => (Tag::ActiveDatetime, v.to_cbor_value()?),
            KeyParam::OriginationExpireDatetime(v) => {
                (Tag::OriginationExpireDatetime, v.to_cbor_value()?)
            }
            KeyParam::UsageExpireDatetime(v) => (Tag::UsageExpireDatetime, v.to_cbor_value()?),
            KeyParam::AllUsers => (Tag::AllUsers, true.to_cbor_value()?),
            KeyParam::UserId(v) => (Tag::UserId, v.to_cbor_value()?),
            KeyParam::UserAuthId(v) => (Tag::UserAuthId, v.to_cbor_value()?),
            KeyParam::NoAuthRequired => (Tag::NoAuthRequired, true.to_cbor_value()?),
            KeyParam::AuthTimeout(v) => (Tag::AuthTimeout, v.to_cbor_value()?),
            KeyParam::AllApplications => (Tag::AllApplications, true.to_cbor_value()?),
            KeyParam::ApplicationId(v) => (Tag::ApplicationId, v.to_cbor_value()?),
            KeyParam::ApplicationData(v) => (Tag::ApplicationData, v.to_cbor_value()?),
            KeyParam::CreationDatetime(v) => (Tag::CreationDatetime, v.to_cbor_value()?),
            KeyParam::Origin(v) => (Tag::Origin, v.to_cbor_value()?),
            KeyParam::RootOfTrust(v) => (Tag::RootOfTrust, v.to_cbor_value()?),
            KeyParam::AssociatedData(v) => (Tag::AssociatedData, v.to_cbor_value()?),
            KeyParam::Nonce(v) => (Tag::Nonce, v.to_cbor_value()?),
            KeyParam::MacLength(v) => (Tag::MacLength, v.to_cbor_value()?),
            KeyParam::ChunkLength(v) => (Tag::ChunkLength, v.to_cbor_value()?),
        };
        Ok(cbor::value::Value::Array(vec_try![tag.to_cbor_value()?, val]?))
    }
}

/// Determine the tag type for a tag, based on the top 4 bits of the tag number.
pub fn tag_type(tag: Tag) -> TagType {
    match ((tag as u32) & 0xf0000000u32) as i32 {
        x if x == TagType::Enum as i32 => TagType::Enum,
        x if x == TagType::EnumRep as i32 => TagType::EnumRep,
        x if x == TagType::Uint as i32 => TagType::Uint,
        x if x == TagType::UintRep as i32 => TagType::UintRep,
        x if x == TagType::Ulong as i32 => TagType::Ulong,
        x if x == TagType::Date as i32 => TagType::Date,
        x if x == TagType::Bool as i32 => TagType::Bool,
        x if x == TagType::Bytes as i32 => TagType::Bytes,
        _ => TagType::Invalid,
    }
}

/// Determine the raw tag value with tag type information stripped out.
pub fn raw_tag_value(tag: Tag) -> u32 {
    (tag as u32) & 0x0fffffffu32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum KeyPurpose {
    Encrypt = 0,
    Decrypt = 1,
    Sign = 2,
    Verify = 3,
}
try_from_n!(KeyPurpose);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum PaddingMode {
    None = 1,
    RsaOaep = 2,
    RsaPss = 3,
    RsaPkcs115Encrypt = 4,
    RsaPkcs115Sign = 5,
    Zero = 64,
    Pkcs7 = 65,
}
try_from_n!(PaddingMode);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, AsCborValue, N)]
#[repr(i32)]
pub enum Tag {
    Invalid = 0,
    Purpose = 536870913,
    Algorithm = 268435458,
    KeySize = 805306371,
    BlockMode = 536870916,
    Digest = 536870917,
    Padding = 536870918,
    CallerNonce = 1879048199,
    RsaPublicExponent = 1342177480,
    ActiveDatetime = 1610613136,
    OriginationExpireDatetime = 1610613137,
    UsageExpireDatetime = 1610613138,
    AllUsers = 1879048692,
    UserId = 805306869,
    UserAuthId = 1073742326,
    NoAuthRequired = 1879048695,
    AuthTimeout = 805306873,
    AllApplications = 1879048792,
    ApplicationId = -1879047591,
    ApplicationData = -1879047492,
    CreationDatetime = 1610613437,
    Origin = 268436158,
    RootOfTrust = -1879047488,
    AssociatedData = -1879047192,
    Nonce = -1879047191,
    MacLength = 805307371,
    ChunkLength = 805307372,
}
try_from_n!(Tag);

#[derive(Clone, Copy, Debug, PartialEq, Eq, AsCborValue, N)]
#[repr(i32)]
pub enum TagType {
    Invalid = 0,
    Enum = 268435456,
    EnumRep = 536870912,
    Uint = 805306368,
    UintRep = 1073741824,
    Ulong = 1342177280,
    Date = 1610612736,
    Bool = 1879048192,
    Bytes = -1879048192,
}
try_from_n!(TagType);

/// Indicate whether the given tag can legitimately appear more than once in a set.
pub fn is_repeatable(tag: Tag) -> bool {
    matches!(tag_type(tag), TagType::EnumRep | TagType::UintRep)
}
