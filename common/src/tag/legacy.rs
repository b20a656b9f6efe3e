//! Flat binary serialization of authorization sets, used for the canonical size/encoding of a
//! set and as the hidden input to the key blob integrity check.

use crate::{km_err, try_to_vec, vec_try_with_capacity, Error, FallibleAllocExt};
use alloc::vec::Vec;
use core::cmp::Ordering;
use skm_wire::{
    keymaster::{
        Algorithm, BlockMode, DateTime, Digest, KeyOrigin, KeyParam, KeyPurpose, PaddingMode, Tag,
    },
    KeySizeInBits, RsaExponent,
};

/// Size of the fixed header fields (blob size, count, element size) of a serialized set.
pub const HEADER_SIZE: usize = 12;

/// Retrieve a `u8` from the start of the given slice, if possible.
pub(crate) fn consume_u8(data: &mut &[u8]) -> Result<u8, Error> {
    match data.split_first() {
        Some((b, rest)) => {
            *data = rest;
            Ok(*b)
        }
        None => Err(km_err!(InvalidKeyBlob, "failed to find 1 byte")),
    }
}

/// Move past a bool value from the start of the given slice, if possible.
/// Bool values should only be included if `true`, so fail if the value
/// is anything other than 1.
pub(crate) fn consume_bool(data: &mut &[u8]) -> Result<(), Error> {
    let b = consume_u8(data)?;
    if b == 0x01 {
        Ok(())
    } else {
        Err(km_err!(InvalidKeyBlob, "bool value other than 1 encountered"))
    }
}

/// Split `N` bytes off the start of the given slice, if possible.
fn consume_array<const N: usize>(data: &mut &[u8]) -> Result<[u8; N], Error> {
    if data.len() < N {
        return Err(km_err!(InvalidKeyBlob, "failed to find {} bytes", N));
    }
    let (chunk, rest) = data.split_at(N);
    let chunk: [u8; N] =
        chunk.try_into().map_err(|_e| km_err!(InvalidKeyBlob, "failed to take {} bytes", N))?;
    *data = rest;
    Ok(chunk)
}

/// Retrieve a little-endian `u32` from the start of the given slice, if possible.
pub(crate) fn consume_u32(data: &mut &[u8]) -> Result<u32, Error> {
    Ok(u32::from_le_bytes(consume_array(data)?))
}

/// Retrieve a little-endian `i32` from the start of the given slice, if possible.
pub(crate) fn consume_i32(data: &mut &[u8]) -> Result<i32, Error> {
    Ok(i32::from_le_bytes(consume_array(data)?))
}

/// Retrieve a little-endian `u64` from the start of the given slice, if possible.
pub(crate) fn consume_u64(data: &mut &[u8]) -> Result<u64, Error> {
    Ok(u64::from_le_bytes(consume_array(data)?))
}

/// Retrieve a little-endian `i64` from the start of the given slice, if possible.
pub(crate) fn consume_i64(data: &mut &[u8]) -> Result<i64, Error> {
    Ok(i64::from_le_bytes(consume_array(data)?))
}

/// Return the byte blob held by a [`KeyParam`], if it holds one.
fn blob_value(param: &KeyParam) -> Option<&[u8]> {
    match param {
        KeyParam::ApplicationId(v)
        | KeyParam::ApplicationData(v)
        | KeyParam::RootOfTrust(v)
        | KeyParam::AssociatedData(v)
        | KeyParam::Nonce(v) => Some(v),
        _ => None,
    }
}

/// Size of the serialized form of an individual parameter, excluding any blob contents.
fn element_size(param: &KeyParam) -> usize {
    4 + match param {
        KeyParam::CallerNonce
        | KeyParam::AllUsers
        | KeyParam::NoAuthRequired
        | KeyParam::AllApplications => 1,
        KeyParam::RsaPublicExponent(_)
        | KeyParam::ActiveDatetime(_)
        | KeyParam::OriginationExpireDatetime(_)
        | KeyParam::UsageExpireDatetime(_)
        | KeyParam::CreationDatetime(_)
        | KeyParam::ApplicationId(_)
        | KeyParam::ApplicationData(_)
        | KeyParam::RootOfTrust(_)
        | KeyParam::AssociatedData(_)
        | KeyParam::Nonce(_) => 8,
        _ => 4,
    }
}

/// Return the size of the serialized form of a collection of [`KeyParam`]s, as produced by
/// [`serialize`].
pub fn serialized_size(params: &[KeyParam]) -> usize {
    let blobs: usize = params.iter().filter_map(blob_value).map(|v| v.len()).sum();
    let elems: usize = params.iter().map(element_size).sum();
    HEADER_SIZE + blobs + elems
}

/// Convert a length to the `u32` used on the wire.
fn len_u32(len: usize) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_e| km_err!(InvalidArgument, "length {} too large", len))
}

/// Serialize a collection of [`KeyParam`]s into a flat little-endian format:
///
/// ```text
/// [0..4]              Size B of `TagType::Bytes` data.
/// [4..4+B]      (*)   Concatenated contents of each `TagType::Bytes` tag.
/// [4+B..4+B+4]        Count N of the number of parameters.
/// [8+B..8+B+4]        Size Z of encoded parameters.
/// [12+B..12+B+Z]      Serialized parameters one after another.
/// ```
///
/// Individual parameters are serialized in the last chunk as:
///
/// ```text
/// [0..4]              Tag number.
/// Followed by one of the following depending on the tag's `TagType`:
///   [4..5]            Bool value (`TagType::Bool`)
///   [4..8]            u32 values (`TagType::Uint[Rep]`, `TagType::Enum[Rep]`)
///   [4..12]           u64/i64 values (`TagType::Ulong`, `TagType::Date`)
///   [4..8] + [8..12]  Size + offset of data in (*) above (`TagType::Bytes`)
/// ```
pub fn serialize(params: &[KeyParam]) -> Result<Vec<u8>, Error> {
    let mut result = vec_try_with_capacity!(serialized_size(params))?;

    // First come the length and contents of all of the [`TagType::Bytes`] data.
    let blob_size: usize = params.iter().filter_map(blob_value).map(|v| v.len()).sum();
    result.try_extend_from_slice(&len_u32(blob_size)?.to_le_bytes())?;
    for v in params.iter().filter_map(blob_value) {
        result.try_extend_from_slice(v)?;
    }

    result.try_extend_from_slice(&len_u32(params.len())?.to_le_bytes())?;
    let elems_size: usize = params.iter().map(element_size).sum();
    result.try_extend_from_slice(&len_u32(elems_size)?.to_le_bytes())?;

    let mut blob_offset = 0u32;
    for param in params {
        result.try_extend_from_slice(&(param.tag() as u32).to_le_bytes())?;
        match param {
            // Enum-holding variants.
            KeyParam::Purpose(v) => result.try_extend_from_slice(&(*v as u32).to_le_bytes())?,
            KeyParam::Algorithm(v) => result.try_extend_from_slice(&(*v as u32).to_le_bytes())?,
            KeyParam::BlockMode(v) => result.try_extend_from_slice(&(*v as u32).to_le_bytes())?,
            KeyParam::Digest(v) => result.try_extend_from_slice(&(*v as u32).to_le_bytes())?,
            KeyParam::Padding(v) => result.try_extend_from_slice(&(*v as u32).to_le_bytes())?,
            KeyParam::Origin(v) => result.try_extend_from_slice(&(*v as u32).to_le_bytes())?,

            // `u32`-holding variants.
            KeyParam::KeySize(v) => result.try_extend_from_slice(&v.0.to_le_bytes())?,
            KeyParam::UserId(v)
            | KeyParam::UserAuthId(v)
            | KeyParam::AuthTimeout(v)
            | KeyParam::MacLength(v)
            | KeyParam::ChunkLength(v) => result.try_extend_from_slice(&v.to_le_bytes())?,

            // `u64`-holding variants.
            KeyParam::RsaPublicExponent(v) => result.try_extend_from_slice(&v.0.to_le_bytes())?,

            // `true`-holding variants.
            KeyParam::CallerNonce
            | KeyParam::AllUsers
            | KeyParam::NoAuthRequired
            | KeyParam::AllApplications => result.try_push(0x01u8)?,

            // `DateTime`-holding variants.
            KeyParam::ActiveDatetime(v)
            | KeyParam::OriginationExpireDatetime(v)
            | KeyParam::UsageExpireDatetime(v)
            | KeyParam::CreationDatetime(v) => {
                result.try_extend_from_slice(&v.ms_since_epoch.to_le_bytes())?
            }

            // `Vec<u8>`-holding variants.
            KeyParam::ApplicationId(v)
            | KeyParam::ApplicationData(v)
            | KeyParam::RootOfTrust(v)
            | KeyParam::AssociatedData(v)
            | KeyParam::Nonce(v) => {
                let blob_len = len_u32(v.len())?;
                result.try_extend_from_slice(&blob_len.to_le_bytes())?;
                result.try_extend_from_slice(&blob_offset.to_le_bytes())?;
                blob_offset += blob_len;
            }
        }
    }
    Ok(result)
}

/// Retrieve the contents of a tag of `TagType::Bytes`.  The `data` parameter holds
/// the as-yet unparsed data, and a length and offset are read from this (and consumed).
/// This length and offset refer to a location in the combined `blob_data`; however,
/// the offset is expected to be the next unconsumed chunk of `blob_data`, as indicated
/// by `next_blob_offset` (which itself is updated as a result of consuming the data).
fn consume_blob(
    data: &mut &[u8],
    next_blob_offset: &mut usize,
    blob_data: &[u8],
) -> Result<Vec<u8>, Error> {
    let data_len = consume_u32(data)? as usize;
    let data_offset = consume_u32(data)? as usize;
    // Expect the blob data to come from the next offset in the initial blob chunk.
    if data_offset != *next_blob_offset {
        return Err(km_err!(
            InvalidKeyBlob,
            "got blob offset {} instead of {}",
            data_offset,
            next_blob_offset
        ));
    }
    let end = data_offset
        .checked_add(data_len)
        .filter(|end| *end <= blob_data.len())
        .ok_or_else(|| {
            km_err!(
                InvalidKeyBlob,
                "blob at offset [{}..{}+{}] goes beyond blob data size {}",
                data_offset,
                data_offset,
                data_len,
                blob_data.len(),
            )
        })?;
    *next_blob_offset = end;
    try_to_vec(&blob_data[data_offset..end])
}

/// Deserialize a collection of [`KeyParam`]s in the format produced by [`serialize`]. The
/// provided slice is modified to contain the unconsumed part of the data.
pub fn deserialize(data: &mut &[u8]) -> Result<Vec<KeyParam>, Error> {
    let blob_data_size = consume_u32(data)? as usize;
    if blob_data_size > data.len() {
        return Err(km_err!(
            InvalidKeyBlob,
            "blob data size {} beyond remaining {}",
            blob_data_size,
            data.len()
        ));
    }
    let (blob_data, rest) = data.split_at(blob_data_size);
    let mut next_blob_offset = 0;

    // Move past the blob data.
    *data = rest;

    let param_count = consume_u32(data)? as usize;
    let param_size = consume_u32(data)? as usize;
    if param_size > data.len() {
        return Err(km_err!(
            InvalidKeyBlob,
            "size mismatch 4+{}+4+4+{} > {}",
            blob_data_size,
            param_size,
            data.len()
        ));
    }
    // Every parameter takes at least 5 bytes, which bounds the count.
    if param_count > param_size / 5 {
        return Err(km_err!(
            InvalidKeyBlob,
            "{} params cannot fit in {} bytes",
            param_count,
            param_size
        ));
    }
    let (mut elems, rest) = data.split_at(param_size);
    *data = rest;
    let data = &mut elems;

    let mut results = vec_try_with_capacity!(param_count)?;
    for _i in 0..param_count {
        let tag_num = consume_u32(data)? as i32;
        let tag = <Tag>::try_from(tag_num)
            .map_err(|_e| km_err!(InvalidKeyBlob, "unknown tag {} encountered", tag_num))?;
        let enum_err = |_e| km_err!(InvalidKeyBlob, "unknown enum value for {:?}", tag);
        results.try_push(match tag {
            // Enum-holding variants.
            Tag::Purpose => {
                KeyParam::Purpose(KeyPurpose::try_from(consume_i32(data)?).map_err(enum_err)?)
            }
            Tag::Algorithm => {
                KeyParam::Algorithm(Algorithm::try_from(consume_i32(data)?).map_err(enum_err)?)
            }
            Tag::BlockMode => {
                KeyParam::BlockMode(BlockMode::try_from(consume_i32(data)?).map_err(enum_err)?)
            }
            Tag::Digest => {
                KeyParam::Digest(Digest::try_from(consume_i32(data)?).map_err(enum_err)?)
            }
            Tag::Padding => {
                KeyParam::Padding(PaddingMode::try_from(consume_i32(data)?).map_err(enum_err)?)
            }
            Tag::Origin => {
                KeyParam::Origin(KeyOrigin::try_from(consume_i32(data)?).map_err(enum_err)?)
            }

            // `u32`-holding variants.
            Tag::KeySize => KeyParam::KeySize(KeySizeInBits(consume_u32(data)?)),
            Tag::UserId => KeyParam::UserId(consume_u32(data)?),
            Tag::UserAuthId => KeyParam::UserAuthId(consume_u32(data)?),
            Tag::AuthTimeout => KeyParam::AuthTimeout(consume_u32(data)?),
            Tag::MacLength => KeyParam::MacLength(consume_u32(data)?),
            Tag::ChunkLength => KeyParam::ChunkLength(consume_u32(data)?),

            // `u64`-holding variants.
            Tag::RsaPublicExponent => KeyParam::RsaPublicExponent(RsaExponent(consume_u64(data)?)),

            // `true`-holding variants.
            Tag::CallerNonce => {
                consume_bool(data)?;
                KeyParam::CallerNonce
            }
            Tag::AllUsers => {
                consume_bool(data)?;
                KeyParam::AllUsers
            }
            Tag::NoAuthRequired => {
                consume_bool(data)?;
                KeyParam::NoAuthRequired
            }
            Tag::AllApplications => {
                consume_bool(data)?;
                KeyParam::AllApplications
            }

            // `DateTime`-holding variants.
            Tag::ActiveDatetime => {
                KeyParam::ActiveDatetime(DateTime { ms_since_epoch: consume_i64(data)? })
            }
            Tag::OriginationExpireDatetime => {
                KeyParam::OriginationExpireDatetime(DateTime { ms_since_epoch: consume_i64(data)? })
            }
            Tag::UsageExpireDatetime => {
                KeyParam::UsageExpireDatetime(DateTime { ms_since_epoch: consume_i64(data)? })
            }
            Tag::CreationDatetime => {
                KeyParam::CreationDatetime(DateTime { ms_since_epoch: consume_i64(data)? })
            }

            // `Vec<u8>`-holding variants.
            Tag::ApplicationId => {
                KeyParam::ApplicationId(consume_blob(data, &mut next_blob_offset, blob_data)?)
            }
            Tag::ApplicationData => {
                KeyParam::ApplicationData(consume_blob(data, &mut next_blob_offset, blob_data)?)
            }
            Tag::RootOfTrust => {
                KeyParam::RootOfTrust(consume_blob(data, &mut next_blob_offset, blob_data)?)
            }
            Tag::AssociatedData => {
                KeyParam::AssociatedData(consume_blob(data, &mut next_blob_offset, blob_data)?)
            }
            Tag::Nonce => KeyParam::Nonce(consume_blob(data, &mut next_blob_offset, blob_data)?),

            Tag::Invalid => {
                return Err(km_err!(InvalidKeyBlob, "invalid tag {:?} encountered", tag));
            }
        })?;
    }
    if !data.is_empty() {
        return Err(km_err!(InvalidKeyBlob, "{} bytes of element data left over", data.len()));
    }
    if next_blob_offset != blob_data.len() {
        return Err(km_err!(
            InvalidKeyBlob,
            "only {} of {} bytes of blob data used",
            next_blob_offset,
            blob_data.len()
        ));
    }
    Ok(results)
}

/// Determine the ordering of two [`KeyParam`] values, for use in sorting so that the order
/// of key characteristics is stable.  Parameters are ordered by tag, then by value.
pub fn param_compare(left: &KeyParam, right: &KeyParam) -> Ordering {
    match (left, right) {
        (KeyParam::Purpose(l), KeyParam::Purpose(r)) => l.cmp(r),
        (KeyParam::Algorithm(l), KeyParam::Algorithm(r)) => l.cmp(r),
        (KeyParam::KeySize(l), KeyParam::KeySize(r)) => l.cmp(r),
        (KeyParam::BlockMode(l), KeyParam::BlockMode(r)) => l.cmp(r),
        (KeyParam::Digest(l), KeyParam::Digest(r)) => l.cmp(r),
        (KeyParam::Padding(l), KeyParam::Padding(r)) => l.cmp(r),
        (KeyParam::CallerNonce, KeyParam::CallerNonce) => Ordering::Equal,
        (KeyParam::RsaPublicExponent(l), KeyParam::RsaPublicExponent(r)) => l.cmp(r),
        (KeyParam::ActiveDatetime(l), KeyParam::ActiveDatetime(r)) => l.cmp(r),
        (KeyParam::OriginationExpireDatetime(l), KeyParam::OriginationExpireDatetime(r)) => {
            l.cmp(r)
        }
        (KeyParam::UsageExpireDatetime(l), KeyParam::UsageExpireDatetime(r)) => l.cmp(r),
        (KeyParam::AllUsers, KeyParam::AllUsers) => Ordering::Equal,
        (KeyParam::UserId(l), KeyParam::UserId(r)) => l.cmp(r),
        (KeyParam::UserAuthId(l), KeyParam::UserAuthId(r)) => l.cmp(r),
        (KeyParam::NoAuthRequired, KeyParam::NoAuthRequired) => Ordering::Equal,
        (KeyParam::AuthTimeout(l), KeyParam::AuthTimeout(r)) => l.cmp(r),
        (KeyParam::AllApplications, KeyParam::AllApplications) => Ordering::Equal,
        (KeyParam::ApplicationId(l), KeyParam::ApplicationId(r)) => l.cmp(r),
        (KeyParam::ApplicationData(l), KeyParam::ApplicationData(r)) => l.cmp(r),
        (KeyParam::CreationDatetime(l), KeyParam::CreationDatetime(r)) => l.cmp(r),
        (KeyParam::Origin(l), KeyParam::Origin(r)) => l.cmp(r),
        (KeyParam::RootOfTrust(l), KeyParam::RootOfTrust(r)) => l.cmp(r),
        (KeyParam::AssociatedData(l), KeyParam::AssociatedData(r)) => l.cmp(r),
        (KeyParam::Nonce(l), KeyParam::Nonce(r)) => l.cmp(r),
        (KeyParam::MacLength(l), KeyParam::MacLength(r)) => l.cmp(r),
        (KeyParam::ChunkLength(l), KeyParam::ChunkLength(r)) => l.cmp(r),

        (left, right) => left.tag().cmp(&right.tag()),
    }
}
