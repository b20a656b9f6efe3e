//! Ordered collection of authorizations.

use super::legacy;
use crate::{km_err, try_to_vec, Error, FallibleAllocExt};
use alloc::vec::Vec;
use skm_wire::{
    keymaster::{
        Algorithm, BlockMode, DateTime, Digest, KeyOrigin, KeyParam, KeyPurpose, PaddingMode, Tag,
    },
    KeySizeInBits, RsaExponent,
};

/// Types that can be extracted from a [`KeyParam`] by [`AuthorizationSet::get`].
pub trait ParamValue: Sized {
    /// Return the value held by `param`, or `None` if it holds a different kind of value.
    fn from_param(param: &KeyParam) -> Option<Self>;
}

macro_rules! param_value {
    { $ty:ty => $( $variant:ident ),+ } => {
        impl ParamValue for $ty {
            fn from_param(param: &KeyParam) -> Option<Self> {
                match param {
                    $( KeyParam::$variant(v) => Some(v.clone()), )+
                    _ => None,
                }
            }
        }
    };
}

param_value! { KeyPurpose => Purpose }
param_value! { Algorithm => Algorithm }
param_value! { BlockMode => BlockMode }
param_value! { Digest => Digest }
param_value! { PaddingMode => Padding }
param_value! { KeyOrigin => Origin }
param_value! { KeySizeInBits => KeySize }
param_value! { RsaExponent => RsaPublicExponent }
param_value! { u32 => UserId, UserAuthId, AuthTimeout, MacLength, ChunkLength }
param_value! {
    DateTime => ActiveDatetime, OriginationExpireDatetime, UsageExpireDatetime, CreationDatetime
}
param_value! { Vec<u8> => ApplicationId, ApplicationData, RootOfTrust, AssociatedData, Nonce }

impl ParamValue for bool {
    fn from_param(param: &KeyParam) -> Option<Self> {
        match param {
            KeyParam::CallerNonce
            | KeyParam::AllUsers
            | KeyParam::NoAuthRequired
            | KeyParam::AllApplications => Some(true),
            _ => None,
        }
    }
}

/// An ordered sequence of [`KeyParam`]s.  Insertion order is preserved (and is visible in the
/// serialized form), but equality ignores it.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationSet(Vec<KeyParam>);

impl AuthorizationSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a set holding a copy of `params`.
    pub fn from_slice(params: &[KeyParam]) -> Result<Self, Error> {
        Ok(Self(try_to_vec(params)?))
    }

    pub fn push(&mut self, param: KeyParam) -> Result<(), Error> {
        self.0.try_push(param)?;
        Ok(())
    }

    pub fn push_all(&mut self, params: &[KeyParam]) -> Result<(), Error> {
        self.0.try_extend_from_slice(params)?;
        Ok(())
    }

    /// Return the index of the first parameter with the given tag.
    pub fn find(&self, tag: Tag) -> Option<usize> {
        self.0.iter().position(|p| p.tag() == tag)
    }

    /// Indicate whether a parameter with the given tag is present.
    pub fn contains_tag(&self, tag: Tag) -> bool {
        self.find(tag).is_some()
    }

    /// Indicate whether the exact parameter is present.
    pub fn contains(&self, param: &KeyParam) -> bool {
        self.0.iter().any(|p| p == param)
    }

    /// Return the value of the first parameter with the given tag.  Fails with `InvalidArgument`
    /// if the tag is absent, and with `InvalidTag` if the tag holds a different kind of value
    /// than `T`.
    pub fn get<T: ParamValue>(&self, tag: Tag) -> Result<T, Error> {
        let idx = self
            .find(tag)
            .ok_or_else(|| km_err!(InvalidArgument, "no {:?} authorization", tag))?;
        T::from_param(&self.0[idx]).ok_or_else(|| {
            km_err!(
                InvalidTag,
                "{:?} holds a different kind of value than {}",
                tag,
                core::any::type_name::<T>()
            )
        })
    }

    /// Return the values of every parameter with the given tag, for multi-valued tags.
    pub fn get_all<T: ParamValue>(&self, tag: Tag) -> Result<Vec<T>, Error> {
        let mut result = Vec::new();
        for param in self.0.iter().filter(|p| p.tag() == tag) {
            let value = T::from_param(param)
                .ok_or_else(|| km_err!(InvalidTag, "{:?} holds unexpected value kind", tag))?;
            result.try_push(value)?;
        }
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, KeyParam> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[KeyParam] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<KeyParam> {
        self.0
    }

    /// Size of the canonical serialized encoding.
    pub fn serialized_size(&self) -> usize {
        legacy::serialized_size(&self.0)
    }

    /// Canonical serialized encoding.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        legacy::serialize(&self.0)
    }

    /// Parse a canonical serialized encoding, which must be consumed exactly.
    pub fn deserialize(mut data: &[u8]) -> Result<Self, Error> {
        let params = legacy::deserialize(&mut data)?;
        if !data.is_empty() {
            return Err(km_err!(InvalidKeyBlob, "{} trailing bytes", data.len()));
        }
        Ok(Self(params))
    }

    fn count(&self, param: &KeyParam) -> usize {
        self.0.iter().filter(|p| *p == param).count()
    }
}

impl From<Vec<KeyParam>> for AuthorizationSet {
    fn from(params: Vec<KeyParam>) -> Self {
        Self(params)
    }
}

impl From<AuthorizationSet> for Vec<KeyParam> {
    fn from(set: AuthorizationSet) -> Self {
        set.0
    }
}

impl<'a> IntoIterator for &'a AuthorizationSet {
    type Item = &'a KeyParam;
    type IntoIter = core::slice::Iter<'a, KeyParam>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Sets are equal when they hold the same multiset of parameters, in any order.
impl PartialEq for AuthorizationSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().all(|p| self.count(p) == other.count(p))
    }
}

impl Eq for AuthorizationSet {}
