use crate::{openssl_err, ossl};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ops::DerefMut;
use openssl::ec::EcKey;
use openssl::nid::Nid;
use openssl::pkey::Private;
use skm_common::{crypto, crypto::ec, km_err, Error, FallibleAllocExt};
use skm_wire::keymaster;

/// [`crypto::Ec`] implementation based on OpenSSL.
#[derive(Default)]
pub struct OpenSslEc;

impl crypto::Ec for OpenSslEc {
    fn generate_nist_key(
        &self,
        _rng: &mut dyn crypto::Rng,
        curve: ec::NistCurve,
        _params: &[keymaster::KeyParam],
    ) -> Result<crypto::KeyMaterial, Error> {
        let ec_key = ossl!(EcKey::<Private>::generate(nist_curve_to_group(curve)?.as_ref()))?;
        let nist_key = ec::NistKey(ossl!(ec_key.private_key_to_der())?);
        Ok(crypto::KeyMaterial::Ec(curve, nist_key))
    }

    fn nist_public_key(&self, key: &ec::NistKey, curve: ec::NistCurve) -> Result<Vec<u8>, Error> {
        let group = nist_curve_to_group(curve)?;
        let ec_key = ossl!(EcKey::private_key_from_der(&key.0))?;
        let pt = ec_key.public_key();
        let mut bn_ctx = ossl!(openssl::bn::BigNumContext::new())?;
        ossl!(pt.to_bytes(
            group.as_ref(),
            openssl::ec::PointConversionForm::UNCOMPRESSED,
            bn_ctx.deref_mut()
        ))
    }

    fn begin_sign(
        &self,
        key: ec::NistKey,
        curve: ec::NistCurve,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        Ok(Box::new(OpenSslEcSignOperation { input: TruncatedInput::new(&key, curve)? }))
    }

    fn begin_verify(
        &self,
        key: ec::NistKey,
        curve: ec::NistCurve,
    ) -> Result<Box<dyn crypto::VerifyingOperation>, Error> {
        Ok(Box::new(OpenSslEcVerifyOperation { input: TruncatedInput::new(&key, curve)? }))
    }
}

/// Key plus the leading bytes of the message, up to the curve's coordinate length.
struct TruncatedInput {
    ec_key: EcKey<Private>,
    pending_input: Vec<u8>,
    max_size: usize,
}

impl TruncatedInput {
    fn new(key: &ec::NistKey, curve: ec::NistCurve) -> Result<Self, Error> {
        let ec_key = ossl!(EcKey::private_key_from_der(&key.0))?;
        if ec_key.group().curve_name() != Some(curve_nid(curve)) {
            return Err(km_err!(InvalidKeyBlob, "EC key material is not on curve {:?}", curve));
        }
        Ok(Self { ec_key, pending_input: Vec::new(), max_size: curve.coord_len() })
    }

    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        // Data beyond the coordinate length is consumed but plays no part in the signature.
        let max_extra_data = self.max_size - self.pending_input.len();
        if max_extra_data > 0 {
            let len = core::cmp::min(max_extra_data, data.len());
            self.pending_input.try_extend_from_slice(&data[..len])?;
        }
        Ok(())
    }
}

/// [`crypto::AccumulatingOperation`] implementation for ECDSA signing based on OpenSSL.
pub struct OpenSslEcSignOperation {
    input: TruncatedInput,
}

impl crypto::AccumulatingOperation for OpenSslEcSignOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.input.update(data)
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let sig = ossl!(openssl::ecdsa::EcdsaSig::sign(
            &self.input.pending_input,
            &self.input.ec_key
        ))?;
        let sig = ossl!(sig.to_der())?;
        Ok(sig)
    }
}

/// [`crypto::VerifyingOperation`] implementation for ECDSA based on OpenSSL.
pub struct OpenSslEcVerifyOperation {
    input: TruncatedInput,
}

impl crypto::VerifyingOperation for OpenSslEcVerifyOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.input.update(data)
    }

    fn finish(self: Box<Self>, signature: &[u8]) -> Result<(), Error> {
        let sig = openssl::ecdsa::EcdsaSig::from_der(signature)
            .map_err(|_e| km_err!(VerificationFailed, "signature is not DER-encoded"))?;
        let ok = sig.verify(&self.input.pending_input, &self.input.ec_key).unwrap_or(false);
        if !ok {
            return Err(km_err!(VerificationFailed, "ECDSA signature mismatch"));
        }
        Ok(())
    }
}

fn curve_nid(curve: ec::NistCurve) -> Nid {
    match curve {
        ec::NistCurve::P224 => Nid::SECP224R1,
        ec::NistCurve::P256 => Nid::X9_62_PRIME256V1,
        ec::NistCurve::P384 => Nid::SECP384R1,
        ec::NistCurve::P521 => Nid::SECP521R1,
    }
}

fn nist_curve_to_group(curve: ec::NistCurve) -> Result<openssl::ec::EcGroup, Error> {
    openssl::ec::EcGroup::from_curve_name(curve_nid(curve))
        .map_err(openssl_err!("failed to determine EcGroup"))
}
