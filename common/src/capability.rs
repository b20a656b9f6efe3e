//! Static tables describing what the engine supports for each algorithm and purpose.

use crate::{km_err, Error};
use skm_wire::keymaster::{Algorithm, BlockMode, Digest, KeyFormat, KeyPurpose, PaddingMode};


/// Modes of operation available for one purpose of an algorithm.  An empty list means that the
/// corresponding parameter does not apply.
#[derive(Debug)]
pub struct PurposeCapabilities {
    pub purposes: &'static [KeyPurpose],
    pub digests: &'static [Digest],
    pub paddings: &'static [PaddingMode],
    pub block_modes: &'static [BlockMode],
}

/// Everything supported for an algorithm.
#[derive(Debug)]
pub struct AlgorithmCapabilities {
    pub algorithm: Algorithm,
    pub operations: &'static [PurposeCapabilities],
    pub import_formats: &'static [KeyFormat],
    pub export_formats: &'static [KeyFormat],
}

const SIGN_VERIFY: &[KeyPurpose] = &[KeyPurpose::Sign, KeyPurpose::Verify];
const ENCRYPT_DECRYPT: &[KeyPurpose] = &[KeyPurpose::Encrypt, KeyPurpose::Decrypt];

const RSA_CAPS: AlgorithmCapabilities = AlgorithmCapabilities {
    algorithm: Algorithm::Rsa,
    operations: &[
        PurposeCapabilities {
            purposes: SIGN_VERIFY,
            digests: &[Digest::None, Digest::Sha256],
            paddings: &[PaddingMode::None, PaddingMode::RsaPkcs115Sign, PaddingMode::RsaPss],
            block_modes: &[],
        },
        PurposeCapabilities {
            purposes: ENCRYPT_DECRYPT,
            digests: &[],
            paddings: &[PaddingMode::RsaOaep, PaddingMode::RsaPkcs115Encrypt],
            block_modes: &[],
        },
    ],
    import_formats: &[KeyFormat::Pkcs8],
    export_formats: &[KeyFormat::X509],
};

const EC_CAPS: AlgorithmCapabilities = AlgorithmCapabilities {
    algorithm: Algorithm::Ec,
    operations: &[PurposeCapabilities {
        purposes: SIGN_VERIFY,
        digests: &[],
        paddings: &[],
        block_modes: &[],
    }],
    import_formats: &[KeyFormat::Pkcs8],
    export_formats: &[KeyFormat::X509],
};

const AES_CAPS: AlgorithmCapabilities = AlgorithmCapabilities {
    algorithm: Algorithm::Aes,
    operations: &[PurposeCapabilities {
        purposes: ENCRYPT_DECRYPT,
        digests: &[],
        paddings: &[PaddingMode::None, PaddingMode::Pkcs7],
        block_modes: &[BlockMode::Ocb, BlockMode::Ecb, BlockMode::Cbc],
    }],
    import_formats: &[KeyFormat::Raw],
    export_formats: &[],
};

const HMAC_CAPS: AlgorithmCapabilities = AlgorithmCapabilities {
    algorithm: Algorithm::Hmac,
    operations: &[PurposeCapabilities {
        purposes: SIGN_VERIFY,
        digests: &[Digest::Sha1, Digest::Sha224, Digest::Sha256, Digest::Sha384, Digest::Sha512],
        paddings: &[],
        block_modes: &[],
    }],
    import_formats: &[KeyFormat::Raw],
    export_formats: &[],
};

/// All supported algorithms, in the order they are reported.
pub const ALGORITHMS: &[AlgorithmCapabilities] = &[RSA_CAPS, EC_CAPS, AES_CAPS, HMAC_CAPS];

/// Return the list of supported algorithms.
pub fn supported_algorithms() -> impl Iterator<Item = Algorithm> {
    ALGORITHMS.iter().map(|caps| caps.algorithm)
}

/// Return the capabilities of an algorithm.
pub fn algorithm_caps(algorithm: Algorithm) -> Result<&'static AlgorithmCapabilities, Error> {
    ALGORITHMS
        .iter()
        .find(|caps| caps.algorithm == algorithm)
        .ok_or_else(|| km_err!(UnsupportedAlgorithm, "algorithm {:?} not supported", algorithm))
}

/// Return the capabilities of an algorithm when used for `purpose`.
pub fn purpose_caps(
    algorithm: Algorithm,
    purpose: KeyPurpose,
) -> Result<&'static PurposeCapabilities, Error> {
    algorithm_caps(algorithm)?
        .operations
        .iter()
        .find(|op| op.purposes.contains(&purpose))
        .ok_or_else(|| {
            km_err!(UnsupportedPurpose, "{:?} not supported for {:?}", purpose, algorithm)
        })
}

pub fn supported_digests(
    algorithm: Algorithm,
    purpose: KeyPurpose,
) -> Result<&'static [Digest], Error> {
    Ok(purpose_caps(algorithm, purpose)?.digests)
}

pub fn supported_paddings(
    algorithm: Algorithm,
    purpose: KeyPurpose,
) -> Result<&'static [PaddingMode], Error> {
    Ok(purpose_caps(algorithm, purpose)?.paddings)
}

pub fn supported_block_modes(
    algorithm: Algorithm,
    purpose: KeyPurpose,
) -> Result<&'static [BlockMode], Error> {
    Ok(purpose_caps(algorithm, purpose)?.block_modes)
}

pub fn supported_import_formats(algorithm: Algorithm) -> Result<&'static [KeyFormat], Error> {
    Ok(algorithm_caps(algorithm)?.import_formats)
}

/// Formats in which the public half of a key can be exported.  Symmetric keys have none.
pub fn supported_export_formats(algorithm: Algorithm) -> Result<&'static [KeyFormat], Error> {
    Ok(algorithm_caps(algorithm)?.export_formats)
}
