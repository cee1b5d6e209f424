//! COSE algorithm identifiers used by security contexts.
//!
//! Identifiers are carried around as raw COSE integers at the API edge and
//! resolved here, so an unsupported value fails at the point of use.

use ciborium::value::Value;

use crate::core::CryptoError;

/// AEAD algorithms a security context can be derived for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AeadAlgorithm {
    /// AES-CCM, 16-bit length, 64-bit tag, 128-bit key.
    #[default]
    AesCcm16_64_128,
    /// AES-CCM, 16-bit length, 128-bit tag, 128-bit key.
    AesCcm16_128_128,
    /// AES-GCM with a 128-bit key.
    A128Gcm,
    /// AES-GCM with a 256-bit key.
    A256Gcm,
    /// ChaCha20/Poly1305.
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    /// COSE identifier of AES-CCM-16-64-128, the protocol default.
    pub const DEFAULT_COSE: i64 = 10;

    /// Resolve a COSE identifier.
    pub fn from_cose(value: i64) -> Result<Self, CryptoError> {
        match value {
            10 => Ok(Self::AesCcm16_64_128),
            30 => Ok(Self::AesCcm16_128_128),
            1 => Ok(Self::A128Gcm),
            3 => Ok(Self::A256Gcm),
            24 => Ok(Self::ChaCha20Poly1305),
            other => Err(CryptoError::UnknownAlgorithm(other)),
        }
    }

    /// COSE identifier.
    pub fn cose_value(self) -> i64 {
        match self {
            Self::AesCcm16_64_128 => 10,
            Self::AesCcm16_128_128 => 30,
            Self::A128Gcm => 1,
            Self::A256Gcm => 3,
            Self::ChaCha20Poly1305 => 24,
        }
    }

    /// Key length in bytes.
    pub fn key_size(self) -> usize {
        match self {
            Self::AesCcm16_64_128 | Self::AesCcm16_128_128 | Self::A128Gcm => 16,
            Self::A256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    /// Nonce length in bytes.
    pub fn nonce_size(self) -> usize {
        match self {
            Self::AesCcm16_64_128 | Self::AesCcm16_128_128 => 13,
            Self::A128Gcm | Self::A256Gcm | Self::ChaCha20Poly1305 => 12,
        }
    }

    /// Authentication tag length in bytes.
    pub fn tag_size(self) -> usize {
        match self {
            Self::AesCcm16_64_128 => 8,
            _ => 16,
        }
    }
}

/// HKDF hash variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum KdfAlgorithm {
    /// HKDF with SHA-256.
    #[default]
    HkdfSha256,
    /// HKDF with SHA-512.
    HkdfSha512,
}

impl KdfAlgorithm {
    /// COSE identifier of HKDF-SHA-256.
    pub const HKDF_SHA_256: i64 = -10;
    /// COSE identifier of HKDF-SHA-512.
    pub const HKDF_SHA_512: i64 = -11;
    /// COSE identifier of ECDH-SS + HKDF-256.
    pub const ECDH_SS_HKDF_256: i64 = -27;
    /// COSE identifier of ECDH-SS + HKDF-512.
    pub const ECDH_SS_HKDF_512: i64 = -28;

    /// Resolve a COSE identifier; `None` selects SHA-256.
    pub fn from_cose(value: Option<i64>) -> Result<Self, CryptoError> {
        match value {
            None | Some(Self::HKDF_SHA_256) | Some(Self::ECDH_SS_HKDF_256) => Ok(Self::HkdfSha256),
            Some(Self::HKDF_SHA_512) | Some(Self::ECDH_SS_HKDF_512) => Ok(Self::HkdfSha512),
            Some(other) => Err(CryptoError::UnknownAlgorithm(other)),
        }
    }

    /// COSE identifier.
    pub fn cose_value(self) -> i64 {
        match self {
            Self::HkdfSha256 => Self::HKDF_SHA_256,
            Self::HkdfSha512 => Self::HKDF_SHA_512,
        }
    }
}

/// Counter-signature algorithms supported for group contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// ECDSA with SHA-256 on P-256.
    Es256,
    /// EdDSA on Ed25519.
    EdDsa,
}

impl SignatureAlgorithm {
    /// Resolve a COSE identifier.
    pub fn from_cose(value: i64) -> Result<Self, CryptoError> {
        match value {
            -7 => Ok(Self::Es256),
            -8 => Ok(Self::EdDsa),
            other => Err(CryptoError::UnsupportedSignatureAlgorithm(other)),
        }
    }

    /// COSE identifier.
    pub fn cose_value(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::EdDsa => -8,
        }
    }

    /// Signature length in bytes.
    pub fn signature_size(self) -> usize {
        64
    }

    /// Default capability descriptors for this algorithm.
    ///
    /// ES256: `[[2], [2, 1]]` / `[2, 1]` (EC2 on P-256).
    /// EdDSA: `[[1], [1, 6]]` / `[1, 6]` (OKP on Ed25519).
    pub fn default_capabilities(self) -> CounterSignCapabilities {
        let (kty, crv) = match self {
            Self::Es256 => (2, 1),
            Self::EdDsa => (1, 6),
        };
        let key = Value::Array(vec![int(kty), int(crv)]);
        let alg = Value::Array(vec![Value::Array(vec![int(kty)]), key.clone()]);
        CounterSignCapabilities { alg, key }
    }
}

/// Capability descriptors handed to the counter-signature primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct CounterSignCapabilities {
    /// Algorithm capabilities.
    pub alg: Value,
    /// Key capabilities.
    pub key: Value,
}

impl CounterSignCapabilities {
    /// CBOR encoding of the algorithm capabilities.
    pub fn alg_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        encode(&self.alg)
    }

    /// CBOR encoding of the key capabilities.
    pub fn key_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        encode(&self.key)
    }
}

fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

pub(crate) fn encode(value: &Value) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(out)
}
