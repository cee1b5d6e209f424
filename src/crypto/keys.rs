//! Counter-signature keys for group members.
//!
//! A key is either an ES256 (P-256) or EdDSA (Ed25519) key, public only or
//! with its private half, optionally declaring the algorithm it may be used
//! with. The same key drives static-static agreement for pairwise contexts:
//! ECDH on P-256, X25519 on the Montgomery form of Ed25519 keys.

use std::fmt;

use ed25519_dalek::{Signer as _, Verifier as _};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::core::CryptoError;

use super::algorithms::SignatureAlgorithm;

#[derive(Clone)]
enum KeyMaterial {
    Es256 {
        secret: Option<p256::SecretKey>,
        public: p256::PublicKey,
    },
    EdDsa {
        secret: Option<ed25519_dalek::SigningKey>,
        public: ed25519_dalek::VerifyingKey,
    },
}

/// Asymmetric key used for counter-signatures and pairwise key agreement.
#[derive(Clone)]
pub struct CounterSignKey {
    algorithm: Option<SignatureAlgorithm>,
    material: KeyMaterial,
}

impl CounterSignKey {
    /// Generate a fresh private key that declares `algorithm`.
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        let material = match algorithm {
            SignatureAlgorithm::Es256 => {
                let secret = p256::SecretKey::random(&mut OsRng);
                KeyMaterial::Es256 {
                    public: secret.public_key(),
                    secret: Some(secret),
                }
            }
            SignatureAlgorithm::EdDsa => {
                let secret = ed25519_dalek::SigningKey::generate(&mut OsRng);
                KeyMaterial::EdDsa {
                    public: secret.verifying_key(),
                    secret: Some(secret),
                }
            }
        };
        Self {
            algorithm: Some(algorithm),
            material,
        }
    }

    /// P-256 private key from its 32-byte scalar.
    pub fn es256_from_secret(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = p256::SecretKey::from_slice(bytes)
            .map_err(|_| CryptoError::InvalidKey("invalid P-256 scalar".into()))?;
        Ok(Self {
            algorithm: None,
            material: KeyMaterial::Es256 {
                public: secret.public_key(),
                secret: Some(secret),
            },
        })
    }

    /// P-256 public key from a SEC1 encoded point.
    pub fn es256_from_public(sec1: &[u8]) -> Result<Self, CryptoError> {
        let public = p256::PublicKey::from_sec1_bytes(sec1)
            .map_err(|_| CryptoError::InvalidKey("invalid P-256 point".into()))?;
        Ok(Self {
            algorithm: None,
            material: KeyMaterial::Es256 {
                secret: None,
                public,
            },
        })
    }

    /// Ed25519 private key from its 32-byte seed.
    pub fn ed25519_from_secret(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Ed25519 seed must be 32 bytes".into()))?;
        let secret = ed25519_dalek::SigningKey::from_bytes(&seed);
        Ok(Self {
            algorithm: None,
            material: KeyMaterial::EdDsa {
                public: secret.verifying_key(),
                secret: Some(secret),
            },
        })
    }

    /// Ed25519 public key from its 32-byte encoding.
    pub fn ed25519_from_public(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Ed25519 key must be 32 bytes".into()))?;
        let public = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| CryptoError::InvalidKey("invalid Ed25519 point".into()))?;
        Ok(Self {
            algorithm: None,
            material: KeyMaterial::EdDsa {
                secret: None,
                public,
            },
        })
    }

    /// Declare the algorithm this key may be used with.
    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Algorithm declared on the key, if any.
    pub fn declared_algorithm(&self) -> Option<SignatureAlgorithm> {
        self.algorithm
    }

    /// Algorithm family implied by the key material.
    pub fn key_type(&self) -> SignatureAlgorithm {
        match self.material {
            KeyMaterial::Es256 { .. } => SignatureAlgorithm::Es256,
            KeyMaterial::EdDsa { .. } => SignatureAlgorithm::EdDsa,
        }
    }

    /// True if the key can be used with `algorithm`: the material fits and
    /// the declared algorithm, when present, is the same.
    pub fn is_compatible(&self, algorithm: SignatureAlgorithm) -> bool {
        self.key_type() == algorithm && self.algorithm.is_none_or(|declared| declared == algorithm)
    }

    /// True if the private half is present.
    pub fn has_private(&self) -> bool {
        match &self.material {
            KeyMaterial::Es256 { secret, .. } => secret.is_some(),
            KeyMaterial::EdDsa { secret, .. } => secret.is_some(),
        }
    }

    /// Copy of this key without the private half.
    pub fn public_key(&self) -> Self {
        let material = match &self.material {
            KeyMaterial::Es256 { public, .. } => KeyMaterial::Es256 {
                secret: None,
                public: *public,
            },
            KeyMaterial::EdDsa { public, .. } => KeyMaterial::EdDsa {
                secret: None,
                public: *public,
            },
        };
        Self {
            algorithm: self.algorithm,
            material,
        }
    }

    /// Encoded public key: SEC1 uncompressed point or the Ed25519 encoding.
    pub fn public_bytes(&self) -> Vec<u8> {
        match &self.material {
            KeyMaterial::Es256 { public, .. } => {
                p256::EncodedPoint::from(public).as_bytes().to_vec()
            }
            KeyMaterial::EdDsa { public, .. } => public.to_bytes().to_vec(),
        }
    }

    /// Sign `message` with the private half.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.material {
            KeyMaterial::Es256 {
                secret: Some(secret),
                ..
            } => {
                let signer = p256::ecdsa::SigningKey::from(secret.clone());
                let signature: p256::ecdsa::Signature = signer
                    .try_sign(message)
                    .map_err(|_| CryptoError::SignatureFailed)?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyMaterial::EdDsa {
                secret: Some(secret),
                ..
            } => Ok(secret.sign(message).to_bytes().to_vec()),
            _ => Err(CryptoError::InvalidKey("private key required for signing".into())),
        }
    }

    /// Verify a signature produced by [`sign`](Self::sign).
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        match &self.material {
            KeyMaterial::Es256 { public, .. } => {
                let signature = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| CryptoError::SignatureInvalid)?;
                p256::ecdsa::VerifyingKey::from(public)
                    .verify(message, &signature)
                    .map_err(|_| CryptoError::SignatureInvalid)
            }
            KeyMaterial::EdDsa { public, .. } => {
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| CryptoError::SignatureInvalid)?;
                public
                    .verify(message, &signature)
                    .map_err(|_| CryptoError::SignatureInvalid)
            }
        }
    }

    /// Static-static key agreement between this private key and `peer`'s
    /// public key, left-padded to `size` bytes.
    pub fn agree(&self, peer: &CounterSignKey, size: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let shared: Zeroizing<Vec<u8>> = match (&self.material, &peer.material) {
            (
                KeyMaterial::Es256 {
                    secret: Some(secret),
                    ..
                },
                KeyMaterial::Es256 { public, .. },
            ) => {
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                Zeroizing::new(shared.raw_secret_bytes().to_vec())
            }
            (
                KeyMaterial::EdDsa {
                    secret: Some(secret),
                    ..
                },
                KeyMaterial::EdDsa { public, .. },
            ) => {
                let scalar = Zeroizing::new(secret.to_scalar_bytes());
                let secret = x25519_dalek::StaticSecret::from(*scalar);
                let public = x25519_dalek::PublicKey::from(public.to_montgomery().to_bytes());
                Zeroizing::new(secret.diffie_hellman(&public).as_bytes().to_vec())
            }
            (KeyMaterial::Es256 { secret: None, .. } | KeyMaterial::EdDsa { secret: None, .. }, _) => {
                return Err(CryptoError::KeyAgreementFailed(
                    "private key required".into(),
                ));
            }
            _ => {
                return Err(CryptoError::KeyAgreementFailed(
                    "keys use different curves".into(),
                ));
            }
        };
        left_pad(&shared, size)
    }
}

fn left_pad(bytes: &[u8], size: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if bytes.len() > size {
        return Err(CryptoError::KeyAgreementFailed(format!(
            "shared secret of {} bytes exceeds {size}",
            bytes.len()
        )));
    }
    let mut out = Zeroizing::new(vec![0u8; size]);
    out[size - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

impl fmt::Debug for CounterSignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterSignKey")
            .field("key_type", &self.key_type())
            .field("algorithm", &self.algorithm)
            .field("private", &self.has_private())
            .finish()
    }
}
