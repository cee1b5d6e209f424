//! AEAD seal/open for the supported content-encryption algorithms.
//!
//! Ciphertexts carry the tag appended, as produced by the RustCrypto
//! `aead` implementations.

use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use ccm::consts::{U13, U16, U8};
use ccm::Ccm;
use chacha20poly1305::ChaCha20Poly1305;

use crate::core::CryptoError;

use super::algorithms::AeadAlgorithm;

type AesCcm16_64_128 = Ccm<aes::Aes128, U8, U13>;
type AesCcm16_128_128 = Ccm<aes::Aes128, U16, U13>;

/// Encrypt `plaintext` under `key`/`nonce`, authenticating `aad`.
pub fn seal(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_sizes(algorithm, key, nonce)?;
    match algorithm {
        AeadAlgorithm::AesCcm16_64_128 => seal_with::<AesCcm16_64_128>(key, nonce, aad, plaintext),
        AeadAlgorithm::AesCcm16_128_128 => seal_with::<AesCcm16_128_128>(key, nonce, aad, plaintext),
        AeadAlgorithm::A128Gcm => seal_with::<Aes128Gcm>(key, nonce, aad, plaintext),
        AeadAlgorithm::A256Gcm => seal_with::<Aes256Gcm>(key, nonce, aad, plaintext),
        AeadAlgorithm::ChaCha20Poly1305 => seal_with::<ChaCha20Poly1305>(key, nonce, aad, plaintext),
    }
}

/// Decrypt and authenticate `ciphertext` (tag appended).
pub fn open(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_sizes(algorithm, key, nonce)?;
    if ciphertext.len() < algorithm.tag_size() {
        return Err(CryptoError::DecryptionFailed);
    }
    match algorithm {
        AeadAlgorithm::AesCcm16_64_128 => open_with::<AesCcm16_64_128>(key, nonce, aad, ciphertext),
        AeadAlgorithm::AesCcm16_128_128 => open_with::<AesCcm16_128_128>(key, nonce, aad, ciphertext),
        AeadAlgorithm::A128Gcm => open_with::<Aes128Gcm>(key, nonce, aad, ciphertext),
        AeadAlgorithm::A256Gcm => open_with::<Aes256Gcm>(key, nonce, aad, ciphertext),
        AeadAlgorithm::ChaCha20Poly1305 => open_with::<ChaCha20Poly1305>(key, nonce, aad, ciphertext),
    }
}

fn check_sizes(algorithm: AeadAlgorithm, key: &[u8], nonce: &[u8]) -> Result<(), CryptoError> {
    if key.len() != algorithm.key_size() {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} byte key, got {}",
            algorithm.key_size(),
            key.len()
        )));
    }
    if nonce.len() != algorithm.nonce_size() {
        return Err(CryptoError::InvalidNonceLength {
            expected: algorithm.nonce_size(),
            actual: nonce.len(),
        });
    }
    Ok(())
}

fn seal_with<C: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
    cipher
        .encrypt(Nonce::<C>::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)
}

fn open_with<C: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AeadAlgorithm; 5] = [
        AeadAlgorithm::AesCcm16_64_128,
        AeadAlgorithm::AesCcm16_128_128,
        AeadAlgorithm::A128Gcm,
        AeadAlgorithm::A256Gcm,
        AeadAlgorithm::ChaCha20Poly1305,
    ];

    #[test]
    fn test_seal_open_all_algorithms() {
        for alg in ALL {
            let key = vec![0x11; alg.key_size()];
            let nonce = vec![0x22; alg.nonce_size()];
            let sealed = seal(alg, &key, &nonce, b"aad", b"payload").unwrap();
            assert_eq!(sealed.len(), b"payload".len() + alg.tag_size());

            let opened = open(alg, &key, &nonce, b"aad", &sealed).unwrap();
            assert_eq!(opened, b"payload");
        }
    }

    #[test]
    fn test_wrong_aad_fails() {
        let alg = AeadAlgorithm::AesCcm16_64_128;
        let key = [0x01; 16];
        let nonce = [0x02; 13];
        let sealed = seal(alg, &key, &nonce, b"one", b"data").unwrap();
        assert_eq!(
            open(alg, &key, &nonce, b"two", &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_size_checks() {
        let alg = AeadAlgorithm::A128Gcm;
        assert!(matches!(
            seal(alg, &[0u8; 15], &[0u8; 12], b"", b""),
            Err(CryptoError::InvalidKey(_))
        ));
        assert_eq!(
            seal(alg, &[0u8; 16], &[0u8; 13], b"", b""),
            Err(CryptoError::InvalidNonceLength {
                expected: 12,
                actual: 13
            })
        );
        assert_eq!(
            open(alg, &[0u8; 16], &[0u8; 12], b"", &[0u8; 4]),
            Err(CryptoError::DecryptionFailed)
        );
    }
}
