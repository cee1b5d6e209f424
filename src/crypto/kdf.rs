//! HKDF expansion of entity keys and IVs.
//!
//! The HKDF info is the CBOR array
//! ```text
//! [ id : bstr, id_context : bstr / nil, alg_aead : int, type : tstr, L : uint ]
//! ```
//! encoded deterministically; it is hashed input, so the encoding must be
//! byte-exact.

use ciborium::value::Value;
use hkdf::Hkdf;
use sha2::{Sha256, Sha512};

use crate::core::{CryptoError, LABEL_IV, LABEL_KEY};

use super::algorithms::{encode, AeadAlgorithm, KdfAlgorithm};

/// Which value the info structure asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoLabel {
    /// Entity key.
    Key,
    /// Common IV.
    Iv,
}

impl InfoLabel {
    fn as_str(self) -> &'static str {
        match self {
            InfoLabel::Key => LABEL_KEY,
            InfoLabel::Iv => LABEL_IV,
        }
    }
}

/// Encode the HKDF info array.
pub fn encode_info(
    id: &[u8],
    id_context: Option<&[u8]>,
    aead: AeadAlgorithm,
    label: InfoLabel,
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let info = Value::Array(vec![
        Value::Bytes(id.to_vec()),
        id_context.map_or(Value::Null, |ctx| Value::Bytes(ctx.to_vec())),
        Value::Integer(aead.cose_value().into()),
        Value::Text(label.as_str().to_owned()),
        Value::Integer((length as u64).into()),
    ]);
    encode(&info)
}

/// HKDF extract-and-expand into `out`.
pub fn expand(
    kdf: KdfAlgorithm,
    secret: &[u8],
    salt: &[u8],
    info: &[u8],
    out: &mut [u8],
) -> Result<(), CryptoError> {
    match kdf {
        KdfAlgorithm::HkdfSha256 => Hkdf::<Sha256>::new(Some(salt), secret)
            .expand(info, out)
            .map_err(|_| CryptoError::KeyDerivationFailed),
        KdfAlgorithm::HkdfSha512 => Hkdf::<Sha512>::new(Some(salt), secret)
            .expand(info, out)
            .map_err(|_| CryptoError::KeyDerivationFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_encoding() {
        let group = [0x37, 0xcb, 0xf3, 0x21, 0x00, 0x17, 0xa2, 0xd3];
        let info = encode_info(&[], Some(&group), AeadAlgorithm::AesCcm16_64_128, InfoLabel::Key, 16)
            .unwrap();

        let mut expected = vec![0x85, 0x40, 0x48];
        expected.extend_from_slice(&group);
        expected.extend_from_slice(&[0x0a, 0x63, b'K', b'e', b'y', 0x10]);
        assert_eq!(info, expected);
    }

    #[test]
    fn test_info_without_context() {
        let info = encode_info(&[0x01], None, AeadAlgorithm::AesCcm16_64_128, InfoLabel::Iv, 13)
            .unwrap();
        assert_eq!(info, vec![0x85, 0x41, 0x01, 0xf6, 0x0a, 0x62, b'I', b'V', 0x0d]);
    }

    #[test]
    fn test_expand_variants_differ() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        expand(KdfAlgorithm::HkdfSha256, b"secret", b"salt", b"info", &mut a).unwrap();
        expand(KdfAlgorithm::HkdfSha512, b"secret", b"salt", b"info", &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expand_too_long() {
        let mut out = vec![0u8; 255 * 32 + 1];
        assert_eq!(
            expand(KdfAlgorithm::HkdfSha256, b"secret", b"", b"", &mut out),
            Err(CryptoError::KeyDerivationFailed)
        );
    }
}
