//! Group contexts: one sender, many recipients, counter-signatures, and
//! pairwise sub-contexts derived by static-static key agreement.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

use ciborium::value::Value;

use crate::core::{ContextError, CryptoError, PAIRWISE_SECRET_SIZE};
use crate::crypto::{CounterSignCapabilities, CounterSignKey, KdfAlgorithm, SignatureAlgorithm};

use super::entity::SharedEntity;
use super::keying::{ContextCounter, MasterKeying};
use super::security::{Derivation, Role, SecurityContext};

/// Input for [`GroupSecurityContext::derive`].
#[derive(Clone, Debug)]
pub struct GroupParams {
    keying: MasterKeying,
    sender_id: Vec<u8>,
    signature_algorithm: i64,
    sender_key: CounterSignKey,
    alg_capabilities: Option<Value>,
    key_capabilities: Option<Value>,
    recipient_ids: Option<Vec<Vec<u8>>>,
    recipient_keys: Option<Vec<CounterSignKey>>,
}

impl GroupParams {
    /// Group keying, local sender id, signature algorithm (COSE id) and the
    /// local signing key.
    pub fn new(
        keying: MasterKeying,
        sender_id: impl Into<Vec<u8>>,
        signature_algorithm: i64,
        sender_key: CounterSignKey,
    ) -> Self {
        Self {
            keying,
            sender_id: sender_id.into(),
            signature_algorithm,
            sender_key,
            alg_capabilities: None,
            key_capabilities: None,
            recipient_ids: None,
            recipient_keys: None,
        }
    }

    /// Explicit algorithm capabilities.
    pub fn with_alg_capabilities(mut self, capabilities: Value) -> Self {
        self.alg_capabilities = Some(capabilities);
        self
    }

    /// Explicit key capabilities.
    pub fn with_key_capabilities(mut self, capabilities: Value) -> Self {
        self.key_capabilities = Some(capabilities);
        self
    }

    /// Initial member ids.
    pub fn with_recipient_ids(mut self, ids: Vec<Vec<u8>>) -> Self {
        self.recipient_ids = Some(ids);
        self
    }

    /// Signing keys of the initial members, parallel to the ids.
    pub fn with_recipient_keys(mut self, keys: Vec<CounterSignKey>) -> Self {
        self.recipient_keys = Some(keys);
        self
    }

    /// Initial members as `(id, key)` pairs.
    pub fn with_recipients(self, members: impl IntoIterator<Item = (Vec<u8>, CounterSignKey)>) -> Self {
        let (ids, keys): (Vec<_>, Vec<_>) = members.into_iter().unzip();
        self.with_recipient_ids(ids).with_recipient_keys(keys)
    }
}

/// A security context shared by a group.
///
/// Dereferences to the underlying [`SecurityContext`] for sender and
/// recipient operations.
pub struct GroupSecurityContext {
    context: SecurityContext,
    signature_algorithm: SignatureAlgorithm,
    capabilities: CounterSignCapabilities,
}

impl GroupSecurityContext {
    /// Derive a group context.
    ///
    /// Missing capability descriptors are filled from the defaults of the
    /// signature algorithm.
    pub fn derive(params: GroupParams, counter: &ContextCounter) -> Result<Self, ContextError> {
        let GroupParams {
            keying,
            sender_id,
            signature_algorithm,
            sender_key,
            alg_capabilities,
            key_capabilities,
            recipient_ids,
            recipient_keys,
        } = params;

        let members: Vec<(Vec<u8>, CounterSignKey)> = match (recipient_ids, recipient_keys) {
            (None, None) => Vec::new(),
            (Some(ids), Some(keys)) if ids.len() == keys.len() => ids.into_iter().zip(keys).collect(),
            (ids, keys) => {
                return Err(ContextError::ArgumentMismatch {
                    ids: ids.map_or(0, |ids| ids.len()),
                    keys: keys.map_or(0, |keys| keys.len()),
                });
            }
        };

        {
            let mut seen = HashSet::with_capacity(members.len());
            if let Some((id, _)) = members.iter().find(|(id, _)| !seen.insert(id.as_slice())) {
                return Err(ContextError::DuplicateRecipient(id.clone()));
            }
        }

        let algorithm = SignatureAlgorithm::from_cose(signature_algorithm)?;
        if !sender_key.is_compatible(algorithm) {
            return Err(ContextError::WrongAlgorithm);
        }

        let derivation = Derivation::from_keying(&keying)?;
        let mut sender = derivation.entity(&sender_id, Role::Sender)?;
        sender.set_signing_key(sender_key);

        let recipients = members
            .into_iter()
            .map(|(id, key)| {
                if !key.is_compatible(algorithm) {
                    return Err(ContextError::WrongAlgorithm);
                }
                let mut entity = derivation.entity(&id, Role::Recipient)?;
                entity.set_signing_key(key);
                Ok(entity)
            })
            .collect::<Result<Vec<_>, ContextError>>()?;

        let defaults = algorithm.default_capabilities();
        let capabilities = CounterSignCapabilities {
            alg: alg_capabilities.unwrap_or(defaults.alg),
            key: key_capabilities.unwrap_or(defaults.key),
        };

        let aead = derivation.aead;
        let context = SecurityContext::assemble(
            counter.next(),
            keying,
            aead,
            Some(algorithm),
            sender,
            recipients,
        );
        tracing::debug!(
            context_number = context.context_number(),
            group_id = ?context.group_id(),
            sender_id = ?sender_id,
            members = context.recipient_count(),
            signature_algorithm = ?algorithm,
            "derived group security context"
        );

        Ok(Self {
            context,
            signature_algorithm: algorithm,
            capabilities,
        })
    }

    /// Underlying security context.
    pub fn security(&self) -> &SecurityContext {
        &self.context
    }

    /// Group counter-signature algorithm.
    pub fn counter_sign_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    /// Capability descriptors for the counter-signature primitive.
    pub fn capabilities(&self) -> &CounterSignCapabilities {
        &self.capabilities
    }

    /// Deep copy: same keys and context number, fresh replay windows.
    pub fn duplicate(&self) -> Self {
        Self {
            context: self.context.duplicate(),
            signature_algorithm: self.signature_algorithm,
            capabilities: self.capabilities.clone(),
        }
    }

    /// Add a member derived from the group keying.
    pub fn add_recipient(
        &self,
        recipient_id: &[u8],
        signing_key: CounterSignKey,
    ) -> Result<SharedEntity, ContextError> {
        if !signing_key.is_compatible(self.signature_algorithm) {
            return Err(ContextError::WrongAlgorithm);
        }
        if self.context.recipient(recipient_id).is_some() {
            return Err(ContextError::DuplicateRecipient(recipient_id.to_vec()));
        }

        let mut entity = Derivation::from_keying(self.context.keying())?.entity(recipient_id, Role::Recipient)?;
        entity.set_signing_key(signing_key);
        let shared = self.context.insert_recipient(entity)?;
        tracing::debug!(
            context_number = self.context.context_number(),
            recipient_id = ?recipient_id,
            "added group member"
        );
        Ok(shared)
    }

    /// Derive the pairwise context between the local sender and one member.
    ///
    /// The shared secret of the two signing keys, left-padded to 32 bytes,
    /// salts a SHA-256 HKDF over each side's group key. The local entity
    /// takes the sender slot, the member the recipient slot; the member's
    /// own call yields the mirror image.
    pub fn derive_pair_context(
        &self,
        recipient_id: &[u8],
        counter: &ContextCounter,
    ) -> Result<SecurityContext, ContextError> {
        let recipient = self
            .context
            .recipient(recipient_id)
            .ok_or_else(|| ContextError::UnknownRecipient(recipient_id.to_vec()))?;
        let sender = self.context.sender();

        let sender = sender.lock();
        let recipient = recipient.lock();
        let (sender_key, recipient_key) = match (sender.signing_key(), recipient.signing_key()) {
            (Some(sender_key), Some(recipient_key)) => (sender_key, recipient_key),
            _ => return Err(missing_key()),
        };
        let shared = sender_key.agree(recipient_key, PAIRWISE_SECRET_SIZE)?;

        let config = self.context.keying().config();
        let id_context = self.context.group_id();
        let aead = self.context.algorithm();
        let salt: &[u8] = &shared;
        let derive = |secret: &[u8], id: &[u8], role| {
            Derivation {
                secret,
                salt,
                id_context,
                aead,
                kdf: KdfAlgorithm::HkdfSha256,
                config,
            }
            .entity(id, role)
        };
        let pair_sender = derive(sender.key(), sender.id(), Role::Sender)?;
        let pair_recipient = derive(recipient.key(), recipient.id(), Role::Recipient)?;

        let mut keying = MasterKeying::new(sender.key().to_vec())
            .with_salt(shared.to_vec())
            .with_aead(aead.cose_value())
            .with_kdf(KdfAlgorithm::HKDF_SHA_256)
            .with_config(*config);
        if let Some(id_context) = id_context {
            keying = keying.with_id_context(id_context);
        }

        let pair = SecurityContext::assemble(counter.next(), keying, aead, None, pair_sender, [pair_recipient]);
        tracing::debug!(
            group_context = self.context.context_number(),
            context_number = pair.context_number(),
            recipient_id = ?recipient_id,
            "derived pairwise context"
        );
        Ok(pair)
    }

    /// Counter-sign `message` with the local sender key.
    pub fn counter_sign(&self, message: &[u8]) -> Result<Vec<u8>, ContextError> {
        let sender = self.context.sender();
        let sender = sender.lock();
        let key = sender.signing_key().ok_or_else(missing_key)?;
        Ok(key.sign(message)?)
    }

    /// Verify a counter-signature from `recipient_id`.
    pub fn verify_counter_signature(
        &self,
        recipient_id: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ContextError> {
        let recipient = self
            .context
            .recipient(recipient_id)
            .ok_or_else(|| ContextError::UnknownRecipient(recipient_id.to_vec()))?;
        let recipient = recipient.lock();
        let key = recipient.signing_key().ok_or_else(missing_key)?;
        Ok(key.verify(message, signature)?)
    }
}

fn missing_key() -> ContextError {
    CryptoError::InvalidKey("entity has no signing key".into()).into()
}

impl Deref for GroupSecurityContext {
    type Target = SecurityContext;

    fn deref(&self) -> &SecurityContext {
        &self.context
    }
}

impl fmt::Debug for GroupSecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupSecurityContext")
            .field("context", &self.context)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::algorithms::SignatureAlgorithm::{EdDsa, Es256};

    fn keying() -> MasterKeying {
        MasterKeying::new((1u8..=16).collect::<Vec<_>>())
            .with_salt(hex::decode("9e7ca92223786340").unwrap())
            .with_id_context(hex::decode("37cbf3210017a2d3").unwrap())
    }

    #[test]
    fn test_default_capabilities() {
        let counter = ContextCounter::new();
        let params = GroupParams::new(keying(), vec![0x0A], -7, CounterSignKey::generate(Es256));
        let group = GroupSecurityContext::derive(params, &counter).unwrap();

        assert_eq!(group.capabilities().alg_bytes().unwrap(), vec![0x82, 0x81, 0x02, 0x82, 0x02, 0x01]);
        assert_eq!(group.capabilities().key_bytes().unwrap(), vec![0x82, 0x02, 0x01]);
        assert_eq!(group.signature_algorithm(), Some(Es256));
    }

    #[test]
    fn test_explicit_capabilities_kept() {
        let counter = ContextCounter::new();
        let params = GroupParams::new(keying(), vec![0x0A], -8, CounterSignKey::generate(EdDsa))
            .with_key_capabilities(Value::Array(vec![Value::Integer(9.into())]));
        let group = GroupSecurityContext::derive(params, &counter).unwrap();

        assert_eq!(group.capabilities().key_bytes().unwrap(), vec![0x81, 0x09]);
        assert_eq!(group.capabilities().alg_bytes().unwrap(), vec![0x82, 0x81, 0x01, 0x82, 0x01, 0x06]);
    }

    #[test]
    fn test_unsupported_signature_algorithm() {
        let counter = ContextCounter::new();
        let params = GroupParams::new(keying(), vec![0x0A], -35, CounterSignKey::generate(Es256));
        let err = GroupSecurityContext::derive(params, &counter).unwrap_err();
        assert!(err.is_unsupported_signature_algorithm());
    }

    #[test]
    fn test_argument_mismatch() {
        let counter = ContextCounter::new();
        let params = GroupParams::new(keying(), vec![0x0A], -8, CounterSignKey::generate(EdDsa))
            .with_recipient_ids(vec![vec![1], vec![2]])
            .with_recipient_keys(vec![CounterSignKey::generate(EdDsa)]);
        assert_eq!(
            GroupSecurityContext::derive(params, &counter).unwrap_err(),
            ContextError::ArgumentMismatch { ids: 2, keys: 1 }
        );

        let params = GroupParams::new(keying(), vec![0x0A], -8, CounterSignKey::generate(EdDsa))
            .with_recipient_ids(vec![vec![1]]);
        assert_eq!(
            GroupSecurityContext::derive(params, &counter).unwrap_err(),
            ContextError::ArgumentMismatch { ids: 1, keys: 0 }
        );
    }

    #[test]
    fn test_duplicate_recipient_ids() {
        let counter = ContextCounter::new();
        let params = GroupParams::new(keying(), vec![0x0A], -8, CounterSignKey::generate(EdDsa))
            .with_recipients([
                (vec![1], CounterSignKey::generate(EdDsa)),
                (vec![2], CounterSignKey::generate(EdDsa)),
                (vec![1], CounterSignKey::generate(EdDsa)),
            ]);
        assert_eq!(
            GroupSecurityContext::derive(params, &counter).unwrap_err(),
            ContextError::DuplicateRecipient(vec![1])
        );
    }

    #[test]
    fn test_wrong_algorithm() {
        let counter = ContextCounter::new();

        let declared = CounterSignKey::generate(EdDsa).with_algorithm(Es256);
        let params = GroupParams::new(keying(), vec![0x0A], -8, declared);
        assert_eq!(
            GroupSecurityContext::derive(params, &counter).unwrap_err(),
            ContextError::WrongAlgorithm
        );

        let params = GroupParams::new(keying(), vec![0x0A], -8, CounterSignKey::generate(EdDsa))
            .with_recipients([(vec![1], CounterSignKey::generate(Es256).public_key())]);
        assert_eq!(
            GroupSecurityContext::derive(params, &counter).unwrap_err(),
            ContextError::WrongAlgorithm
        );
    }

    #[test]
    fn test_add_recipient() {
        let counter = ContextCounter::new();
        let params = GroupParams::new(keying(), vec![0x0A], -8, CounterSignKey::generate(EdDsa));
        let group = GroupSecurityContext::derive(params, &counter).unwrap();

        let member = CounterSignKey::generate(EdDsa).public_key();
        group.add_recipient(&[0x01], member.clone()).unwrap();
        assert_eq!(group.recipient_count(), 1);

        // same derivation as a plain context
        let plain = SecurityContext::derive(keying(), &[0x0A], &[0x01], &counter).unwrap();
        let added = group.recipient(&[0x01]).unwrap();
        let expected = plain.recipient(&[0x01]).unwrap();
        assert_eq!(added.lock().key(), expected.lock().key());
        assert_eq!(added.lock().base_iv(), expected.lock().base_iv());

        assert_eq!(
            group.add_recipient(&[0x01], member).unwrap_err(),
            ContextError::DuplicateRecipient(vec![0x01])
        );
        assert_eq!(
            group
                .add_recipient(&[0x02], CounterSignKey::generate(Es256))
                .unwrap_err(),
            ContextError::WrongAlgorithm
        );
    }

    #[test]
    fn test_pair_context_unknown_recipient() {
        let counter = ContextCounter::new();
        let params = GroupParams::new(keying(), vec![0x0A], -7, CounterSignKey::generate(Es256));
        let group = GroupSecurityContext::derive(params, &counter).unwrap();
        assert_eq!(
            group.derive_pair_context(&[0x33], &counter).unwrap_err(),
            ContextError::UnknownRecipient(vec![0x33])
        );
    }

    #[test]
    fn test_counter_signature() {
        let counter = ContextCounter::new();
        let alice = CounterSignKey::generate(EdDsa);
        let bob = CounterSignKey::generate(EdDsa);

        let a = GroupSecurityContext::derive(
            GroupParams::new(keying(), vec![0x0A], -8, alice.clone())
                .with_recipients([(vec![0x0B], bob.public_key())]),
            &counter,
        )
        .unwrap();
        let b = GroupSecurityContext::derive(
            GroupParams::new(keying(), vec![0x0B], -8, bob)
                .with_recipients([(vec![0x0A], alice.public_key())]),
            &counter,
        )
        .unwrap();

        let signature = a.counter_sign(b"group message").unwrap();
        assert_eq!(signature.len(), EdDsa.signature_size());
        b.verify_counter_signature(&[0x0A], b"group message", &signature).unwrap();
        assert!(b
            .verify_counter_signature(&[0x0A], b"tampered", &signature)
            .is_err());
    }
}
