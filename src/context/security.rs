//! Two-party security context and entity derivation.
//!
//! Every entity is derived from the same master secret and salt:
//!
//! ```text
//! key     = HKDF(salt, secret, [id, id_context, aead, "Key", key_len])
//! base_iv = HKDF(salt, secret, [h'', id_context, aead, "IV", nonce_len])
//! base_iv[0]                       ^= len(id)
//! base_iv[n - 5 - len(id) .. n - 5] ^= id
//! ```
//!
//! The low five bytes of the IV stay free for the Partial IV, so nonces of
//! different entities in one context never collide.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use zeroize::Zeroizing;

use crate::core::{ContextConfig, ContextError, IV_ID_OVERHEAD, PARTIAL_IV_RESERVED};
use crate::crypto::{
    encode_info, expand, AeadAlgorithm, CounterSignKey, InfoLabel, KdfAlgorithm,
    SignatureAlgorithm,
};

use super::blockwise::BlockwiseStore;
use super::entity::{encode_partial_iv, EntityContext, SharedEntity};
use super::event::{ContextEvent, ContextHandle, EventChannel, EventCode, SubscriptionId};
use super::keying::{ContextCounter, MasterKeying};
use super::replay::ReplayWindow;

/// Slot an entity is derived for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Protects outgoing messages; owns the sequence counter.
    Sender,
    /// Verifies incoming messages; carries a replay window.
    Recipient,
}

/// Resolved derivation input.
pub(crate) struct Derivation<'a> {
    pub(crate) secret: &'a [u8],
    pub(crate) salt: &'a [u8],
    pub(crate) id_context: Option<&'a [u8]>,
    pub(crate) aead: AeadAlgorithm,
    pub(crate) kdf: KdfAlgorithm,
    pub(crate) config: &'a ContextConfig,
}

impl<'a> Derivation<'a> {
    pub(crate) fn from_keying(keying: &'a MasterKeying) -> Result<Self, ContextError> {
        keying.config().validate()?;
        Ok(Self {
            secret: keying.secret(),
            salt: keying.salt(),
            id_context: keying.id_context(),
            aead: AeadAlgorithm::from_cose(keying.aead())?,
            kdf: KdfAlgorithm::from_cose(keying.kdf())?,
            config: keying.config(),
        })
    }

    pub(crate) fn entity(&self, id: &[u8], role: Role) -> Result<EntityContext, ContextError> {
        let nonce_size = self.aead.nonce_size();
        let max = nonce_size.saturating_sub(IV_ID_OVERHEAD);
        if id.len() > max {
            return Err(ContextError::IdentityTooLong { len: id.len(), max });
        }

        let mut key = Zeroizing::new(vec![0u8; self.aead.key_size()]);
        let info = encode_info(id, self.id_context, self.aead, InfoLabel::Key, key.len())?;
        expand(self.kdf, self.secret, self.salt, &info, &mut key)?;

        let mut base_iv = vec![0u8; nonce_size];
        let info = encode_info(&[], self.id_context, self.aead, InfoLabel::Iv, nonce_size)?;
        expand(self.kdf, self.secret, self.salt, &info, &mut base_iv)?;

        // id.len() <= nonce_size - 6, so it fits in a byte
        base_iv[0] ^= id.len() as u8;
        let start = nonce_size - PARTIAL_IV_RESERVED - id.len();
        base_iv[start..start + id.len()]
            .iter_mut()
            .zip(id)
            .for_each(|(byte, id_byte)| *byte ^= id_byte);

        let mut entity = EntityContext::new(id.to_vec(), key, base_iv);
        entity.apply_limits(self.config.max_sequence_number, self.config.sequence_interval);
        if role == Role::Recipient {
            entity.attach_replay_window(ReplayWindow::new(0, self.config.replay_window_size)?);
        }
        Ok(entity)
    }
}

/// Derive one entity from `keying`.
///
/// Recipient-role entities get a replay window starting at zero.
pub fn derive_entity_context(
    keying: &MasterKeying,
    entity_id: &[u8],
    role: Role,
) -> Result<EntityContext, ContextError> {
    Derivation::from_keying(keying)?.entity(entity_id, role)
}

/// Nonce reserved for one outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderNonce {
    /// Sender id (the key id on the wire).
    pub key_id: Vec<u8>,
    /// Sequence number the nonce was built from.
    pub sequence_number: u64,
    /// Partial IV to put on the wire.
    pub partial_iv: Vec<u8>,
    /// Full AEAD nonce.
    pub nonce: Vec<u8>,
}

/// Output of [`SecurityContext::seal`].
#[cfg(feature = "aead")]
#[cfg_attr(docsrs, doc(cfg(feature = "aead")))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedMessage {
    /// Sender id.
    pub key_id: Vec<u8>,
    /// Partial IV used.
    pub partial_iv: Vec<u8>,
    /// Ciphertext with the tag appended.
    pub ciphertext: Vec<u8>,
}

/// A sender entity, its recipients and the shared parameters they were
/// derived from.
pub struct SecurityContext {
    context_number: u64,
    keying: MasterKeying,
    algorithm: AeadAlgorithm,
    signature_algorithm: Option<SignatureAlgorithm>,
    sender: RwLock<SharedEntity>,
    recipients: RwLock<HashMap<Vec<u8>, SharedEntity>>,
    replaced_by: RwLock<Option<ContextHandle>>,
    events: EventChannel,
    blockwise: BlockwiseStore,
}

impl SecurityContext {
    /// Derive a sender/recipient pair.
    ///
    /// The peer derives the mirror context by swapping the two ids.
    pub fn derive(
        keying: MasterKeying,
        sender_id: &[u8],
        recipient_id: &[u8],
        counter: &ContextCounter,
    ) -> Result<Self, ContextError> {
        let derivation = Derivation::from_keying(&keying)?;
        let algorithm = derivation.aead;
        let sender = derivation.entity(sender_id, Role::Sender)?;
        let recipient = derivation.entity(recipient_id, Role::Recipient)?;

        let context = Self::assemble(counter.next(), keying, algorithm, None, sender, [recipient]);
        tracing::debug!(
            context_number = context.context_number,
            sender_id = ?sender_id,
            recipient_id = ?recipient_id,
            algorithm = ?algorithm,
            "derived security context"
        );
        Ok(context)
    }

    pub(crate) fn assemble(
        context_number: u64,
        keying: MasterKeying,
        algorithm: AeadAlgorithm,
        signature_algorithm: Option<SignatureAlgorithm>,
        sender: EntityContext,
        recipients: impl IntoIterator<Item = EntityContext>,
    ) -> Self {
        let recipients = recipients
            .into_iter()
            .map(|entity| (entity.id().to_vec(), Arc::new(Mutex::new(entity))))
            .collect();
        Self {
            context_number,
            keying,
            algorithm,
            signature_algorithm,
            sender: RwLock::new(Arc::new(Mutex::new(sender))),
            recipients: RwLock::new(recipients),
            replaced_by: RwLock::new(None),
            events: EventChannel::new(),
            blockwise: BlockwiseStore::new(),
        }
    }

    /// Deep copy with the same context number and keys. Recipient replay
    /// windows start fresh; handlers and blockwise state are not copied.
    pub fn duplicate(&self) -> Self {
        let sender = self.sender().lock().duplicate();
        let recipients: Vec<EntityContext> = self
            .recipients
            .read()
            .values()
            .map(|entity| entity.lock().duplicate())
            .collect();
        Self::assemble(
            self.context_number,
            self.keying.clone(),
            self.algorithm,
            self.signature_algorithm,
            sender,
            recipients,
        )
    }

    /// Process-unique number assigned at derivation.
    pub fn context_number(&self) -> u64 {
        self.context_number
    }

    /// Derivation input.
    pub fn keying(&self) -> &MasterKeying {
        &self.keying
    }

    /// Group identifier (ID context).
    pub fn group_id(&self) -> Option<&[u8]> {
        self.keying.id_context()
    }

    /// AEAD algorithm.
    pub fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    /// Counter-signature algorithm, for group contexts.
    pub fn signature_algorithm(&self) -> Option<SignatureAlgorithm> {
        self.signature_algorithm
    }

    pub(crate) fn set_signature_algorithm(&mut self, algorithm: SignatureAlgorithm) {
        self.signature_algorithm = Some(algorithm);
    }

    /// Current sender entity.
    pub fn sender(&self) -> SharedEntity {
        Arc::clone(&self.sender.read())
    }

    /// Recipient entity for `id`.
    pub fn recipient(&self, id: &[u8]) -> Option<SharedEntity> {
        self.recipients.read().get(id).cloned()
    }

    /// Ids of all recipients, in no particular order.
    pub fn recipient_ids(&self) -> Vec<Vec<u8>> {
        self.recipients.read().keys().cloned().collect()
    }

    /// Number of recipients.
    pub fn recipient_count(&self) -> usize {
        self.recipients.read().len()
    }

    pub(crate) fn insert_recipient(&self, entity: EntityContext) -> Result<SharedEntity, ContextError> {
        let id = entity.id().to_vec();
        let mut recipients = self.recipients.write();
        if recipients.contains_key(&id) {
            return Err(ContextError::DuplicateRecipient(id));
        }
        let shared = Arc::new(Mutex::new(entity));
        recipients.insert(id, Arc::clone(&shared));
        Ok(shared)
    }

    /// Re-derive only the sender under a new id and signing key.
    ///
    /// Recipient state is untouched. The key must fit the context's
    /// signature algorithm, and the id must differ from the current sender
    /// and from every recipient.
    pub fn replace_sender(&self, sender_id: &[u8], signing_key: CounterSignKey) -> Result<(), ContextError> {
        match self.signature_algorithm {
            Some(algorithm) if signing_key.is_compatible(algorithm) => {}
            _ => return Err(ContextError::AlgorithmMismatch),
        }
        let current = self.sender().lock().id() == sender_id;
        if current || self.recipients.read().contains_key(sender_id) {
            return Err(ContextError::SenderIdInUse(sender_id.to_vec()));
        }

        let mut entity = derive_entity_context(&self.keying, sender_id, Role::Sender)?;
        entity.set_signing_key(signing_key);
        *self.sender.write() = Arc::new(Mutex::new(entity));
        tracing::debug!(
            context_number = self.context_number,
            sender_id = ?sender_id,
            "replaced sender"
        );
        Ok(())
    }

    /// Reserve the next sender nonce.
    ///
    /// Reading the sequence number, building the nonce and advancing the
    /// counter happen under one lock, so concurrent callers never share a
    /// nonce. Raises `SenderIvSave` when the new sequence number should be
    /// persisted and `PivExhaustion` when the counter is used up.
    pub fn next_nonce(&self) -> Result<SenderNonce, ContextError> {
        let sender = self.sender();
        let outcome = {
            let mut entity = sender.lock();
            let key_id = entity.id().to_vec();
            let sequence_number = entity.sequence_number();
            let partial_iv = encode_partial_iv(sequence_number);
            let nonce = entity.full_iv(&partial_iv)?;
            entity.increment_sequence_number().map(|advance| {
                let reserved = SenderNonce {
                    key_id,
                    sequence_number,
                    partial_iv,
                    nonce,
                };
                (reserved, advance)
            })
        };

        match outcome {
            Ok((reserved, advance)) => {
                if advance.persist {
                    tracing::debug!(
                        context_number = self.context_number,
                        sequence_number = advance.sequence_number,
                        "sender sequence number should be persisted"
                    );
                    self.raise(
                        self.event(EventCode::SenderIvSave)
                            .with_key_id(reserved.key_id.clone())
                            .with_sequence_number(advance.sequence_number),
                    );
                }
                Ok(reserved)
            }
            Err(err) => {
                let (key_id, sequence_number) = {
                    let entity = sender.lock();
                    (entity.id().to_vec(), entity.sequence_number())
                };
                tracing::warn!(
                    context_number = self.context_number,
                    sequence_number,
                    "sender sequence number exhausted"
                );
                self.raise(
                    self.event(EventCode::PivExhaustion)
                        .with_key_id(key_id)
                        .with_sequence_number(sequence_number),
                );
                Err(err)
            }
        }
    }

    /// Nonce for a message from `recipient_id` carrying `partial_iv`.
    pub fn recipient_nonce(&self, recipient_id: &[u8], partial_iv: &[u8]) -> Result<Vec<u8>, ContextError> {
        self.require_recipient(recipient_id)?.lock().full_iv(partial_iv)
    }

    /// True if `sequence_number` from `recipient_id` must be rejected.
    pub fn is_replay(&self, recipient_id: &[u8], sequence_number: u64) -> Result<bool, ContextError> {
        let recipient = self.require_recipient(recipient_id)?;
        let entity = recipient.lock();
        Ok(entity
            .replay_window()
            .is_some_and(|window| window.hit_test(sequence_number)))
    }

    /// Accept `sequence_number` from `recipient_id`.
    ///
    /// Test and update happen under the recipient's lock. Fails with
    /// `ReplayDetected` if the number was already seen; raises
    /// `HitZoneMoved` if the window slid.
    pub fn record(&self, recipient_id: &[u8], sequence_number: u64) -> Result<(), ContextError> {
        let recipient = self.require_recipient(recipient_id)?;
        let moved = {
            let mut entity = recipient.lock();
            check_and_set(&mut entity, sequence_number)?
        };
        if moved {
            self.window_moved(recipient, recipient_id, sequence_number);
        }
        Ok(())
    }

    /// Encrypt with the sender key under the next nonce.
    #[cfg(feature = "aead")]
    #[cfg_attr(docsrs, doc(cfg(feature = "aead")))]
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<SealedMessage, ContextError> {
        let reserved = self.next_nonce()?;
        let key = {
            let sender = self.sender();
            let entity = sender.lock();
            Zeroizing::new(entity.key().to_vec())
        };
        let ciphertext = crate::crypto::aead::seal(self.algorithm, &key, &reserved.nonce, aad, plaintext)?;
        Ok(SealedMessage {
            key_id: reserved.key_id,
            partial_iv: reserved.partial_iv,
            ciphertext,
        })
    }

    /// Decrypt a message from `recipient_id`.
    ///
    /// The replay check runs before decryption; the window is only updated
    /// once the message authenticates.
    #[cfg(feature = "aead")]
    #[cfg_attr(docsrs, doc(cfg(feature = "aead")))]
    pub fn open(
        &self,
        recipient_id: &[u8],
        partial_iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ContextError> {
        let sequence_number = super::entity::decode_partial_iv(partial_iv)?;
        let recipient = self.require_recipient(recipient_id)?;
        let (plaintext, moved) = {
            let mut entity = recipient.lock();
            if entity
                .replay_window()
                .is_some_and(|window| window.hit_test(sequence_number))
            {
                tracing::debug!(
                    context_number = self.context_number,
                    sequence_number,
                    "rejecting replayed message"
                );
                return Err(ContextError::ReplayDetected(sequence_number));
            }
            let nonce = entity.full_iv(partial_iv)?;
            let plaintext =
                crate::crypto::aead::open(self.algorithm, entity.key(), &nonce, aad, ciphertext)?;
            let moved = check_and_set(&mut entity, sequence_number)?;
            (plaintext, moved)
        };
        if moved {
            self.window_moved(recipient, recipient_id, sequence_number);
        }
        Ok(plaintext)
    }

    /// Register an event handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ContextEvent) -> ContextEvent + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    /// Event channel of this context.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Pass `event` through this context's handlers.
    pub fn raise(&self, event: ContextEvent) -> ContextEvent {
        self.events.raise(event)
    }

    /// Blockwise transfers in progress under this context.
    pub fn blockwise(&self) -> &BlockwiseStore {
        &self.blockwise
    }

    /// Mark this context as superseded by `replacement`.
    pub fn mark_replaced(&self, replacement: ContextHandle) {
        *self.replaced_by.write() = Some(replacement);
    }

    /// Context that supersedes this one, if any.
    pub fn replaced_by(&self) -> Option<ContextHandle> {
        self.replaced_by.read().clone()
    }

    fn event(&self, code: EventCode) -> ContextEvent {
        let event = ContextEvent::new(code);
        match self.group_id() {
            Some(group_id) => event.with_group_id(group_id),
            None => event,
        }
    }

    fn require_recipient(&self, id: &[u8]) -> Result<SharedEntity, ContextError> {
        self.recipient(id)
            .ok_or_else(|| ContextError::UnknownRecipient(id.to_vec()))
    }

    fn window_moved(&self, recipient: SharedEntity, recipient_id: &[u8], sequence_number: u64) {
        tracing::trace!(
            context_number = self.context_number,
            sequence_number,
            "replay window moved"
        );
        self.raise(
            self.event(EventCode::HitZoneMoved)
                .with_key_id(recipient_id)
                .with_sequence_number(sequence_number)
                .with_recipient(recipient),
        );
    }
}

fn check_and_set(entity: &mut EntityContext, sequence_number: u64) -> Result<bool, ContextError> {
    match entity.replay_window_mut() {
        Some(window) if window.hit_test(sequence_number) => {
            tracing::debug!(sequence_number, "replay detected");
            Err(ContextError::ReplayDetected(sequence_number))
        }
        Some(window) => Ok(window.set_hit(sequence_number)),
        None => Ok(false),
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("context_number", &self.context_number)
            .field("group_id", &self.group_id())
            .field("algorithm", &self.algorithm)
            .field("signature_algorithm", &self.signature_algorithm)
            .field("sender", &self.sender.read().lock().id())
            .field("recipients", &self.recipient_ids())
            .finish_non_exhaustive()
    }
}
