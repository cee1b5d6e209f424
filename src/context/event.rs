//! Context events and the synchronous observer channel.
//!
//! An event is a value. The raiser hands it to every registered handler in
//! registration order; each handler returns the (possibly updated) event,
//! which is passed to the next one. Whatever comes out of the last handler
//! is returned to the raiser. This is how an external key store supplies a
//! context for an unknown identifier, or an alternative status code to
//! answer with when it cannot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::entity::SharedEntity;
use super::group::GroupSecurityContext;
use super::security::SecurityContext;

/// Event kinds, with their stable numeric codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventCode {
    /// No context is known for an incoming group identifier.
    UnknownGroupIdentifier = 1,
    /// No entity is known for an incoming key identifier.
    UnknownKeyIdentifier = 2,
    /// No public key is known for a group member.
    UnknownPublicKey = 3,
    /// The sender sequence number is exhausted.
    PivExhaustion = 4,
    /// A recipient replay window moved.
    HitZoneMoved = 5,
    /// The sender sequence number reached a persistence boundary.
    SenderIvSave = 6,
}

impl EventCode {
    /// Numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A context as carried in events and returned from lookups.
#[derive(Clone, Debug)]
pub enum ContextHandle {
    /// Two-party context.
    Single(Arc<SecurityContext>),
    /// Group context.
    Group(Arc<GroupSecurityContext>),
}

impl ContextHandle {
    /// The underlying security context.
    pub fn security(&self) -> &SecurityContext {
        match self {
            Self::Single(ctx) => ctx.as_ref(),
            Self::Group(group) => group.security(),
        }
    }

    /// The group context, if this is one.
    pub fn group(&self) -> Option<&Arc<GroupSecurityContext>> {
        match self {
            Self::Single(_) => None,
            Self::Group(group) => Some(group),
        }
    }

    /// Context number.
    pub fn context_number(&self) -> u64 {
        self.security().context_number()
    }

    /// Group identifier (ID context).
    pub fn group_id(&self) -> Option<&[u8]> {
        self.security().group_id()
    }

    /// True if both handles point at the same context instance.
    pub fn ptr_eq(&self, other: &ContextHandle) -> bool {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => Arc::ptr_eq(a, b),
            (Self::Group(a), Self::Group(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Arc<SecurityContext>> for ContextHandle {
    fn from(ctx: Arc<SecurityContext>) -> Self {
        Self::Single(ctx)
    }
}

impl From<Arc<GroupSecurityContext>> for ContextHandle {
    fn from(group: Arc<GroupSecurityContext>) -> Self {
        Self::Group(group)
    }
}

/// An event raised by a context or a context set.
#[derive(Clone, Debug)]
pub struct ContextEvent {
    /// What happened.
    pub code: EventCode,
    /// Group identifier involved, if any.
    pub group_id: Option<Vec<u8>>,
    /// Key identifier involved, if any.
    pub key_id: Option<Vec<u8>>,
    /// Sequence number involved, if any.
    pub sequence_number: Option<u64>,
    /// Context the event refers to, or a context supplied by a handler.
    pub context: Option<ContextHandle>,
    /// Recipient entity the event refers to, or one supplied by a handler.
    pub recipient: Option<SharedEntity>,
    /// Status code a handler wants returned to the peer on failure.
    pub status_code: Option<u8>,
}

impl ContextEvent {
    /// Bare event of the given kind.
    pub fn new(code: EventCode) -> Self {
        Self {
            code,
            group_id: None,
            key_id: None,
            sequence_number: None,
            context: None,
            recipient: None,
            status_code: None,
        }
    }

    /// Set the group identifier.
    pub fn with_group_id(mut self, group_id: impl Into<Vec<u8>>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the key identifier.
    pub fn with_key_id(mut self, key_id: impl Into<Vec<u8>>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Set the sequence number.
    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    /// Attach a context.
    pub fn with_context(mut self, context: impl Into<ContextHandle>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach a recipient entity.
    pub fn with_recipient(mut self, recipient: SharedEntity) -> Self {
        self.recipient = Some(recipient);
        self
    }

    /// Set the status code.
    pub fn with_status_code(mut self, status_code: u8) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

type Handler = Arc<dyn Fn(ContextEvent) -> ContextEvent + Send + Sync>;

/// Identifies a registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered list of event handlers.
///
/// Handlers run on the raising thread. The list is snapshotted before the
/// first handler runs, so handlers may subscribe further handlers or raise
/// nested events without deadlocking.
#[derive(Clone, Default)]
pub struct EventChannel {
    handlers: Arc<RwLock<Vec<(SubscriptionId, Handler)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventChannel {
    /// Empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it runs after all handlers registered before it.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ContextEvent) -> ContextEvent + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Pass `event` through every handler and return the result.
    pub fn raise(&self, event: ContextEvent) -> ContextEvent {
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        tracing::trace!(code = ?event.code, handlers = handlers.len(), "raising context event");
        handlers.iter().fold(event, |event, handler| handler(event))
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("handlers", &self.len())
            .finish()
    }
}
