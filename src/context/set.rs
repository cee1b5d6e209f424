//! Registry of contexts keyed by group and key identifier.
//!
//! Lookups that miss are handed to the set's event handlers, which may
//! supply a context (it is then registered) and a member. When a handler
//! returns a context that still lacks the member, a nested
//! `UnknownKeyIdentifier` is raised on that context's own channel.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{ContextError, CODE_UNAUTHORIZED};

use super::entity::SharedEntity;
use super::event::{ContextEvent, ContextHandle, EventChannel, EventCode, SubscriptionId};
use super::group::{GroupParams, GroupSecurityContext};
use super::keying::{ContextCounter, MasterKeying};
use super::security::SecurityContext;

/// Outcome of [`ContextSet::resolve`].
#[derive(Clone, Debug)]
pub enum Resolution {
    /// Context and recipient entity for the identifiers.
    Resolved {
        /// Context holding the recipient.
        context: ContextHandle,
        /// Recipient entity.
        recipient: SharedEntity,
    },
    /// Nothing found; answer the peer with `status_code`.
    Unresolved {
        /// Status code to return.
        status_code: u8,
    },
}

impl Resolution {
    /// True if a recipient was found.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Contexts known to one endpoint.
#[derive(Debug, Default)]
pub struct ContextSet {
    counter: ContextCounter,
    contexts: RwLock<Vec<ContextHandle>>,
    events: EventChannel,
}

impl ContextSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context-number source for contexts in this set.
    pub fn counter(&self) -> &ContextCounter {
        &self.counter
    }

    /// Derive a two-party context and register it.
    pub fn derive(
        &self,
        keying: MasterKeying,
        sender_id: &[u8],
        recipient_id: &[u8],
    ) -> Result<Arc<SecurityContext>, ContextError> {
        let context = Arc::new(SecurityContext::derive(keying, sender_id, recipient_id, &self.counter)?);
        self.add(Arc::clone(&context));
        Ok(context)
    }

    /// Derive a group context and register it.
    pub fn derive_group(&self, params: GroupParams) -> Result<Arc<GroupSecurityContext>, ContextError> {
        let group = Arc::new(GroupSecurityContext::derive(params, &self.counter)?);
        self.add(Arc::clone(&group));
        Ok(group)
    }

    /// Register a context.
    pub fn add(&self, context: impl Into<ContextHandle>) {
        self.contexts.write().push(context.into());
    }

    /// Unregister every context with `context_number`. Returns how many
    /// were removed.
    pub fn remove(&self, context_number: u64) -> usize {
        let mut contexts = self.contexts.write();
        let before = contexts.len();
        contexts.retain(|ctx| ctx.context_number() != context_number);
        before - contexts.len()
    }

    /// Context with `context_number`.
    pub fn find(&self, context_number: u64) -> Option<ContextHandle> {
        self.contexts
            .read()
            .iter()
            .find(|ctx| ctx.context_number() == context_number)
            .cloned()
    }

    /// Contexts whose group id equals `group_id`.
    pub fn by_group(&self, group_id: Option<&[u8]>) -> Vec<ContextHandle> {
        self.contexts
            .read()
            .iter()
            .filter(|ctx| ctx.group_id() == group_id)
            .cloned()
            .collect()
    }

    /// Number of registered contexts.
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    /// True if no context is registered.
    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }

    /// Register a lookup-miss handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(ContextEvent) -> ContextEvent + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    /// Event channel of this set.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Find the context and recipient for an incoming message.
    pub fn resolve(&self, group_id: Option<&[u8]>, key_id: &[u8]) -> Resolution {
        let candidates = self.by_group(group_id);
        for context in &candidates {
            if let Some(recipient) = context.security().recipient(key_id) {
                return Resolution::Resolved {
                    context: context.clone(),
                    recipient,
                };
            }
        }

        let code = if candidates.is_empty() && group_id.is_some() {
            EventCode::UnknownGroupIdentifier
        } else {
            EventCode::UnknownKeyIdentifier
        };
        tracing::debug!(code = ?code, group_id = ?group_id, key_id = ?key_id, "unresolved identifier");

        let mut event = ContextEvent::new(code).with_key_id(key_id);
        if let Some(group_id) = group_id {
            event = event.with_group_id(group_id);
        }
        if let Some(context) = candidates.first() {
            event = event.with_context(context.clone());
        }
        let event = self.events.raise(event);

        let status_code = event.status_code;
        let Some(context) = event.context else {
            return unresolved(status_code);
        };
        if !candidates.iter().any(|known| known.ptr_eq(&context)) {
            self.add(context.clone());
        }

        if let Some(recipient) = event
            .recipient
            .or_else(|| context.security().recipient(key_id))
        {
            return Resolution::Resolved { context, recipient };
        }

        // ask the context's own handlers for the member
        let mut nested = ContextEvent::new(EventCode::UnknownKeyIdentifier)
            .with_key_id(key_id)
            .with_context(context.clone());
        if let Some(group_id) = context.group_id() {
            nested = nested.with_group_id(group_id);
        }
        let nested = context.security().raise(nested);
        match nested
            .recipient
            .or_else(|| context.security().recipient(key_id))
        {
            Some(recipient) => Resolution::Resolved { context, recipient },
            None => unresolved(nested.status_code.or(status_code)),
        }
    }
}

fn unresolved(status_code: Option<u8>) -> Resolution {
    Resolution::Unresolved {
        status_code: status_code.unwrap_or(CODE_UNAUTHORIZED),
    }
}
