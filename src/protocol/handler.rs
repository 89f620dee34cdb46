//! Stanza handlers and their registry.
//!
//! A handler owns the protocol semantics for one `(name, namespace)` stanza
//! kind. The processor calls `verify` before `execute`; a stanza that fails
//! verification is treated as malformed for that handler and kills the
//! session, so `verify` should check structure, not policy.
//!
//! Execution returns a [`HandlerOutcome`] instead of throwing-for-control-
//! flow: an optional synchronous response plus an optional requested state
//! transition. The processor applies the transition only after successful
//! execution, which is what keeps failed handlers from moving the session
//! state machine.

use crate::error::HandlerError;
use crate::protocol::broker::StanzaBroker;
use crate::protocol::state::{SessionState, SessionStateHolder};
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::SessionContext;
use async_trait::async_trait;
use roost_proto::Stanza;
use std::collections::HashMap;
use std::sync::Arc;

/// What a successful handler execution produced.
#[derive(Debug, Default)]
pub struct HandlerOutcome {
    response: Option<Stanza>,
    next_state: Option<SessionState>,
}

impl HandlerOutcome {
    /// Nothing to send, nothing to change.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Send a synchronous response on the session's own writer.
    pub fn reply(stanza: Stanza) -> Self {
        Self {
            response: Some(stanza),
            next_state: None,
        }
    }

    /// Request a state transition without replying.
    pub fn advance(state: SessionState) -> Self {
        Self {
            response: None,
            next_state: Some(state),
        }
    }

    /// Reply and request a state transition.
    pub fn reply_and_advance(stanza: Stanza, state: SessionState) -> Self {
        Self {
            response: Some(stanza),
            next_state: Some(state),
        }
    }

    /// The requested transition, if any.
    pub fn next_state(&self) -> Option<SessionState> {
        self.next_state
    }

    /// Whether a response is pending.
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Consume the outcome, yielding the response stanza.
    pub fn into_response(self) -> Option<Stanza> {
        self.response
    }
}

/// Result type for handler execution.
pub type HandlerResult = Result<HandlerOutcome, HandlerError>;

/// Trait implemented by all stanza handlers.
#[async_trait]
pub trait StanzaHandler: Send + Sync {
    /// Stable handler name, used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Structural check: is this stanza usable by this handler at all?
    /// Returning `false` is fatal for the session.
    fn verify(&self, stanza: &Stanza) -> bool;

    /// Execute the protocol semantics for `stanza`.
    ///
    /// `state` is read-only: handlers gate on the session phase but request
    /// transitions through their outcome. All outbound traffic goes through
    /// `broker`, which may be decorator-wrapped.
    async fn execute(
        &self,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        server_to_server: bool,
        session: &Arc<SessionContext>,
        state: &SessionStateHolder,
        broker: &dyn StanzaBroker,
    ) -> HandlerResult;
}

/// Registry of stanza handlers, keyed by `(name, namespace)`.
///
/// At most one handler per key; lookups are O(1). Registering a key twice
/// replaces the earlier handler ("last registration wins") and hands the
/// displaced handler back so the caller can notice the override.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn StanzaHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the stanza kind `(name, namespace)`.
    ///
    /// Returns the handler previously registered under that key, if any.
    pub fn register(
        &mut self,
        name: &str,
        namespace: &str,
        handler: Arc<dyn StanzaHandler>,
    ) -> Option<Arc<dyn StanzaHandler>> {
        self.handlers
            .insert((name.to_string(), namespace.to_string()), handler)
    }

    /// Look up the handler for a stanza kind.
    pub fn get(&self, name: &str, namespace: &str) -> Option<Arc<dyn StanzaHandler>> {
        self.handlers
            .get(&(name.to_string(), namespace.to_string()))
            .cloned()
    }

    /// Whether any handler is registered at all.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}
