//! The shared server runtime context.
//!
//! One `ServerRuntimeContext` exists per server process. It owns the handler
//! registry, the session route table, the storage provider registry, the
//! relay, and the installed broker decorators — everything the processor and
//! the handlers resolve at dispatch time. There is no ambient global state;
//! the context is passed explicitly.

use crate::delivery::{LocalStanzaRelay, StanzaRelay};
use crate::protocol::broker::{
    Binding, SimpleStanzaBroker, StanzaBroker, StanzaBrokerDecorator,
};
use crate::protocol::handler::HandlerRegistry;
use crate::server::session::{SessionContext, SessionRegistry};
use crate::storage::StorageProviderRegistry;
use roost_proto::Entity;
use std::sync::Arc;

/// Shared, immutable-after-build server state.
pub struct ServerRuntimeContext {
    domain: Entity,
    handlers: HandlerRegistry,
    routes: Arc<SessionRegistry>,
    storage: Arc<StorageProviderRegistry>,
    decorators: Vec<Arc<dyn StanzaBrokerDecorator>>,
    relay: Arc<dyn StanzaRelay>,
}

impl ServerRuntimeContext {
    /// Build a context with the default local relay.
    pub fn new(
        domain: Entity,
        handlers: HandlerRegistry,
        storage: Arc<StorageProviderRegistry>,
        decorators: Vec<Arc<dyn StanzaBrokerDecorator>>,
    ) -> Arc<Self> {
        let routes = Arc::new(SessionRegistry::new());
        let relay: Arc<dyn StanzaRelay> =
            Arc::new(LocalStanzaRelay::new(Arc::clone(&routes), decorators.clone()));
        Arc::new(Self {
            domain,
            handlers,
            routes,
            storage,
            decorators,
            relay,
        })
    }

    /// Build a context with a caller-supplied relay. Used by tests and by
    /// deployments that route through an external component.
    pub fn with_relay(
        domain: Entity,
        handlers: HandlerRegistry,
        storage: Arc<StorageProviderRegistry>,
        decorators: Vec<Arc<dyn StanzaBrokerDecorator>>,
        relay: Arc<dyn StanzaRelay>,
    ) -> Arc<Self> {
        Arc::new(Self {
            domain,
            handlers,
            routes: Arc::new(SessionRegistry::new()),
            storage,
            decorators,
            relay,
        })
    }

    /// The domain this server is authoritative for.
    pub fn domain(&self) -> &Entity {
        &self.domain
    }

    /// The handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// The session route table.
    pub fn routes(&self) -> &Arc<SessionRegistry> {
        &self.routes
    }

    /// The storage provider registry.
    pub fn storage(&self) -> &Arc<StorageProviderRegistry> {
        &self.storage
    }

    /// The stanza relay.
    pub fn relay(&self) -> &Arc<dyn StanzaRelay> {
        &self.relay
    }

    /// Build the broker for one outbound processing invocation: the base
    /// relay/session broker wrapped by every installed decorator.
    pub fn outbound_broker(&self, session: &Arc<SessionContext>) -> Box<dyn StanzaBroker> {
        let mut broker: Box<dyn StanzaBroker> = Box::new(SimpleStanzaBroker::new(
            Arc::clone(&self.relay),
            Arc::clone(session),
        ));
        for decorator in &self.decorators {
            broker = decorator.decorate(broker, Binding::Outbound, Some(session));
        }
        broker
    }
}
