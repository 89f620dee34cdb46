//! Shared infrastructure for engine-level integration tests.
//!
//! Tests drive the processor and brokers directly: sessions are in-process
//! queues, the relay is either the real local relay or a recording stub,
//! and handlers can be scripted per test.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use roost_proto::{Entity, Stanza, StanzaBuilder, ns};
use roostd::delivery::failure::DeliveryFailureStrategy;
use roostd::delivery::{RelayError, StanzaRelay};
use roostd::error::HandlerError;
use roostd::protocol::broker::{BrokerError, StanzaBroker, StanzaBrokerDecorator};
use roostd::protocol::handler::{
    HandlerOutcome, HandlerRegistry, HandlerResult, StanzaHandler,
};
use roostd::protocol::state::SessionState;
use roostd::server::runtime::ServerRuntimeContext;
use roostd::server::session::{SessionContext, StanzaWriter};
use roostd::storage::StorageProviderRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The domain all tests run under.
pub const DOMAIN: &str = "roost.example";

/// Relay stub that records deliveries, or fails them all.
pub struct RecordingRelay {
    pub sent: Mutex<Vec<(Entity, Stanza)>>,
    fail: bool,
}

impl RecordingRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn deliveries(&self) -> Vec<(Entity, Stanza)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl StanzaRelay for RecordingRelay {
    async fn relay(&self, receiver: &Entity, stanza: Stanza) -> Result<(), RelayError> {
        if self.fail {
            return Err(RelayError::NoRoute(receiver.to_string()));
        }
        self.sent.lock().push((receiver.clone(), stanza));
        Ok(())
    }
}

/// Broker stub that records both operations. Clones share the record, so a
/// test can keep a handle while the decorator owns the boxed copy.
#[derive(Default, Clone)]
pub struct RecordingBroker {
    pub written: Arc<Mutex<Vec<(Entity, Stanza)>>>,
    pub session_writes: Arc<Mutex<Vec<Stanza>>>,
}

#[async_trait]
impl StanzaBroker for RecordingBroker {
    async fn write(
        &self,
        receiver: &Entity,
        stanza: Stanza,
        _strategy: &dyn DeliveryFailureStrategy,
    ) -> Result<(), BrokerError> {
        self.written.lock().push((receiver.clone(), stanza));
        Ok(())
    }

    async fn write_to_session(&self, stanza: Stanza) -> Result<(), BrokerError> {
        self.session_writes.lock().push(stanza);
        Ok(())
    }
}

/// What a [`ScriptedHandler`] does when executed.
pub enum Script {
    /// Succeed with no response.
    Empty,
    /// Succeed and reply with this stanza.
    Reply(Stanza),
    /// Succeed and request a state transition.
    Advance(SessionState),
    /// Fail with a recoverable protocol error.
    ProtocolFailure,
}

/// Handler whose verification result and execution outcome are fixed by the
/// test. Records the `id` attribute of every stanza it executes.
pub struct ScriptedHandler {
    name: &'static str,
    verify_ok: bool,
    script: Script,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    pub fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            verify_ok: true,
            script,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            verify_ok: false,
            script: Script::Empty,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen_ids(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl StanzaHandler for ScriptedHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn verify(&self, _stanza: &Stanza) -> bool {
        self.verify_ok
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        _server_to_server: bool,
        _session: &Arc<SessionContext>,
        _state: &roostd::protocol::state::SessionStateHolder,
        _broker: &dyn StanzaBroker,
    ) -> HandlerResult {
        self.seen
            .lock()
            .push(stanza.attribute("id").unwrap_or_default().to_string());
        match &self.script {
            Script::Empty => Ok(HandlerOutcome::empty()),
            Script::Reply(stanza) => Ok(HandlerOutcome::reply(stanza.clone())),
            Script::Advance(state) => Ok(HandlerOutcome::advance(*state)),
            Script::ProtocolFailure => {
                Err(HandlerError::Protocol("scripted failure".to_string()))
            }
        }
    }
}

/// An in-process session: context plus the receiving end of its queue.
pub fn session() -> (Arc<SessionContext>, mpsc::Receiver<Stanza>) {
    let (tx, rx) = mpsc::channel(16);
    (SessionContext::new(StanzaWriter::new(tx)), rx)
}

/// Context with a caller-supplied relay and no storage or decorators.
pub fn context_with_relay(
    registry: HandlerRegistry,
    relay: Arc<dyn StanzaRelay>,
) -> Arc<ServerRuntimeContext> {
    ServerRuntimeContext::with_relay(
        Entity::parse_unchecked(DOMAIN),
        registry,
        Arc::new(StorageProviderRegistry::new()),
        Vec::new(),
        relay,
    )
}

/// Context with the real local relay, the given storage, and decorators.
pub fn context_with_storage(
    registry: HandlerRegistry,
    storage: Arc<StorageProviderRegistry>,
    decorators: Vec<Arc<dyn StanzaBrokerDecorator>>,
) -> Arc<ServerRuntimeContext> {
    ServerRuntimeContext::new(
        Entity::parse_unchecked(DOMAIN),
        registry,
        storage,
        decorators,
    )
}

/// A message stanza with the given type, addresses, and body.
pub fn message(message_type: &str, from: Option<&str>, to: Option<&str>, body: &str) -> Stanza {
    StanzaBuilder::new("message", ns::JABBER_CLIENT)
        .attribute("type", message_type)
        .attribute_opt("from", from)
        .attribute_opt("to", to)
        .child(StanzaBuilder::new("body", ns::JABBER_CLIENT).text(body).build())
        .build()
}

/// Hash a password the way the account store expects.
pub fn password_hash(password: &str) -> String {
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
    let salt = SaltString::generate(&mut OsRng);
    argon2::Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("hashing cannot fail for test input")
        .to_string()
}

/// Drain everything currently queued on a session receiver.
pub fn drain(rx: &mut mpsc::Receiver<Stanza>) -> Vec<Stanza> {
    let mut out = Vec::new();
    while let Ok(stanza) = rx.try_recv() {
        out.push(stanza);
    }
    out
}
