//! Per-session context and the session route table.
//!
//! Every live connection owns one [`SessionContext`]. The transport layer
//! creates it on accept and drops it on disconnect; the processor and
//! brokers only ever borrow it. Outbound traffic for the session funnels
//! through its single [`StanzaWriter`], a bounded queue drained serially by
//! the connection task — which is what gives one session its in-order
//! delivery guarantee.

use dashmap::DashMap;
use parking_lot::RwLock;
use roost_proto::{Entity, Stanza};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Failure writing into a session's outbound queue. The connection behind
/// the queue is presumed dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("session outbound queue is closed")]
    QueueClosed,
}

/// Handle on a session's outbound queue.
#[derive(Clone)]
pub struct StanzaWriter {
    tx: mpsc::Sender<Stanza>,
}

impl StanzaWriter {
    /// Wrap a queue sender.
    pub fn new(tx: mpsc::Sender<Stanza>) -> Self {
        Self { tx }
    }

    /// Enqueue a stanza for the connection task to write out.
    pub async fn write(&self, stanza: Stanza) -> Result<(), WriteError> {
        self.tx.send(stanza).await.map_err(|_| WriteError::QueueClosed)
    }
}

/// One live connection's protocol-facing state.
pub struct SessionContext {
    id: Uuid,
    writer: StanzaWriter,
    bound: RwLock<Option<Entity>>,
    tls_requested: AtomicBool,
}

impl SessionContext {
    /// Create the context for a freshly accepted connection.
    pub fn new(writer: StanzaWriter) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            writer,
            bound: RwLock::new(None),
            tls_requested: AtomicBool::new(false),
        })
    }

    /// Opaque session id, used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The session's single response writer.
    pub fn writer(&self) -> &StanzaWriter {
        &self.writer
    }

    /// Bind the session to an authenticated entity (full JID).
    pub fn bind(&self, entity: Entity) {
        *self.bound.write() = Some(entity);
    }

    /// The entity this session authenticated as, if any.
    pub fn bound_entity(&self) -> Option<Entity> {
        self.bound.read().clone()
    }

    /// Arm the TLS upgrade flag. Set by the STARTTLS handler after it has
    /// queued the proceed response; the transport observes it after the
    /// dispatch returns.
    pub fn request_tls(&self) {
        self.tls_requested.store(true, Ordering::SeqCst);
    }

    /// Consume the TLS upgrade flag.
    pub fn take_tls_request(&self) -> bool {
        self.tls_requested.swap(false, Ordering::SeqCst)
    }
}

/// Route table mapping connected entities to their session writers.
///
/// Concurrent: the relay reads it from any session's task while connection
/// tasks register and unregister themselves.
#[derive(Default)]
pub struct SessionRegistry {
    by_full: DashMap<String, StanzaWriter>,
    resources: DashMap<String, Vec<String>>,
}

impl SessionRegistry {
    /// Create an empty route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its full JID.
    pub fn register(&self, entity: &Entity, writer: StanzaWriter) {
        let full = entity.to_string();
        let bare = entity.bare().to_string();
        self.by_full.insert(full.clone(), writer);
        let mut resources = self.resources.entry(bare).or_default();
        if !resources.contains(&full) {
            resources.push(full);
        }
    }

    /// Remove a session's route.
    pub fn unregister(&self, entity: &Entity) {
        let full = entity.to_string();
        let bare = entity.bare().to_string();
        self.by_full.remove(&full);
        if let Some(mut resources) = self.resources.get_mut(&bare) {
            resources.retain(|candidate| candidate != &full);
        }
        self.resources.remove_if(&bare, |_, resources| resources.is_empty());
    }

    /// The writer for an exact full JID.
    pub fn writer_for_full(&self, entity: &Entity) -> Option<StanzaWriter> {
        self.by_full
            .get(&entity.to_string())
            .map(|entry| entry.value().clone())
    }

    /// Writers for every connected resource of a bare JID.
    pub fn writers_for_bare(&self, entity: &Entity) -> Vec<StanzaWriter> {
        let bare = entity.bare().to_string();
        let Some(resources) = self.resources.get(&bare) else {
            return Vec::new();
        };
        resources
            .iter()
            .filter_map(|full| self.by_full.get(full).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.by_full.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.by_full.is_empty()
    }
}
