//! Local delivery.
//!
//! `LocalStanzaRelay` routes stanzas to sessions connected to this server.
//! A full JID resolves to exactly that session; a bare JID fans out to every
//! connected resource of the account. Delivery is a queue handoff onto the
//! recipient session's writer — the recipient's own worker drains it, so no
//! remote logic ever runs on the sender's task.
//!
//! Before a stanza lands in the recipient's queue it passes through the
//! registered inbound broker decorators (this is where inbound archiving
//! rewrites a message to carry its archive id).

use crate::delivery::{RelayError, StanzaRelay};
use crate::protocol::broker::{
    Binding, BrokerError, InboundSessionBroker, StanzaBroker, StanzaBrokerDecorator,
};
use crate::server::session::SessionRegistry;
use async_trait::async_trait;
use roost_proto::{Entity, Stanza};
use std::sync::Arc;
use tracing::{debug, error};

/// Relay for sessions terminated on this server.
pub struct LocalStanzaRelay {
    routes: Arc<SessionRegistry>,
    decorators: Vec<Arc<dyn StanzaBrokerDecorator>>,
}

impl LocalStanzaRelay {
    /// Build a relay over the given route table and inbound decorators.
    pub fn new(
        routes: Arc<SessionRegistry>,
        decorators: Vec<Arc<dyn StanzaBrokerDecorator>>,
    ) -> Self {
        Self { routes, decorators }
    }

    fn inbound_broker(&self, writer: crate::server::session::StanzaWriter) -> Box<dyn StanzaBroker> {
        let mut broker: Box<dyn StanzaBroker> = Box::new(InboundSessionBroker::new(writer));
        for decorator in &self.decorators {
            broker = decorator.decorate(broker, Binding::Inbound, None);
        }
        broker
    }
}

#[async_trait]
impl StanzaRelay for LocalStanzaRelay {
    async fn relay(&self, receiver: &Entity, stanza: Stanza) -> Result<(), RelayError> {
        let writers = if receiver.resource().is_some() {
            match self.routes.writer_for_full(receiver) {
                Some(writer) => vec![writer],
                None => return Err(RelayError::NoRoute(receiver.to_string())),
            }
        } else {
            let writers = self.routes.writers_for_bare(receiver);
            if writers.is_empty() {
                return Err(RelayError::NoRoute(receiver.to_string()));
            }
            writers
        };

        debug!(receiver = %receiver, fanout = writers.len(), "Relaying stanza");

        for writer in writers {
            let broker = self.inbound_broker(writer);
            broker
                .write_to_session(stanza.clone())
                .await
                .map_err(|err| match err {
                    BrokerError::SessionWrite(_) => {
                        RelayError::QueueClosed(receiver.to_string())
                    }
                    BrokerError::Configuration(msg) => {
                        // Misconfiguration on the delivery path is loud even
                        // though the sender only sees a failed relay.
                        error!(receiver = %receiver, "{msg}");
                        RelayError::Internal(msg)
                    }
                    BrokerError::Data(msg) => RelayError::Internal(msg),
                    BrokerError::Delivery(err) => RelayError::Internal(err.to_string()),
                })?;
        }

        Ok(())
    }
}
