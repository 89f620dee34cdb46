//! Stanza delivery brokers.
//!
//! A [`StanzaBroker`] is the only way handlers emit traffic. It exposes two
//! primitives: `write` relays to an addressed receiver (possibly another
//! session), `write_to_session` delivers straight into the current session's
//! outbound stream. Cross-cutting behavior attaches by decoration: a
//! decorator owns exactly one inner broker, may transform or branch on the
//! stanza, and forwards to the inner operation. Neither the processor nor
//! the handlers know which decorators are installed.

use crate::delivery::failure::DeliveryFailureStrategy;
use crate::delivery::{DeliveryError, StanzaRelay};
use crate::server::session::{SessionContext, StanzaWriter, WriteError};
use async_trait::async_trait;
use roost_proto::{Entity, Stanza};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Relay failed; the supplied failure strategy has already been
    /// consulted by the time this surfaces.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The current session's outbound queue is gone. The connection is
    /// presumed dead, so this is fatal to the session.
    #[error("session write failed: {0}")]
    SessionWrite(#[from] WriteError),

    /// The stanza is missing data a decorator requires.
    #[error("stanza data error: {0}")]
    Data(String),

    /// The broker chain is wired against a missing collaborator. Fatal at
    /// first use.
    #[error("broker configuration error: {0}")]
    Configuration(String),
}

/// Delivery abstraction handed to handlers.
#[async_trait]
pub trait StanzaBroker: Send + Sync {
    /// Relay `stanza` to `receiver`. On relay failure the supplied
    /// `strategy` decides the user-visible disposition, and the failure is
    /// still reported to the caller as [`BrokerError::Delivery`].
    async fn write(
        &self,
        receiver: &Entity,
        stanza: Stanza,
        strategy: &dyn DeliveryFailureStrategy,
    ) -> Result<(), BrokerError>;

    /// Deliver `stanza` into the current session's own outbound stream,
    /// bypassing relay routing.
    async fn write_to_session(&self, stanza: Stanza) -> Result<(), BrokerError>;
}

/// Which traffic direction a decorator instance is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Wrapping the broker of the session that is sending.
    Outbound,
    /// Wrapping delivery into a recipient's session.
    Inbound,
}

/// Factory installed on the server runtime: wraps a broker chain around a
/// base broker for one processing invocation or one inbound delivery.
pub trait StanzaBrokerDecorator: Send + Sync {
    /// Wrap `inner`. `session` is the sending session for outbound
    /// bindings and absent for inbound ones.
    fn decorate(
        &self,
        inner: Box<dyn StanzaBroker>,
        binding: Binding,
        session: Option<&Arc<SessionContext>>,
    ) -> Box<dyn StanzaBroker>;
}

/// The base broker: relay for addressed writes, the session's writer for
/// local ones.
pub struct SimpleStanzaBroker {
    relay: Arc<dyn StanzaRelay>,
    session: Arc<SessionContext>,
}

impl SimpleStanzaBroker {
    /// Build the base broker for one session.
    pub fn new(relay: Arc<dyn StanzaRelay>, session: Arc<SessionContext>) -> Self {
        Self { relay, session }
    }
}

#[async_trait]
impl StanzaBroker for SimpleStanzaBroker {
    async fn write(
        &self,
        receiver: &Entity,
        stanza: Stanza,
        strategy: &dyn DeliveryFailureStrategy,
    ) -> Result<(), BrokerError> {
        match self.relay.relay(receiver, stanza.clone()).await {
            Ok(()) => Ok(()),
            Err(cause) => {
                crate::metrics::record_delivery_failure(strategy.name());
                strategy.process(self.relay.as_ref(), &stanza, &cause).await;
                Err(BrokerError::Delivery(DeliveryError {
                    stanza,
                    strategy: strategy.name(),
                    cause,
                }))
            }
        }
    }

    async fn write_to_session(&self, stanza: Stanza) -> Result<(), BrokerError> {
        self.session.writer().write(stanza).await?;
        Ok(())
    }
}

/// Base broker for inbound delivery into one recipient session. Only the
/// session-directed primitive is meaningful here; relaying out of an
/// inbound chain would re-enter routing and is refused.
pub struct InboundSessionBroker {
    writer: StanzaWriter,
}

impl InboundSessionBroker {
    /// Wrap a recipient session's writer.
    pub fn new(writer: StanzaWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl StanzaBroker for InboundSessionBroker {
    async fn write(
        &self,
        receiver: &Entity,
        _stanza: Stanza,
        _strategy: &dyn DeliveryFailureStrategy,
    ) -> Result<(), BrokerError> {
        Err(BrokerError::Configuration(format!(
            "inbound delivery broker cannot relay (receiver '{receiver}')"
        )))
    }

    async fn write_to_session(&self, stanza: Stanza) -> Result<(), BrokerError> {
        self.writer.write(stanza).await?;
        Ok(())
    }
}
