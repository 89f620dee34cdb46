//! Stanza relay and delivery failure handling.
//!
//! Relaying is the act of routing a stanza to its addressed recipient,
//! possibly across session boundaries. Relay failures are never silently
//! lost: the broker hands them to the [`failure::DeliveryFailureStrategy`]
//! the caller supplied, then reports a [`DeliveryError`] upward.

pub mod failure;
pub mod relay;

pub use failure::{
    DeliveryFailureStrategy, IgnoreFailureStrategy, ReturnErrorToSenderFailureStrategy,
};
pub use relay::LocalStanzaRelay;

use async_trait::async_trait;
use roost_proto::{Entity, Stanza};
use thiserror::Error;

/// Why a relay attempt failed.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No live session is routable for the receiver.
    #[error("no route to '{0}'")]
    NoRoute(String),

    /// The receiver's session queue is closed (connection going away).
    #[error("session queue for '{0}' is closed")]
    QueueClosed(String),

    /// Delivery-side machinery failed; details in the message.
    #[error("delivery failed: {0}")]
    Internal(String),
}

/// A relay attempt that failed. Carries the stanza that could not be
/// delivered and the name of the failure strategy that was consulted.
#[derive(Debug, Error)]
#[error("delivery of '{}' stanza failed (strategy '{strategy}'): {cause}", .stanza.name())]
pub struct DeliveryError {
    /// The stanza that could not be delivered.
    pub stanza: Stanza,
    /// Name of the strategy that decided the disposition.
    pub strategy: &'static str,
    /// The underlying relay failure.
    #[source]
    pub cause: RelayError,
}

/// Routes stanzas to their addressed recipients.
#[async_trait]
pub trait StanzaRelay: Send + Sync {
    /// Deliver `stanza` to `receiver`. Local delivery enqueues onto the
    /// recipient session's serial writer; the recipient's handlers are
    /// never executed on the caller's task.
    async fn relay(&self, receiver: &Entity, stanza: Stanza) -> Result<(), RelayError>;
}
