//! Delivery failure policies.
//!
//! The caller of a broker `write` chooses what happens when relay fails:
//! different protocol paths fail differently (presence is dropped, messages
//! bounce). Strategies run synchronously on the calling session's worker and
//! do at most one local relay-back, never a network call.

use crate::delivery::{RelayError, StanzaRelay};
use async_trait::async_trait;
use roost_proto::{Entity, MessageStanzaType, Stanza, StanzaBuilder, ns};
use tracing::{debug, warn};

/// Policy invoked when a relay attempt fails.
#[async_trait]
pub trait DeliveryFailureStrategy: Send + Sync {
    /// Stable name, recorded on the resulting `DeliveryError` and in
    /// metrics.
    fn name(&self) -> &'static str;

    /// Decide the disposition of `failed`. Must not fail upward; a strategy
    /// that cannot act logs and gives up.
    async fn process(&self, relay: &dyn StanzaRelay, failed: &Stanza, cause: &RelayError);
}

/// Silently drop the failed stanza.
pub struct IgnoreFailureStrategy;

#[async_trait]
impl DeliveryFailureStrategy for IgnoreFailureStrategy {
    fn name(&self) -> &'static str {
        "ignore"
    }

    async fn process(&self, _relay: &dyn StanzaRelay, failed: &Stanza, cause: &RelayError) {
        debug!(stanza = failed.name(), error = %cause, "Delivery failed; dropping");
    }
}

/// Synthesize an error stanza and relay it back to the original sender.
///
/// The sender sees a `type='error'` variant of their own stanza kind with a
/// `service-unavailable` condition, never a raw internal error. Stanzas that
/// are already errors are dropped instead of bounced, so two unreachable
/// peers cannot ping-pong error stanzas forever.
pub struct ReturnErrorToSenderFailureStrategy;

#[async_trait]
impl DeliveryFailureStrategy for ReturnErrorToSenderFailureStrategy {
    fn name(&self) -> &'static str {
        "return-error-to-sender"
    }

    async fn process(&self, relay: &dyn StanzaRelay, failed: &Stanza, cause: &RelayError) {
        if failed.attribute("type") == Some(MessageStanzaType::Error.as_str()) {
            warn!(
                stanza = failed.name(),
                error = %cause,
                "Not bouncing a stanza that is already an error"
            );
            return;
        }

        let Some(sender) = failed.attribute("from").map(Entity::parse) else {
            warn!(stanza = failed.name(), "Cannot bounce a stanza with no sender");
            return;
        };
        let sender = match sender {
            Ok(sender) => sender,
            Err(err) => {
                warn!(error = %err, "Cannot bounce to an unparseable sender");
                return;
            }
        };

        let bounce = synthesize_error(failed);
        if let Err(err) = relay.relay(&sender, bounce).await {
            warn!(
                sender = %sender,
                error = %err,
                "Bounce could not be delivered; giving up"
            );
        }
    }
}

/// Build the error variant of a failed stanza: addresses swapped, original
/// payload kept, a `service-unavailable` condition appended.
fn synthesize_error(failed: &Stanza) -> Stanza {
    let mut builder = StanzaBuilder::from_stanza(failed)
        .attribute("type", MessageStanzaType::Error.as_str());
    if let Some(from) = failed.attribute("from") {
        builder = builder.attribute("to", from);
    }
    if let Some(to) = failed.attribute("to") {
        builder = builder.attribute("from", to);
    }
    builder
        .child(
            StanzaBuilder::new("error", failed.namespace())
                .attribute("type", "cancel")
                .child(StanzaBuilder::new("service-unavailable", ns::STANZAS).build())
                .build(),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use roost_proto::ns;

    #[derive(Default)]
    struct RecordingRelay {
        sent: Mutex<Vec<(Entity, Stanza)>>,
    }

    #[async_trait]
    impl StanzaRelay for RecordingRelay {
        async fn relay(&self, receiver: &Entity, stanza: Stanza) -> Result<(), RelayError> {
            self.sent.lock().push((receiver.clone(), stanza));
            Ok(())
        }
    }

    fn chat(from: &str, to: &str) -> Stanza {
        StanzaBuilder::new("message", ns::JABBER_CLIENT)
            .attribute("from", from)
            .attribute("to", to)
            .attribute("type", "chat")
            .child(StanzaBuilder::new("body", ns::JABBER_CLIENT).text("hello?").build())
            .build()
    }

    #[tokio::test]
    async fn ignore_strategy_sends_nothing() {
        let relay = RecordingRelay::default();
        IgnoreFailureStrategy
            .process(
                &relay,
                &chat("a@x.example", "b@y.example"),
                &RelayError::NoRoute("b@y.example".into()),
            )
            .await;
        assert!(relay.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn bounce_swaps_addresses_and_marks_error() {
        let relay = RecordingRelay::default();
        ReturnErrorToSenderFailureStrategy
            .process(
                &relay,
                &chat("a@x.example", "b@y.example"),
                &RelayError::NoRoute("b@y.example".into()),
            )
            .await;

        let sent = relay.sent.lock();
        let (receiver, bounce) = sent.first().expect("bounce should be relayed");
        assert_eq!(receiver, &Entity::parse("a@x.example").unwrap());
        assert_eq!(bounce.attribute("type"), Some("error"));
        assert_eq!(bounce.attribute("to"), Some("a@x.example"));
        assert_eq!(bounce.attribute("from"), Some("b@y.example"));

        let error = bounce.first_child("error").expect("error child");
        assert!(error.first_child_in("service-unavailable", ns::STANZAS).is_some());
        // Original payload is kept for the sender's benefit.
        assert!(bounce.first_child("body").is_some());
    }

    #[tokio::test]
    async fn error_stanzas_are_never_bounced() {
        let relay = RecordingRelay::default();
        let already_error = StanzaBuilder::from_stanza(&chat("a@x.example", "b@y.example"))
            .attribute("type", "error")
            .build();
        ReturnErrorToSenderFailureStrategy
            .process(
                &relay,
                &already_error,
                &RelayError::NoRoute("b@y.example".into()),
            )
            .await;
        assert!(relay.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn senderless_stanzas_are_dropped() {
        let relay = RecordingRelay::default();
        let no_from = StanzaBuilder::new("message", ns::JABBER_CLIENT)
            .attribute("to", "b@y.example")
            .build();
        ReturnErrorToSenderFailureStrategy
            .process(&relay, &no_from, &RelayError::NoRoute("b@y.example".into()))
            .await;
        assert!(relay.sent.lock().is_empty());
    }
}
