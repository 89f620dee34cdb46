//! The archiving broker decorator.
//!
//! Wraps any [`StanzaBroker`] and records qualifying messages before
//! forwarding them. Qualifying means: a message stanza of type `normal` or
//! `chat` that carries a body. Everything else passes through untouched.
//!
//! Which archive a message lands in depends on the traffic binding:
//! outbound traffic is archived under the *sender's* bare JID and forwarded
//! unchanged (the sender does not need the id echoed back); inbound traffic
//! is archived under the *recipient's* bare JID and the forwarded stanza is
//! rebuilt to carry the assigned archive id.

use crate::archive::{MESSAGE_ARCHIVES_KEY, MessageArchives};
use crate::delivery::failure::DeliveryFailureStrategy;
use crate::protocol::broker::{Binding, BrokerError, StanzaBroker, StanzaBrokerDecorator};
use crate::server::session::SessionContext;
use crate::storage::StorageProviderRegistry;
use async_trait::async_trait;
use roost_proto::{Entity, MessageStanza, MessageStanzaType, Stanza};
use std::sync::Arc;
use tracing::debug;

/// Installs [`ArchivingStanzaBroker`] around every broker the runtime
/// builds, on both the outbound and the inbound side.
pub struct ArchivingBrokerDecorator {
    storage: Arc<StorageProviderRegistry>,
}

impl ArchivingBrokerDecorator {
    /// Create the decorator over the given provider registry.
    pub fn new(storage: Arc<StorageProviderRegistry>) -> Self {
        Self { storage }
    }
}

impl StanzaBrokerDecorator for ArchivingBrokerDecorator {
    fn decorate(
        &self,
        inner: Box<dyn StanzaBroker>,
        binding: Binding,
        session: Option<&Arc<SessionContext>>,
    ) -> Box<dyn StanzaBroker> {
        Box::new(ArchivingStanzaBroker {
            inner,
            binding,
            sender: session.and_then(|session| session.bound_entity()),
            storage: Arc::clone(&self.storage),
        })
    }
}

/// Broker decorator that archives qualifying messages, then forwards to the
/// inner broker. Never short-circuits: every stanza that comes in goes out.
pub struct ArchivingStanzaBroker {
    inner: Box<dyn StanzaBroker>,
    binding: Binding,
    sender: Option<Entity>,
    storage: Arc<StorageProviderRegistry>,
}

impl ArchivingStanzaBroker {
    async fn archive(&self, stanza: Stanza) -> Result<Stanza, BrokerError> {
        let message = match MessageStanza::from_stanza(stanza) {
            Ok(message) => message,
            // Non-message stanzas pass through unchanged.
            Err(other) => return Ok(other),
        };

        let message_type = message.message_type();
        if !matches!(
            message_type,
            MessageStanzaType::Normal | MessageStanzaType::Chat
        ) {
            debug!(
                message_type = message_type.as_str(),
                "Message type is not archived"
            );
            return Ok(message.into_stanza());
        }
        if !message.has_body() {
            debug!("Message without body is not archived");
            return Ok(message.into_stanza());
        }

        let archive_jid = match self.binding {
            // Outbound messages land in the sender's archive.
            Binding::Outbound => match message
                .from()
                .map_err(|err| BrokerError::Data(err.to_string()))?
                .or_else(|| self.sender.clone())
            {
                Some(sender) => sender,
                None => {
                    return Err(BrokerError::Data(
                        "cannot archive an outbound message with no determinable sender"
                            .to_string(),
                    ));
                }
            },
            // Inbound messages land in the recipient's archive. A message
            // with no recipient on this path is a protocol violation.
            Binding::Inbound => message
                .to()
                .map_err(|err| BrokerError::Data(err.to_string()))?
                .ok_or_else(|| {
                    BrokerError::Data(
                        "no recipient found on an inbound message".to_string(),
                    )
                })?,
        };
        // Archives are exposed on the account's bare JID.
        let archive_jid = archive_jid.bare();

        let archives: Arc<dyn MessageArchives> = self
            .storage
            .retrieve(MESSAGE_ARCHIVES_KEY)
            .ok_or_else(|| {
                BrokerError::Configuration(format!(
                    "no '{MESSAGE_ARCHIVES_KEY}' storage provider registered"
                ))
            })?;

        let Some(archive) = archives.retrieve_user_archive(&archive_jid).await else {
            debug!(archive_jid = %archive_jid, "No archive provisioned; passing through");
            return Ok(message.into_stanza());
        };

        let archived = archive
            .archive(&message)
            .await
            .map_err(|err| BrokerError::Data(err.to_string()))?;
        crate::metrics::record_archived();
        debug!(archive_jid = %archive_jid, id = archived.id(), "Message archived");

        match self.binding {
            Binding::Outbound => Ok(message.into_stanza()),
            Binding::Inbound => Ok(archived.stamped_stanza(&archive_jid)),
        }
    }
}

#[async_trait]
impl StanzaBroker for ArchivingStanzaBroker {
    async fn write(
        &self,
        receiver: &Entity,
        stanza: Stanza,
        strategy: &dyn DeliveryFailureStrategy,
    ) -> Result<(), BrokerError> {
        let stanza = self.archive(stanza).await?;
        self.inner.write(receiver, stanza, strategy).await
    }

    async fn write_to_session(&self, stanza: Stanza) -> Result<(), BrokerError> {
        let stanza = self.archive(stanza).await?;
        self.inner.write_to_session(stanza).await
    }
}
