//! Per-account message archiving.
//!
//! The archive is a durable per-account log of qualifying messages, keyed by
//! the account's bare JID. The server core knows nothing about it; the
//! [`broker::ArchivingBrokerDecorator`] attaches the behavior to the
//! delivery pipeline, and the storage behind it is resolved through the
//! provider registry under [`MESSAGE_ARCHIVES_KEY`].

pub mod broker;
pub mod memory;

pub use broker::ArchivingBrokerDecorator;
pub use memory::MemoryMessageArchives;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roost_proto::{Entity, MessageStanza, Stanza, StanzaBuilder, ns};
use std::sync::Arc;
use thiserror::Error;

/// Provider key for the message archives.
pub const MESSAGE_ARCHIVES_KEY: &str = "message-archives";

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive for '{0}' rejected the message: {1}")]
    Rejected(String, String),
}

/// A message as recorded in an archive: the server-assigned opaque id plus
/// the original payload.
#[derive(Debug, Clone)]
pub struct ArchivedMessage {
    id: String,
    message: Stanza,
    archived_at: DateTime<Utc>,
}

impl ArchivedMessage {
    /// Record a message under a server-assigned id.
    pub fn new(id: String, message: Stanza, archived_at: DateTime<Utc>) -> Self {
        Self {
            id,
            message,
            archived_at,
        }
    }

    /// The server-assigned archive id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The archived payload.
    pub fn message(&self) -> &Stanza {
        &self.message
    }

    /// When the message was archived.
    pub fn archived_at(&self) -> DateTime<Utc> {
        self.archived_at
    }

    /// Rebuild the payload as a new stanza stamped with the archive id.
    /// Used on the inbound path so the recipient sees which id their copy
    /// was stored under.
    pub fn stamped_stanza(&self, by: &Entity) -> Stanza {
        StanzaBuilder::from_stanza(&self.message)
            .child(
                StanzaBuilder::new("stanza-id", ns::STANZA_ID)
                    .attribute("id", &self.id)
                    .attribute("by", &by.to_string())
                    .build(),
            )
            .build()
    }
}

/// One account's archive.
#[async_trait]
pub trait MessageArchive: Send + Sync {
    /// Record a message, assigning it an id.
    async fn archive(&self, message: &MessageStanza) -> Result<ArchivedMessage, ArchiveError>;

    /// All recorded messages, oldest first.
    async fn messages(&self) -> Vec<ArchivedMessage>;
}

/// Lookup of per-account archives by bare JID.
#[async_trait]
pub trait MessageArchives: Send + Sync {
    /// The archive for an account, if one is provisioned. `None` means the
    /// account is not archived and traffic passes through untouched.
    async fn retrieve_user_archive(&self, bare: &Entity) -> Option<Arc<dyn MessageArchive>>;
}
