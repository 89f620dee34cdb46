//! In-memory archive backend.
//!
//! Archives are provisioned explicitly (at bootstrap, one per configured
//! account when archiving is enabled). An unprovisioned account has no
//! archive and its messages pass through the decorator untouched.

use crate::archive::{ArchiveError, ArchivedMessage, MessageArchive, MessageArchives};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use roost_proto::{Entity, MessageStanza};
use std::sync::Arc;
use uuid::Uuid;

/// One account's in-memory archive.
pub struct MemoryMessageArchive {
    owner: String,
    entries: RwLock<Vec<ArchivedMessage>>,
}

impl MemoryMessageArchive {
    fn new(owner: String) -> Self {
        Self {
            owner,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// The bare JID this archive belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
impl MessageArchive for MemoryMessageArchive {
    async fn archive(&self, message: &MessageStanza) -> Result<ArchivedMessage, ArchiveError> {
        let entry = ArchivedMessage::new(
            Uuid::new_v4().to_string(),
            message.as_stanza().clone(),
            chrono::Utc::now(),
        );
        self.entries.write().push(entry.clone());
        Ok(entry)
    }

    async fn messages(&self) -> Vec<ArchivedMessage> {
        self.entries.read().clone()
    }
}

/// Per-bare-JID archives held in memory.
#[derive(Default)]
pub struct MemoryMessageArchives {
    archives: DashMap<String, Arc<MemoryMessageArchive>>,
}

impl MemoryMessageArchives {
    /// Create an empty set of archives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an archive for an account. Idempotent; returns the
    /// (possibly pre-existing) archive.
    pub fn provision(&self, bare: &Entity) -> Arc<MemoryMessageArchive> {
        let key = bare.bare().to_string();
        self.archives
            .entry(key.clone())
            .or_insert_with(|| Arc::new(MemoryMessageArchive::new(key)))
            .clone()
    }

    /// Number of provisioned archives.
    pub fn len(&self) -> usize {
        self.archives.len()
    }

    /// Whether no archive is provisioned.
    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }
}

#[async_trait]
impl MessageArchives for MemoryMessageArchives {
    async fn retrieve_user_archive(&self, bare: &Entity) -> Option<Arc<dyn MessageArchive>> {
        self.archives
            .get(&bare.bare().to_string())
            .map(|archive| archive.clone() as Arc<dyn MessageArchive>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_proto::{StanzaBuilder, ns};

    fn chat() -> MessageStanza {
        let stanza = StanzaBuilder::new("message", ns::JABBER_CLIENT)
            .attribute("from", "alice@x.example")
            .attribute("to", "bob@y.example")
            .attribute("type", "chat")
            .child(StanzaBuilder::new("body", ns::JABBER_CLIENT).text("hello").build())
            .build();
        MessageStanza::from_stanza(stanza).unwrap()
    }

    #[tokio::test]
    async fn archives_assign_distinct_ids() {
        let archives = MemoryMessageArchives::new();
        let alice = Entity::parse("alice@x.example").unwrap();
        archives.provision(&alice);

        let archive = archives.retrieve_user_archive(&alice).await.unwrap();
        let first = archive.archive(&chat()).await.unwrap();
        let second = archive.archive(&chat()).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(archive.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn unprovisioned_accounts_have_no_archive() {
        let archives = MemoryMessageArchives::new();
        let ghost = Entity::parse("ghost@x.example").unwrap();
        assert!(archives.retrieve_user_archive(&ghost).await.is_none());
    }

    #[tokio::test]
    async fn retrieval_is_keyed_by_bare_jid() {
        let archives = MemoryMessageArchives::new();
        let bare = Entity::parse("alice@x.example").unwrap();
        archives.provision(&bare);

        let full = Entity::parse("alice@x.example/den").unwrap();
        assert!(archives.retrieve_user_archive(&full).await.is_some());
    }

    #[test]
    fn provisioning_is_idempotent() {
        let archives = MemoryMessageArchives::new();
        let alice = Entity::parse("alice@x.example").unwrap();
        archives.provision(&alice);
        archives.provision(&alice);
        assert_eq!(archives.len(), 1);
    }

    #[tokio::test]
    async fn stamped_stanza_carries_the_archive_id() {
        let archives = MemoryMessageArchives::new();
        let bob = Entity::parse("bob@y.example").unwrap();
        archives.provision(&bob);

        let archive = archives.retrieve_user_archive(&bob).await.unwrap();
        let archived = archive.archive(&chat()).await.unwrap();
        let stamped = archived.stamped_stanza(&bob);

        let stamp = stamped.first_child_in("stanza-id", ns::STANZA_ID).unwrap();
        assert_eq!(stamp.attribute("id"), Some(archived.id()));
        assert_eq!(stamp.attribute("by"), Some("bob@y.example"));
        // The original payload is intact.
        assert_eq!(stamped.first_child("body").unwrap().text(), "hello");
    }
}
