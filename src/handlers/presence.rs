//! Presence handler.
//!
//! Only directed presence is relayed here; broadcast to roster subscribers
//! is the business of a roster extension this server does not ship.
//! Undeliverable directed presence is silently dropped, matching how
//! presence fails on the wire.

use super::helpers::extract_sender_jid;
use crate::delivery::IgnoreFailureStrategy;
use crate::error::HandlerError;
use crate::protocol::broker::StanzaBroker;
use crate::protocol::handler::{HandlerOutcome, HandlerResult, StanzaHandler};
use crate::protocol::state::{SessionState, SessionStateHolder};
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::SessionContext;
use async_trait::async_trait;
use roost_proto::{Entity, Stanza, StanzaBuilder};
use std::sync::Arc;
use tracing::debug;

/// Handler for `presence` stanzas.
pub struct PresenceHandler;

#[async_trait]
impl StanzaHandler for PresenceHandler {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn verify(&self, stanza: &Stanza) -> bool {
        stanza.name() == "presence"
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        _server_to_server: bool,
        session: &Arc<SessionContext>,
        state: &SessionStateHolder,
        broker: &dyn StanzaBroker,
    ) -> HandlerResult {
        if !state.is_at_least(SessionState::Authenticated) {
            return Err(HandlerError::Protocol(
                "presence received before authentication".to_string(),
            ));
        }

        let Some(receiver) = stanza.attribute("to").map(Entity::parse).transpose()? else {
            debug!(session = %session.id(), "Undirected presence; no roster broadcast configured");
            return Ok(HandlerOutcome::empty());
        };

        let sender = extract_sender_jid(stanza, session)?.ok_or_else(|| {
            HandlerError::Protocol("presence from a session with no bound entity".to_string())
        })?;
        let stamped = StanzaBuilder::from_stanza(stanza)
            .attribute("from", &sender.to_string())
            .build();

        broker
            .write(&receiver, stamped, &IgnoreFailureStrategy)
            .await?;

        Ok(HandlerOutcome::empty())
    }
}
