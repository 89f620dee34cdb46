//! Message relay handler.

use super::helpers::{error_reply, extract_sender_jid};
use crate::error::HandlerError;
use crate::delivery::ReturnErrorToSenderFailureStrategy;
use crate::protocol::broker::StanzaBroker;
use crate::protocol::handler::{HandlerOutcome, HandlerResult, StanzaHandler};
use crate::protocol::state::{SessionState, SessionStateHolder};
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::SessionContext;
use async_trait::async_trait;
use roost_proto::{MessageStanza, Stanza, StanzaBuilder};
use std::sync::Arc;
use tracing::debug;

/// Handler for `message` stanzas: stamps the sender and relays to the
/// addressed recipient. Undeliverable messages bounce back to the sender as
/// error stanzas.
pub struct MessageHandler;

#[async_trait]
impl StanzaHandler for MessageHandler {
    fn name(&self) -> &'static str {
        "message"
    }

    fn verify(&self, stanza: &Stanza) -> bool {
        MessageStanza::is_message(stanza)
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        _server_to_server: bool,
        session: &Arc<SessionContext>,
        state: &SessionStateHolder,
        broker: &dyn StanzaBroker,
    ) -> HandlerResult {
        if !state.is_at_least(SessionState::Authenticated) {
            return Err(HandlerError::Protocol(
                "message received before authentication".to_string(),
            ));
        }

        let message = MessageStanza::from_stanza(stanza.clone())
            .map_err(|_| HandlerError::Malformed("not a message stanza".to_string()))?;

        let sender = extract_sender_jid(stanza, session)?.ok_or_else(|| {
            HandlerError::Protocol("message from a session with no bound entity".to_string())
        })?;

        let Some(receiver) = message.to()? else {
            // No recipient addresses the server itself, which serves no
            // message semantics of its own.
            debug!(sender = %sender, "Message addressed to the server; answering with an error");
            return Ok(HandlerOutcome::reply(error_reply(
                stanza,
                server.domain(),
                Some(&sender),
                "service-unavailable",
            )));
        };

        // The wire-facing copy always names its sender; clients may not be
        // trusted to do so.
        let stamped = StanzaBuilder::from_stanza(stanza)
            .attribute("from", &sender.to_string())
            .build();

        debug!(from = %sender, to = %receiver, "Relaying message");
        broker
            .write(&receiver, stamped, &ReturnErrorToSenderFailureStrategy)
            .await?;

        Ok(HandlerOutcome::empty())
    }
}
