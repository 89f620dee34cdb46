//! Info/query handler.
//!
//! Answers `urn:xmpp:ping` gets with an empty result and everything else
//! with `service-unavailable`; inbound results and errors terminate at the
//! server and are only logged.

use super::helpers::{error_reply, iq_result};
use crate::error::HandlerError;
use crate::protocol::broker::StanzaBroker;
use crate::protocol::handler::{HandlerOutcome, HandlerResult, StanzaHandler};
use crate::protocol::state::{SessionState, SessionStateHolder};
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::SessionContext;
use async_trait::async_trait;
use roost_proto::{Stanza, ns};
use std::sync::Arc;
use tracing::debug;

/// Handler for `iq` stanzas.
pub struct IqHandler;

#[async_trait]
impl StanzaHandler for IqHandler {
    fn name(&self) -> &'static str {
        "iq"
    }

    /// An iq without an id or with an unknown type cannot be answered
    /// correctly; that is malformed for this handler, not a policy matter.
    fn verify(&self, stanza: &Stanza) -> bool {
        stanza.name() == "iq"
            && stanza.attribute("id").is_some()
            && matches!(
                stanza.attribute("type"),
                Some("get" | "set" | "result" | "error")
            )
    }

    async fn execute(
        &self,
        stanza: &Stanza,
        server: &Arc<ServerRuntimeContext>,
        _server_to_server: bool,
        session: &Arc<SessionContext>,
        state: &SessionStateHolder,
        _broker: &dyn StanzaBroker,
    ) -> HandlerResult {
        if !state.is_at_least(SessionState::Authenticated) {
            return Err(HandlerError::Protocol(
                "iq received before authentication".to_string(),
            ));
        }

        let requester = session.bound_entity();
        match stanza.attribute("type") {
            Some("get") if stanza.first_child_in("ping", ns::PING).is_some() => {
                Ok(HandlerOutcome::reply(iq_result(
                    stanza,
                    server.domain(),
                    requester.as_ref(),
                )))
            }
            Some("get" | "set") => Ok(HandlerOutcome::reply(error_reply(
                stanza,
                server.domain(),
                requester.as_ref(),
                "service-unavailable",
            ))),
            _ => {
                // result/error: a reply to something we sent earlier.
                debug!(
                    id = stanza.attribute("id").unwrap_or_default(),
                    "Terminal iq received"
                );
                Ok(HandlerOutcome::empty())
            }
        }
    }
}
