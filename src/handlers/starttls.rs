//! STARTTLS negotiation handler.
//!
//! Replies `<proceed/>` and arms the session's TLS-upgrade flag. The
//! transport performs the actual handshake after flushing the reply, then
//! confirms it through the processor's TLS entry point, which is what moves
//! the session state forward.

use crate::error::HandlerError;
use crate::protocol::broker::StanzaBroker;
use crate::protocol::handler::{HandlerOutcome, HandlerResult, StanzaHandler};
use crate::protocol::state::{SessionState, SessionStateHolder};
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::SessionContext;
use async_trait::async_trait;
use roost_proto::{Stanza, StanzaBuilder, ns};
use std::sync::Arc;

/// Handler for `starttls` in the TLS negotiation namespace.
pub struct StartTlsHandler;

#[async_trait]
impl StanzaHandler for StartTlsHandler {
    fn name(&self) -> &'static str {
        "starttls"
    }

    fn verify(&self, stanza: &Stanza) -> bool {
        stanza.name() == "starttls" && stanza.namespace() == ns::TLS
    }

    async fn execute(
        &self,
        _stanza: &Stanza,
        _server: &Arc<ServerRuntimeContext>,
        _server_to_server: bool,
        session: &Arc<SessionContext>,
        state: &SessionStateHolder,
        _broker: &dyn StanzaBroker,
    ) -> HandlerResult {
        if state.state() != SessionState::Initiated {
            return Err(HandlerError::Protocol(format!(
                "STARTTLS is only available before negotiation, not in {:?}",
                state.state()
            )));
        }

        session.request_tls();
        Ok(HandlerOutcome::reply(
            StanzaBuilder::new("proceed", ns::TLS).build(),
        ))
    }
}
