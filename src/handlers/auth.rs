//! SASL authentication handler (PLAIN mechanism).
//!
//! Verifies the decoded credentials against the registered account store.
//! Success binds the session to `local@domain/<session-id>`, registers the
//! route, and requests the `Authenticated` transition; failure replies
//! `<failure/>` and leaves the state machine untouched.

use crate::error::HandlerError;
use crate::protocol::broker::StanzaBroker;
use crate::protocol::handler::{HandlerOutcome, HandlerResult, StanzaHandler};
use crate::protocol::state::{SessionState, SessionStateHolder};
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::SessionContext;
use crate::storage::accounts::{ACCOUNT_STORE_KEY, AccountStore};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use roost_proto::{Entity, Stanza, StanzaBuilder, ns};
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroize;

/// Handler for `auth` in the SASL namespace.
pub struct SaslAuthHandler;

fn sasl_failure(condition: &str) -> Stanza {
    StanzaBuilder::new("failure", ns::SASL)
        .child(StanzaBuilder::new(condition, ns::SASL).build())
        .build()
}

/// Split a PLAIN initial response into (authcid, password). The authzid is
/// accepted and ignored; this server only authorizes entities as themselves.
fn parse_plain(decoded: &[u8]) -> Option<(String, String)> {
    let mut parts = decoded.split(|byte| *byte == 0);
    let _authzid = parts.next()?;
    let authcid = std::str::from_utf8(parts.next()?).ok()?;
    let password = std::str::from_utf8(parts.next()?).ok()?;
    if parts.next().is_some() || authcid.is_empty() {
        return None;
    }
    Some((authcid.to_string(), password.to_string()))
}

#[async_trait]
impl StanzaHandler for SaslAuthHandler {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn verify(&self, stanza: &Stanza) -> bool {
        stanza.name() == "auth" && stanza.namespace() == ns::SASL
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
        if state.is_at_least(SessionState::Authenticated) {
            return Err(HandlerError::Protocol(
                "session is already authenticated".to_string(),
            ));
        }

        if stanza.attribute("mechanism") != Some("PLAIN") {
            return Ok(HandlerOutcome::reply(sasl_failure("invalid-mechanism")));
        }

        let mut decoded = match STANDARD.decode(stanza.text().trim()) {
            Ok(decoded) => decoded,
            Err(_) => return Ok(HandlerOutcome::reply(sasl_failure("incorrect-encoding"))),
        };
        let parsed = parse_plain(&decoded);
        decoded.zeroize();
        let Some((username, mut password)) = parsed else {
            return Ok(HandlerOutcome::reply(sasl_failure("malformed-request")));
        };

        // The username must form a valid bare JID under our domain.
        let bare = match Entity::parse(&format!("{username}@{}", server.domain().domain())) {
            Ok(bare) => bare,
            Err(_) => {
                password.zeroize();
                return Ok(HandlerOutcome::reply(sasl_failure("not-authorized")));
            }
        };

        let store: Arc<dyn AccountStore> =
            server.storage().retrieve(ACCOUNT_STORE_KEY).ok_or_else(|| {
                HandlerError::Configuration(format!(
                    "no '{ACCOUNT_STORE_KEY}' storage provider registered"
                ))
            })?;

        let verified = store
            .verify(&username, &password)
            .await
            .map_err(|err| HandlerError::Configuration(err.to_string()))?;
        password.zeroize();

        if !verified {
            warn!(username = %username, session = %session.id(), "Authentication failed");
            return Ok(HandlerOutcome::reply(sasl_failure("not-authorized")));
        }

        let entity = bare.with_resource(&session.id().to_string());
        session.bind(entity.clone());
        server.routes().register(&entity, session.writer().clone());
        info!(entity = %entity, "Session authenticated");

        Ok(HandlerOutcome::reply_and_advance(
            StanzaBuilder::new("success", ns::SASL).build(),
            SessionState::Authenticated,
        ))
    }
}
