//! Session-level flows: ordering, SASL authentication, state gating, and
//! the bounce a sender sees for undeliverable messages.

mod common;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::{
    DOMAIN, RecordingRelay, Script, ScriptedHandler, context_with_relay, context_with_storage,
    drain, message, password_hash, session,
};
use roost_proto::{Entity, StanzaBuilder, ns};
use roostd::handlers::{self, StartTlsHandler};
use roostd::protocol::handler::HandlerRegistry;
use roostd::protocol::processor::StanzaProcessor;
use roostd::protocol::state::{SessionState, SessionStateHolder};
use roostd::server::runtime::ServerRuntimeContext;
use roostd::storage::StorageProviderRegistry;
use roostd::storage::accounts::{ACCOUNT_STORE_KEY, AccountStore, MemoryAccountStore};
use std::sync::Arc;

/// A server running the default handler set with one local account.
fn server_with_account(username: &str, password: &str) -> Arc<ServerRuntimeContext> {
    let storage = Arc::new(StorageProviderRegistry::new());
    let accounts = Arc::new(MemoryAccountStore::new());
    accounts.add_user(username, &password_hash(password));
    let provider: Arc<dyn AccountStore> = accounts;
    storage.register(ACCOUNT_STORE_KEY, provider);
    context_with_storage(handlers::default_registry(false), storage, Vec::new())
}

fn auth_stanza(username: &str, password: &str) -> roost_proto::Stanza {
    let payload = STANDARD.encode(format!("\0{username}\0{password}"));
    StanzaBuilder::new("auth", ns::SASL)
        .attribute("mechanism", "PLAIN")
        .text(&payload)
        .build()
}

#[tokio::test]
async fn stanzas_are_processed_in_arrival_order() {
    let handler = ScriptedHandler::new("message", Script::Empty);
    let mut registry = HandlerRegistry::new();
    registry.register("message", ns::JABBER_CLIENT, handler.clone());
    let server = context_with_relay(registry, RecordingRelay::new());
    let (session, _rx) = session();
    let mut state = SessionStateHolder::new();
    let processor = StanzaProcessor::new();

    let ids: Vec<String> = (0..100).map(|i| format!("m{i}")).collect();
    for id in &ids {
        let stanza = StanzaBuilder::new("message", ns::JABBER_CLIENT)
            .attribute("id", id)
            .build();
        processor
            .process_stanza(&server, &session, &stanza, &mut state)
            .await
            .unwrap();
    }

    assert_eq!(handler.seen_ids(), ids);
}

#[tokio::test]
async fn sasl_plain_success_binds_and_advances() {
    let server = server_with_account("alice", "snicker-snack");
    let (session, mut rx) = session();
    let mut state = SessionStateHolder::new();

    StanzaProcessor::new()
        .process_stanza(
            &server,
            &session,
            &auth_stanza("alice", "snicker-snack"),
            &mut state,
        )
        .await
        .unwrap();

    assert_eq!(state.state(), SessionState::Authenticated);

    let replies = drain(&mut rx);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].name(), "success");
    assert_eq!(replies[0].namespace(), ns::SASL);

    let bound = session.bound_entity().expect("session should be bound");
    assert_eq!(bound.local(), Some("alice"));
    assert_eq!(bound.domain(), DOMAIN);
    assert!(bound.resource().is_some());

    // The route table now resolves the account's bare JID to this session.
    let bare = Entity::parse(&format!("alice@{DOMAIN}")).unwrap();
    assert_eq!(server.routes().writers_for_bare(&bare).len(), 1);
}

#[tokio::test]
async fn sasl_plain_failure_leaves_state_untouched() {
    let server = server_with_account("alice", "snicker-snack");
    let (session, mut rx) = session();
    let mut state = SessionStateHolder::new();

    StanzaProcessor::new()
        .process_stanza(
            &server,
            &session,
            &auth_stanza("alice", "jabberwock"),
            &mut state,
        )
        .await
        .unwrap();

    assert_eq!(state.state(), SessionState::Initiated);
    assert!(session.bound_entity().is_none());

    let replies = drain(&mut rx);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].name(), "failure");
    assert!(replies[0].first_child("not-authorized").is_some());
}

#[tokio::test]
async fn message_before_authentication_is_rejected_but_not_fatal() {
    let server = server_with_account("alice", "snicker-snack");
    let (session, mut rx) = session();
    let mut state = SessionStateHolder::new();

    let stanza = message("chat", None, Some("bob@y.example"), "too early");
    StanzaProcessor::new()
        .process_stanza(&server, &session, &stanza, &mut state)
        .await
        .expect("pre-auth message is a recoverable protocol failure");

    assert!(drain(&mut rx).is_empty());
    assert_eq!(state.state(), SessionState::Initiated);
}

#[tokio::test]
async fn iq_ping_is_answered_with_a_result() {
    let server = server_with_account("alice", "snicker-snack");
    let (session, mut rx) = session();
    let alice = Entity::parse(&format!("alice@{DOMAIN}/tablet")).unwrap();
    session.bind(alice.clone());
    let mut state = SessionStateHolder::new();
    state.advance(SessionState::Authenticated).unwrap();

    let ping = StanzaBuilder::new("iq", ns::JABBER_CLIENT)
        .attribute("type", "get")
        .attribute("id", "p1")
        .child(StanzaBuilder::new("ping", ns::PING).build())
        .build();
    StanzaProcessor::new()
        .process_stanza(&server, &session, &ping, &mut state)
        .await
        .unwrap();

    let replies = drain(&mut rx);
    assert_eq!(replies.len(), 1);
    let pong = &replies[0];
    assert_eq!(pong.name(), "iq");
    assert_eq!(pong.attribute("type"), Some("result"));
    assert_eq!(pong.attribute("id"), Some("p1"));
    assert_eq!(pong.attribute("from"), Some(DOMAIN));
    assert_eq!(pong.attribute("to"), Some(alice.to_string().as_str()));
}

#[tokio::test]
async fn starttls_is_refused_once_negotiation_moved_on() {
    let mut registry = HandlerRegistry::new();
    registry.register("starttls", ns::TLS, Arc::new(StartTlsHandler));
    let server = context_with_relay(registry, RecordingRelay::new());
    let (session, mut rx) = session();
    let mut state = SessionStateHolder::new();
    state.advance(SessionState::Authenticated).unwrap();

    let starttls = StanzaBuilder::new("starttls", ns::TLS).build();
    StanzaProcessor::new()
        .process_stanza(&server, &session, &starttls, &mut state)
        .await
        .expect("late STARTTLS is swallowed, not fatal");

    assert!(drain(&mut rx).is_empty());
    assert!(!session.take_tls_request());
    assert_eq!(state.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn undeliverable_message_bounces_back_to_sender() {
    // Real local relay, no archives: alice is routable, the ghost is not.
    let mut registry = HandlerRegistry::new();
    registry.register(
        "message",
        ns::JABBER_CLIENT,
        Arc::new(roostd::handlers::MessageHandler),
    );
    let server = context_with_storage(
        registry,
        Arc::new(StorageProviderRegistry::new()),
        Vec::new(),
    );

    let (session, mut rx) = session();
    let alice = Entity::parse("alice@roost.example/tablet").unwrap();
    session.bind(alice.clone());
    server.routes().register(&alice, session.writer().clone());
    let mut state = SessionStateHolder::new();
    state.advance(SessionState::Authenticated).unwrap();

    let stanza = message("chat", None, Some("ghost@roost.example"), "anyone there?");
    StanzaProcessor::new()
        .process_stanza(&server, &session, &stanza, &mut state)
        .await
        .expect("delivery failure is recoverable");

    // The sender receives a synthesized error stanza, not a raw failure.
    let replies = drain(&mut rx);
    assert_eq!(replies.len(), 1);
    let bounce = &replies[0];
    assert_eq!(bounce.name(), "message");
    assert_eq!(bounce.attribute("type"), Some("error"));
    assert_eq!(bounce.attribute("to"), Some("alice@roost.example/tablet"));
    assert_eq!(bounce.attribute("from"), Some("ghost@roost.example"));
    let error = bounce.first_child("error").expect("error child");
    assert!(error.first_child_in("service-unavailable", ns::STANZAS).is_some());

    // The session survives to send again.
    assert_eq!(state.state(), SessionState::Authenticated);
}
