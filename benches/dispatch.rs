//! Dispatch loop throughput.

use criterion::{Criterion, criterion_group, criterion_main};
use roost_proto::{Entity, StanzaBuilder, ns};
use roostd::handlers::PresenceHandler;
use roostd::protocol::handler::HandlerRegistry;
use roostd::protocol::processor::StanzaProcessor;
use roostd::protocol::state::{SessionState, SessionStateHolder};
use roostd::server::runtime::ServerRuntimeContext;
use roostd::server::session::{SessionContext, StanzaWriter};
use roostd::storage::StorageProviderRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;

fn dispatch_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    let mut registry = HandlerRegistry::new();
    registry.register("presence", ns::JABBER_CLIENT, Arc::new(PresenceHandler));
    let server = ServerRuntimeContext::new(
        Entity::parse_unchecked("bench.example"),
        registry,
        Arc::new(StorageProviderRegistry::new()),
        Vec::new(),
    );

    let (tx, mut rx) = mpsc::channel(1024);
    let session = SessionContext::new(StanzaWriter::new(tx));
    let mut state = SessionStateHolder::new();
    state.advance(SessionState::Authenticated).expect("fresh holder");
    let processor = StanzaProcessor::new();

    // Undirected presence: full dispatch path, no relay target needed.
    let stanza = StanzaBuilder::new("presence", ns::JABBER_CLIENT).build();

    c.bench_function("dispatch_presence", |b| {
        b.iter(|| {
            rt.block_on(async {
                processor
                    .process_stanza(&server, &session, &stanza, &mut state)
                    .await
                    .expect("dispatch succeeds");
            });
            while rx.try_recv().is_ok() {}
        })
    });
}

criterion_group!(benches, dispatch_throughput);
criterion_main!(benches);
