//! Connection - drives one client session.
//!
//! Each connection runs in its own Tokio task:
//!
//! ```text
//!            ┌────────────────────────────────────────────┐
//!            │              Session Task                  │
//!            │                                            │
//!            │  socket ──▶ StreamDecoder ──▶ processor    │
//!            │                                  │         │
//!            │  socket ◀── outgoing queue ◀─────┘         │
//!            │              (mpsc, also fed by relays     │
//!            │               from other sessions)         │
//!            └────────────────────────────────────────────┘
//! ```
//!
//! Stanzas of one session are dispatched strictly in arrival order; the
//! outgoing queue is the same one other sessions' relays enqueue into, so
//! all writes to the socket are serialized here.
//!
//! A STARTTLS exchange exits the plaintext loop after flushing the proceed
//! reply, performs the rustls handshake, confirms it through the
//! processor's TLS entry point, and re-enters the loop on the upgraded
//! stream with a fresh decoder.

use crate::protocol::processor::StanzaProcessor;
use crate::protocol::state::SessionStateHolder;
use crate::server::runtime::ServerRuntimeContext;
use crate::server::session::{SessionContext, StanzaWriter};
use bytes::BytesMut;
use roost_proto::{Stanza, StreamDecoder, StreamEvent, ns};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, instrument, warn};

const OUTGOING_QUEUE_SIZE: usize = 64;
const STREAM_CLOSE: &str = "</stream:stream>";

enum LoopExit {
    Closed,
    UpgradeTls,
}

/// A client session handler.
pub struct SessionConnection {
    addr: SocketAddr,
    server: Arc<ServerRuntimeContext>,
    tls: Option<TlsAcceptor>,
}

impl SessionConnection {
    /// Create a handler for one accepted connection.
    pub fn new(
        addr: SocketAddr,
        server: Arc<ServerRuntimeContext>,
        tls: Option<TlsAcceptor>,
    ) -> Self {
        Self { addr, server, tls }
    }

    /// Run the session until the peer disconnects or a fatal processing
    /// error tears it down.
    #[instrument(skip(self, stream), fields(addr = %self.addr), name = "session")]
    pub async fn run(self, stream: TcpStream) -> anyhow::Result<()> {
        crate::metrics::session_opened();
        let result = self.serve(stream).await;
        crate::metrics::session_closed();
        result
    }

    async fn serve(&self, stream: TcpStream) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::channel::<Stanza>(OUTGOING_QUEUE_SIZE);
        let session = SessionContext::new(StanzaWriter::new(tx));
        let mut state = SessionStateHolder::new();
        let processor = StanzaProcessor::new();

        info!(session = %session.id(), "Client connected");

        let (exit, stream) = self
            .drive(stream, &session, &mut state, &processor, &mut rx, false)
            .await?;

        if matches!(exit, LoopExit::UpgradeTls) {
            // The handler only runs when an acceptor was configured.
            let acceptor = self
                .tls
                .clone()
                .ok_or_else(|| anyhow::anyhow!("TLS requested without an acceptor"))?;
            match acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    processor.process_tls_established(&self.server, &session, &mut state)?;
                    let (_, _stream) = self
                        .drive(tls_stream, &session, &mut state, &processor, &mut rx, true)
                        .await?;
                }
                Err(err) => {
                    warn!(session = %session.id(), error = %err, "TLS handshake failed");
                }
            }
        }

        state.close();
        if let Some(entity) = session.bound_entity() {
            self.server.routes().unregister(&entity);
            info!(entity = %entity, "Route released");
        }
        info!(session = %session.id(), "Client disconnected");

        Ok(())
    }

    /// The unified event loop for one transport incarnation (plaintext or
    /// TLS). Returns the stream so a STARTTLS exit can upgrade it.
    async fn drive<S>(
        &self,
        stream: S,
        session: &Arc<SessionContext>,
        state: &mut SessionStateHolder,
        processor: &StanzaProcessor,
        outgoing: &mut mpsc::Receiver<Stanza>,
        secured: bool,
    ) -> anyhow::Result<(LoopExit, S)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut decoder = StreamDecoder::new(ns::JABBER_CLIENT);
        let mut buf = BytesMut::with_capacity(4096);
        let mut exit = LoopExit::Closed;

        'outer: loop {
            tokio::select! {
                read = reader.read_buf(&mut buf) => {
                    match read {
                        Ok(0) => break,
                        Ok(_) => {
                            decoder.feed(&buf);
                            buf.clear();
                            loop {
                                match decoder.next_event() {
                                    Ok(Some(StreamEvent::StreamOpen(_))) => {
                                        self.open_stream(&mut writer, state, secured).await?;
                                    }
                                    Ok(Some(StreamEvent::Stanza(stanza))) => {
                                        debug!(name = stanza.name(), "Dispatching stanza");
                                        if let Err(err) = processor
                                            .process_stanza(&self.server, session, &stanza, state)
                                            .await
                                        {
                                            error!(
                                                session = %session.id(),
                                                code = err.error_code(),
                                                error = %err,
                                                "Fatal processing error; closing session"
                                            );
                                            let _ = writer.write_all(STREAM_CLOSE.as_bytes()).await;
                                            break 'outer;
                                        }
                                        if session.take_tls_request() {
                                            // Flush the proceed reply before the
                                            // handshake takes the socket over.
                                            drain_outgoing(&mut writer, outgoing).await?;
                                            exit = LoopExit::UpgradeTls;
                                            break 'outer;
                                        }
                                    }
                                    Ok(Some(StreamEvent::StreamClose)) => {
                                        let _ = writer.write_all(STREAM_CLOSE.as_bytes()).await;
                                        break 'outer;
                                    }
                                    Ok(None) => break,
                                    Err(err) => {
                                        warn!(session = %session.id(), error = %err, "Stream decode error");
                                        break 'outer;
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            warn!(session = %session.id(), error = %err, "Read error");
                            break;
                        }
                    }
                }

                maybe = outgoing.recv() => {
                    match maybe {
                        Some(stanza) => {
                            writer.write_all(stanza.to_string().as_bytes()).await?;
                            writer.flush().await?;
                        }
                        None => break,
                    }
                }
            }
        }

        Ok((exit, reader.unsplit(writer)))
    }

    /// Answer the peer's stream header: our header plus the features
    /// available in the current phase.
    async fn open_stream<W>(
        &self,
        writer: &mut W,
        state: &SessionStateHolder,
        secured: bool,
    ) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let id = uuid::Uuid::new_v4();
        let header = format!(
            "<?xml version='1.0'?><stream:stream xmlns='{}' \
             xmlns:stream='{}' from='{}' id='{}' version='1.0'>",
            ns::JABBER_CLIENT,
            ns::STREAM,
            self.server.domain(),
            id,
        );
        writer.write_all(header.as_bytes()).await?;
        writer
            .write_all(self.stream_features(state, secured).as_bytes())
            .await?;
        writer.flush().await?;
        Ok(())
    }

    fn stream_features(&self, state: &SessionStateHolder, secured: bool) -> String {
        use crate::protocol::state::SessionState;

        let mut inner = String::new();
        if !secured && self.tls.is_some() && state.state() == SessionState::Initiated {
            inner.push_str(&format!("<starttls xmlns='{}'/>", ns::TLS));
        }
        if !state.is_at_least(SessionState::Authenticated) {
            inner.push_str(&format!(
                "<mechanisms xmlns='{}'><mechanism>PLAIN</mechanism></mechanisms>",
                ns::SASL
            ));
        }
        format!("<stream:features>{inner}</stream:features>")
    }
}

async fn drain_outgoing<W>(
    writer: &mut W,
    outgoing: &mut mpsc::Receiver<Stanza>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(stanza) = outgoing.try_recv() {
        writer.write_all(stanza.to_string().as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(())
}
