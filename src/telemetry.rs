//! Telemetry utilities for dispatch timing and span construction.

use std::time::Instant;

/// Guard timing one handler execution.
///
/// Records the latency histogram when dropped, so every exit path of the
/// processor is covered.
pub struct StanzaTimer {
    handler: &'static str,
    start: Instant,
}

impl StanzaTimer {
    /// Start timing a handler execution.
    pub fn new(handler: &'static str) -> Self {
        Self {
            handler,
            start: Instant::now(),
        }
    }
}

impl Drop for StanzaTimer {
    fn drop(&mut self) {
        crate::metrics::record_latency(self.handler, self.start.elapsed().as_secs_f64());
    }
}

/// Standardized span constructors for session observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one client session.
    pub fn session(id: &str, addr: &str) -> Span {
        info_span!("session", id = %id, addr = %addr)
    }

    /// Span for one stanza dispatch.
    pub fn stanza(name: &str, handler: &str) -> Span {
        info_span!("stanza", name = %name, handler = %handler)
    }
}
