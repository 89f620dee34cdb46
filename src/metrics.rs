//! Prometheus metrics collection for roostd.
//!
//! Protocol-aware observability for the dispatch pipeline:
//!
//! - `xmpp_stanzas_total{kind}` - stanzas dispatched by kind
//! - `xmpp_stanza_duration_seconds{handler}` - handler latency histogram
//! - `xmpp_handler_errors_total{code}` - recoverable handler failures
//! - `xmpp_delivery_failures_total{strategy}` - relay failures by strategy
//! - `xmpp_archived_messages_total` - messages recorded by the archiver
//! - `xmpp_active_sessions` - currently connected sessions
//!
//! All recorders are no-ops until [`init`] runs, so library consumers and
//! tests pay nothing.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

static STANZAS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static STANZA_LATENCY: OnceLock<HistogramVec> = OnceLock::new();
static HANDLER_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();
static DELIVERY_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();
static ARCHIVED_MESSAGES: OnceLock<IntCounter> = OnceLock::new();
static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// The registry backing the `/metrics` endpoint.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Register all metrics. Call once at startup; calling again is a no-op.
pub fn init() {
    let registry = registry();

    let stanzas = STANZAS_TOTAL.get_or_init(|| {
        IntCounterVec::new(
            Opts::new("xmpp_stanzas_total", "Stanzas dispatched by kind"),
            &["kind"],
        )
        .expect("valid metric definition")
    });
    let latency = STANZA_LATENCY.get_or_init(|| {
        HistogramVec::new(
            HistogramOpts::new(
                "xmpp_stanza_duration_seconds",
                "Handler execution latency",
            ),
            &["handler"],
        )
        .expect("valid metric definition")
    });
    let handler_errors = HANDLER_ERRORS.get_or_init(|| {
        IntCounterVec::new(
            Opts::new(
                "xmpp_handler_errors_total",
                "Recoverable handler failures by code",
            ),
            &["code"],
        )
        .expect("valid metric definition")
    });
    let delivery_failures = DELIVERY_FAILURES.get_or_init(|| {
        IntCounterVec::new(
            Opts::new(
                "xmpp_delivery_failures_total",
                "Relay failures by consulted strategy",
            ),
            &["strategy"],
        )
        .expect("valid metric definition")
    });
    let archived = ARCHIVED_MESSAGES.get_or_init(|| {
        IntCounter::new(
            "xmpp_archived_messages_total",
            "Messages recorded by the archiver",
        )
        .expect("valid metric definition")
    });
    let sessions = ACTIVE_SESSIONS.get_or_init(|| {
        IntGauge::new("xmpp_active_sessions", "Currently connected sessions")
            .expect("valid metric definition")
    });

    // Re-registration errors mean init ran twice; that is harmless.
    let _ = registry.register(Box::new(stanzas.clone()));
    let _ = registry.register(Box::new(latency.clone()));
    let _ = registry.register(Box::new(handler_errors.clone()));
    let _ = registry.register(Box::new(delivery_failures.clone()));
    let _ = registry.register(Box::new(archived.clone()));
    let _ = registry.register(Box::new(sessions.clone()));
}

/// Record one dispatched stanza.
pub fn record_stanza(kind: &str) {
    if let Some(counter) = STANZAS_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

/// Record handler execution latency.
pub fn record_latency(handler: &str, seconds: f64) {
    if let Some(histogram) = STANZA_LATENCY.get() {
        histogram.with_label_values(&[handler]).observe(seconds);
    }
}

/// Record a recoverable handler failure.
pub fn record_handler_error(code: &str) {
    if let Some(counter) = HANDLER_ERRORS.get() {
        counter.with_label_values(&[code]).inc();
    }
}

/// Record a relay failure and the strategy consulted for it.
pub fn record_delivery_failure(strategy: &str) {
    if let Some(counter) = DELIVERY_FAILURES.get() {
        counter.with_label_values(&[strategy]).inc();
    }
}

/// Record one archived message.
pub fn record_archived() {
    if let Some(counter) = ARCHIVED_MESSAGES.get() {
        counter.inc();
    }
}

/// Track session lifecycle for the gauge.
pub fn session_opened() {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.inc();
    }
}

/// Counterpart of [`session_opened`].
pub fn session_closed() {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.dec();
    }
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&registry().gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
