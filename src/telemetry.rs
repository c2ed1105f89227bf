//! Request-path span and counter helpers for the handler layer (SPEC_FULL.md
//! §A). Grounded on `turbomcp-server::observability::PerformanceMonitor`
//! and `SecurityAuditor::log_tool_execution`, adapted to the
//! `{serverName, serverType, toolOrResourceName, clientName}` attribute set
//! spec §4.5 asks every forwarded call to carry.

use std::time::Instant;
use tracing::{info, info_span, warn, Span};

/// Attributes attached to every handler-layer span (spec §4.5).
#[derive(Debug, Clone)]
pub struct CallAttributes<'a> {
    pub server_name: &'a str,
    pub server_type: &'a str,
    pub tool_or_resource: &'a str,
    pub client_name: &'a str,
}

/// Open a span for one forwarded call, with the spec's mandated attributes
/// pre-populated.
pub fn call_span(attrs: &CallAttributes<'_>) -> Span {
    info_span!(
        "gateway.call",
        server_name = attrs.server_name,
        server_type = attrs.server_type,
        tool_or_resource = attrs.tool_or_resource,
        client_name = attrs.client_name,
    )
}

/// Tracks one call's wall-clock duration and logs success/failure with the
/// same attribute set the span carries, for log-based dashboards that
/// don't have access to the trace backend.
pub struct CallTimer<'a> {
    start: Instant,
    attrs: CallAttributes<'a>,
}

impl<'a> CallTimer<'a> {
    pub fn start(attrs: CallAttributes<'a>) -> Self {
        Self { start: Instant::now(), attrs }
    }

    pub fn success(self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        info!(
            event = "call_success",
            server_name = self.attrs.server_name,
            server_type = self.attrs.server_type,
            tool_or_resource = self.attrs.tool_or_resource,
            client_name = self.attrs.client_name,
            elapsed_ms,
            "forwarded call completed"
        );
    }

    pub fn failure(self, reason: &str) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        warn!(
            event = "call_failure",
            server_name = self.attrs.server_name,
            server_type = self.attrs.server_type,
            tool_or_resource = self.attrs.tool_or_resource,
            client_name = self.attrs.client_name,
            elapsed_ms,
            reason,
            "forwarded call failed"
        );
    }
}

/// Record a synthetic counter value reported via the `record-counter`
/// dynamic tool (SPEC_FULL.md §E). No aggregation is performed here; this
/// only gets the value into the structured log stream for downstream
/// metrics scraping.
pub fn record_counter(name: &str, value: f64, labels: &[(&str, &str)]) {
    info!(metric = "counter", name, value, ?labels, "counter recorded");
}

pub fn record_histogram(name: &str, value: f64, labels: &[(&str, &str)]) {
    info!(metric = "histogram", name, value, ?labels, "histogram recorded");
}

pub fn record_gauge(name: &str, value: f64, labels: &[(&str, &str)]) {
    info!(metric = "gauge", name, value, ?labels, "gauge recorded");
}
