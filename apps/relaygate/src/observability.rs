//! A small seam a caller could wire to a metrics backend later (spec.md §9
//! "observability manager tolerates None"). The default just logs; no
//! Prometheus/metrics registration ships (spec.md §1 Non-goals).

use std::fmt;

/// One downstream call, logged after the response is written (spec.md
/// §4.I, mirrors the teacher's `downstream_responded` event).
#[derive(Debug, Clone)]
pub struct PostCallRecord<'a> {
    pub request_id: &'a str,
    pub operation: &'a str,
    pub model: &'a str,
    pub status: u16,
    pub latency_ms: u64,
    pub is_stream: bool,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub error: Option<&'a str>,
}

impl fmt::Display for PostCallRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} status={} latency_ms={}",
            self.operation, self.model, self.status, self.latency_ms
        )
    }
}

/// Observes completed calls. Every method has a default no-op so a caller
/// that only cares about some events doesn't need to implement the rest.
pub trait ObservabilityManager: Send + Sync {
    fn log_post(&self, _record: &PostCallRecord<'_>) {}

    fn record_metrics(&self, _record: &PostCallRecord<'_>) {}
}

/// Default implementation: structured `tracing` events, named after the
/// teacher's `downstream_received`/`downstream_responded` pair.
#[derive(Debug, Default)]
pub struct TracingObservability;

impl ObservabilityManager for TracingObservability {
    fn log_post(&self, record: &PostCallRecord<'_>) {
        if let Some(error) = record.error {
            tracing::warn!(
                event = "downstream_responded",
                request_id = %record.request_id,
                operation = %record.operation,
                model = %record.model,
                status = record.status,
                latency_ms = record.latency_ms,
                is_stream = record.is_stream,
                error = %error,
            );
        } else {
            tracing::info!(
                event = "downstream_responded",
                request_id = %record.request_id,
                operation = %record.operation,
                model = %record.model,
                status = record.status,
                latency_ms = record.latency_ms,
                is_stream = record.is_stream,
                prompt_tokens = record.prompt_tokens,
                completion_tokens = record.completion_tokens,
            );
        }
    }
}

/// Accepts every event silently; used when observability is explicitly
/// disabled. Keeps the handler free of `Option<Arc<dyn ...>>` branching.
#[derive(Debug, Default)]
pub struct NullObservability;

impl ObservabilityManager for NullObservability {}
