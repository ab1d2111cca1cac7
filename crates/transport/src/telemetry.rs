//! Trace-context propagation through the message envelope.
//!
//! The transport never interprets trace contexts itself. On append it asks a
//! [`TelemetryCarrier`] for an opaque token and stores it in the `ctx` field; on
//! read it hands the token back to the carrier and attaches whatever context the
//! carrier rebuilds to the delivery, so consumers can run their work as a child
//! of the producing span.

use std::{fmt, future::Future};

use serde::{Deserialize, Serialize};

tokio::task_local! {
    static CURRENT_TRACE: TraceContext;
}

/// A W3C trace context (`traceparent`) identifying one span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceContext {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub sampled: bool,
}

impl TraceContext {
    /// Start a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: non_zero(rand::random()),
            span_id: non_zero(rand::random()),
            sampled: true,
        }
    }

    /// A new span in the same trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: non_zero(rand::random()),
            sampled: self.sampled,
        }
    }

    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }

    pub fn span_id_hex(&self) -> String {
        hex::encode(self.span_id)
    }

    /// Render as a version 00 `traceparent` header value.
    pub fn traceparent(&self) -> String {
        format!(
            "00-{}-{}-{}",
            self.trace_id_hex(),
            self.span_id_hex(),
            if self.sampled { "01" } else { "00" }
        )
    }

    /// Parse a version 00 `traceparent` header value.
    pub fn from_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace = parts.next()?;
        let span = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() || version != "00" {
            return None;
        }

        let mut trace_id = [0u8; 16];
        let mut span_id = [0u8; 8];
        let mut flag_bytes = [0u8; 1];
        hex::decode_to_slice(trace, &mut trace_id).ok()?;
        hex::decode_to_slice(span, &mut span_id).ok()?;
        hex::decode_to_slice(flags, &mut flag_bytes).ok()?;

        // All-zero trace or span ids are invalid
        if trace_id == [0u8; 16] || span_id == [0u8; 8] {
            return None;
        }

        Some(Self {
            trace_id,
            span_id,
            sampled: flag_bytes[0] & 0x01 == 0x01,
        })
    }

    /// The context of the enclosing [`TraceContext::scope`], if any.
    pub fn current() -> Option<Self> {
        CURRENT_TRACE.try_with(|ctx| *ctx).ok()
    }

    /// Run `future` with `self` as the current context.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT_TRACE.scope(self, future).await
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.traceparent())
    }
}

fn non_zero<const N: usize>(mut bytes: [u8; N]) -> [u8; N] {
    if bytes.iter().all(|b| *b == 0) {
        bytes[N - 1] = 1;
    }
    bytes
}

/// Serializes and restores trace contexts carried inside messages.
pub trait TelemetryCarrier: Send + Sync {
    /// Token describing the context a new message is produced under, or `None`
    /// when there is nothing to propagate.
    fn inject(&self) -> Option<String>;

    /// Rebuild the producing context from a token written by [`inject`].
    ///
    /// [`inject`]: TelemetryCarrier::inject
    fn extract(&self, token: &str) -> Option<TraceContext>;
}

/// JSON shape of the `ctx` field.
#[derive(Debug, Serialize, Deserialize)]
struct CarrierPayload {
    #[serde(rename = "Context")]
    context: String,
}

/// Carrier writing `{"Context": "<traceparent>"}` tokens.
///
/// Each injected token names a fresh producer span: a child of the current
/// [`TraceContext`] when one is in scope, otherwise the root of a new trace.
/// Extraction also accepts a bare `traceparent` string.
#[derive(Debug, Clone, Copy, Default)]
pub struct W3cTraceCarrier;

impl TelemetryCarrier for W3cTraceCarrier {
    fn inject(&self) -> Option<String> {
        let context = TraceContext::current()
            .map(|ctx| ctx.child())
            .unwrap_or_else(TraceContext::new_root);

        serde_json::to_string(&CarrierPayload {
            context: context.traceparent(),
        })
        .ok()
    }

    fn extract(&self, token: &str) -> Option<TraceContext> {
        match serde_json::from_str::<CarrierPayload>(token) {
            Ok(payload) => TraceContext::from_traceparent(&payload.context),
            Err(_) => TraceContext::from_traceparent(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_parse_traceparent() {
        let ctx = TraceContext::from_traceparent(SAMPLE).unwrap();
        assert_eq!(ctx.trace_id_hex(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.span_id_hex(), "00f067aa0ba902b7");
        assert!(ctx.sampled);
        assert_eq!(ctx.traceparent(), SAMPLE);
    }

    #[test]
    fn test_reject_invalid_traceparent() {
        assert!(TraceContext::from_traceparent("").is_none());
        assert!(TraceContext::from_traceparent("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").is_none());
        assert!(TraceContext::from_traceparent("00-00000000000000000000000000000000-00f067aa0ba902b7-01").is_none());
        assert!(TraceContext::from_traceparent("00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01").is_none());
        assert!(TraceContext::from_traceparent("00-xyz-00f067aa0ba902b7-01").is_none());
        assert!(TraceContext::from_traceparent(&format!("{}-extra", SAMPLE)).is_none());
    }

    #[test]
    fn test_child_keeps_trace() {
        let root = TraceContext::new_root();
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.sampled, root.sampled);
    }

    #[test]
    fn test_carrier_token_shape() {
        let token = W3cTraceCarrier.inject().unwrap();
        let value: serde_json::Value = serde_json::from_str(&token).unwrap();
        let traceparent = value["Context"].as_str().unwrap();
        assert!(TraceContext::from_traceparent(traceparent).is_some());
    }

    #[test]
    fn test_carrier_extract_accepts_bare_traceparent() {
        let ctx = W3cTraceCarrier.extract(SAMPLE).unwrap();
        assert_eq!(ctx.traceparent(), SAMPLE);
        assert!(W3cTraceCarrier.extract("{\"Context\":\"garbage\"}").is_none());
        assert!(W3cTraceCarrier.extract("garbage").is_none());
    }

    #[tokio::test]
    async fn test_inject_inside_scope_continues_trace() {
        assert!(TraceContext::current().is_none());

        let parent = TraceContext::new_root();
        let token = parent
            .scope(async {
                assert_eq!(TraceContext::current(), Some(parent));
                W3cTraceCarrier.inject().unwrap()
            })
            .await;

        let produced = W3cTraceCarrier.extract(&token).unwrap();
        assert_eq!(produced.trace_id, parent.trace_id);
        assert_ne!(produced.span_id, parent.span_id);
    }
}
