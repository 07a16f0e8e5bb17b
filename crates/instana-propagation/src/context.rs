// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span context: the propagable identity of a unit of work in a trace.
//!
//! # Trace Context Flow
//!
//! ```text
//! Incoming Request Headers
//!   ↓
//! Extract SpanContext (Instana and/or W3C headers)
//!   ↓
//! Derive child context (see `derivation`)
//!   ↓
//! Inject SpanContext (into outgoing request headers)
//!   ↓
//! Outgoing Request Headers
//! ```
//!
//! A `SpanContext` is a value type. Every operation that changes it returns a
//! new value, so contexts can be shared between threads without locking.

use std::collections::HashMap;
use std::ops::ControlFlow;

use crate::w3c;

/// Correlation data sent by the End-User Monitoring script integrated into a frontend.
///
/// Carried opaquely; this crate never interprets it.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct EumCorrelationData {
    pub kind: String,
    pub id: String,
}

/// Reference to a span, possibly belonging to another trace, relevant to a span context.
///
/// Links record the Instana trace that was superseded when a request crossed a
/// service instrumented with a different tracer and came back with a new W3C trace ID.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct SpanReference {
    pub trace_id: String,
    pub span_id: String,
}

impl SpanReference {
    /// Parses the `<trace id>;<span id>` payload of the Instana `tracestate` entry.
    #[must_use]
    pub fn parse_w3c_state(vendor_data: &str) -> Option<Self> {
        let (trace_id, span_id) = vendor_data.split_once(';')?;

        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
        })
    }
}

/// Span metadata propagated across process boundaries.
///
/// # Core Identity
///
/// - **`trace_id_hi`, `trace_id`**: the 128-bit trace ID split into 64-bit halves.
///   `trace_id` alone is a valid legacy 64-bit trace ID.
/// - **`span_id`**: identifier of this span
/// - **`parent_id`**: identifier of the parent span, `0` for a root span
///
/// # W3C Trace Context
///
/// `w3c_context` holds the W3C representation of this context. When it is not
/// zero, its parent ID always matches `span_id` after a derivation, so that the
/// native IDs can be recovered from the W3C headers alone.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct SpanContext {
    pub trace_id_hi: u64,
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: u64,
    /// Links to spans of other traces, i.e. indirect parents.
    pub links: Vec<SpanReference>,
    pub sampled: bool,
    /// Whether the trace must not be sent to the agent.
    pub suppressed: bool,
    /// Created on first write.
    pub baggage: Option<HashMap<String, String>>,
    pub w3c_context: w3c::Context,
    /// Whether the trace ID came from a third-party format rather than being generated here.
    pub foreign_trace: bool,
    pub correlation: EumCorrelationData,
}

impl SpanContext {
    /// Whether the context carries any native identifier.
    #[must_use]
    pub fn has_native_ids(&self) -> bool {
        self.trace_id_hi != 0 || self.trace_id != 0 || self.span_id != 0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }

    /// Returns a copy of this context with the baggage item set.
    #[must_use]
    pub fn with_baggage_item(&self, key: &str, value: &str) -> Self {
        let mut res = self.clone();
        res.baggage
            .get_or_insert_with(|| HashMap::with_capacity(1))
            .insert(key.to_string(), value.to_string());

        res
    }

    #[must_use]
    pub fn baggage_item(&self, key: &str) -> Option<&str> {
        self.baggage.as_ref()?.get(key).map(String::as_str)
    }

    /// Visits every baggage item in unspecified order until the handler breaks.
    pub fn for_each_baggage_item<F>(&self, mut handler: F)
    where
        F: FnMut(&str, &str) -> ControlFlow<()>,
    {
        let Some(baggage) = &self.baggage else {
            return;
        };

        for (k, v) in baggage {
            if handler(k, v).is_break() {
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_with_baggage_item_does_not_share_baggage() {
        let c = SpanContext {
            trace_id: 1,
            span_id: 2,
            ..Default::default()
        };
        assert!(c.baggage.is_none());

        let c1 = c.with_baggage_item("key1", "value1");
        let c2 = c1.with_baggage_item("key2", "value2");

        assert!(c.baggage.is_none());
        assert_eq!(c1.baggage.as_ref().unwrap().len(), 1);
        assert_eq!(c2.baggage.as_ref().unwrap().len(), 2);
        assert_eq!(c2.baggage_item("key1"), Some("value1"));
        assert_eq!(c2.baggage_item("key2"), Some("value2"));
        assert_eq!(c2.trace_id, 1);
        assert_eq!(c2.span_id, 2);
    }

    #[test]
    fn test_with_baggage_item_overrides_value() {
        let c = SpanContext::default()
            .with_baggage_item("key", "old")
            .with_baggage_item("key", "new");

        assert_eq!(c.baggage_item("key"), Some("new"));
        assert_eq!(c.baggage.unwrap().len(), 1);
    }

    #[test]
    fn test_for_each_baggage_item() {
        let c = SpanContext::default()
            .with_baggage_item("a", "1")
            .with_baggage_item("b", "2")
            .with_baggage_item("c", "3");

        let mut visited = HashMap::new();
        c.for_each_baggage_item(|k, v| {
            visited.insert(k.to_string(), v.to_string());
            ControlFlow::Continue(())
        });
        assert_eq!(visited.len(), 3);
        assert_eq!(visited["b"], "2");

        let mut calls = 0;
        c.for_each_baggage_item(|_, _| {
            calls += 1;
            ControlFlow::Break(())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_for_each_baggage_item_without_baggage() {
        let mut calls = 0;
        SpanContext::default().for_each_baggage_item(|_, _| {
            calls += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(calls, 0);

        let empty = SpanContext {
            baggage: Some(HashMap::new()),
            ..Default::default()
        };
        empty.for_each_baggage_item(|_, _| {
            calls += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_parse_w3c_state() {
        assert_eq!(
            SpanReference::parse_w3c_state("1a;2b"),
            Some(SpanReference {
                trace_id: "1a".to_string(),
                span_id: "2b".to_string(),
            })
        );
        assert_eq!(SpanReference::parse_w3c_state("1a2b"), None);
    }
}
