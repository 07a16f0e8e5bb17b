// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span context derivation: new roots, child contexts and W3C restoration.
//!
//! # Derivation Rules
//!
//! A child context is derived from its parent in this order:
//!
//! 1. **No native IDs in the parent**: try to restore IDs from the parent's W3C
//!    trace context. A successful restoration marks the trace as foreign unless
//!    W3C trace correlation is disabled.
//! 2. **Still no native IDs**: start a new root, keeping the unused W3C context.
//! 3. **Native IDs present**: copy the parent, issue a new span ID and point
//!    `parent_id` at the parent span.
//! 4. **W3C reconciliation**: create a W3C context from the native IDs, or move
//!    the existing one's parent ID to the new span.
//! 5. **Foreign trace**: link the Instana trace found in `tracestate`, i.e. the
//!    trace that was replaced when the W3C trace ID took over.
//!
//! # Correlation Disabled
//!
//! With `disable_w3c_trace_correlation` the W3C parent is ignored entirely. The
//! Instana entry of `tracestate` (`in=<trace id>;<span id>`) is the only source
//! of native identifiers, so the trace continues as the Instana trace that last
//! handed the request over.

use tracing::debug;

use crate::config::Config;
use crate::context::{SpanContext, SpanReference};
use crate::id::{format_id, format_long_id, parse_id, parse_long_id, random_id};
use crate::w3c;

impl SpanContext {
    /// Creates a root span context issuing a new trace ID.
    ///
    /// The trace ID and span ID of a root context are equal.
    #[must_use]
    pub fn new_root() -> Self {
        let span_id = random_id();

        let mut c = Self {
            trace_id: span_id,
            span_id,
            ..Default::default()
        };
        c.w3c_context = new_w3c_context(&c);

        c
    }

    /// Creates a child span context of `parent`.
    ///
    /// A parent without Instana IDs is restored from its W3C trace context; if
    /// that fails too, a new root context is returned.
    #[must_use]
    pub fn new_child(parent: &SpanContext, config: &Config) -> Self {
        let mut foreign_trace = false;
        let restored;
        let parent = if parent.has_native_ids() {
            parent
        } else {
            restored = restore_from_w3c_context(&parent.w3c_context, config);
            foreign_trace = !config.disable_w3c_trace_correlation;
            &restored
        };

        if !parent.has_native_ids() {
            debug!("No usable parent trace context found, starting a new trace");
            let mut c = Self::new_root();

            // keep the W3C context even though it could not be used
            if !parent.w3c_context.is_zero() {
                c.w3c_context = parent.w3c_context.clone();
            }

            return c;
        }

        let mut c = SpanContext {
            span_id: random_id(),
            parent_id: parent.span_id,
            links: Vec::new(),
            foreign_trace,
            correlation: Default::default(),
            ..parent.clone()
        };

        if c.w3c_context.is_zero() {
            c.w3c_context = new_w3c_context(&c);
            return c;
        }

        // a malformed traceparent is replaced, the vendor state is kept
        let mut w3c_parent = w3c::Parent::parse(&c.w3c_context.raw_parent)
            .unwrap_or_else(|_| native_w3c_parent(&c));
        w3c_parent.parent_id = format_id(c.span_id);
        c.w3c_context.raw_parent = w3c_parent.to_string();

        if foreign_trace {
            if let Some(ancestor) = c
                .w3c_context
                .state()
                .fetch(w3c::VENDOR_INSTANA)
                .and_then(SpanReference::parse_w3c_state)
            {
                c.links.push(ancestor);
            }
        }

        c
    }
}

fn new_w3c_context(c: &SpanContext) -> w3c::Context {
    w3c::Context::new(&native_w3c_parent(c))
}

/// Builds the `traceparent` equivalent of the native identifiers.
pub(crate) fn native_w3c_parent(c: &SpanContext) -> w3c::Parent {
    w3c::Parent {
        version: w3c::VERSION_MAX,
        trace_id: format_long_id(c.trace_id_hi, c.trace_id),
        parent_id: format_id(c.span_id),
        flags: w3c::Flags {
            sampled: !c.suppressed,
        },
    }
}

/// Restores native IDs from a W3C trace context.
///
/// Returns a context without native IDs if nothing usable is found, still
/// holding `tr_ctx`. Identifiers are never partially populated.
fn restore_from_w3c_context(tr_ctx: &w3c::Context, config: &Config) -> SpanContext {
    if tr_ctx.is_zero() {
        return SpanContext::default();
    }

    if config.disable_w3c_trace_correlation {
        return restore_from_w3c_state(tr_ctx);
    }

    let parent = tr_ctx.parent();

    let ids = parse_long_id(&parent.trace_id)
        .and_then(|(hi, lo)| Ok((hi, lo, parse_id(&parent.parent_id)?)));
    let (trace_id_hi, trace_id, span_id) = match ids {
        Ok(ids) => ids,
        Err(e) => {
            debug!("Failed to restore span context from traceparent: {e}");
            return SpanContext {
                w3c_context: tr_ctx.clone(),
                ..Default::default()
            };
        }
    };

    SpanContext {
        trace_id_hi,
        trace_id,
        span_id,
        suppressed: !parent.flags.sampled,
        w3c_context: tr_ctx.clone(),
        ..Default::default()
    }
}

/// Restores native IDs from the Instana entry of `tracestate`, ignoring `traceparent`.
fn restore_from_w3c_state(tr_ctx: &w3c::Context) -> SpanContext {
    let mut c = SpanContext {
        w3c_context: tr_ctx.clone(),
        ..Default::default()
    };

    let state = tr_ctx.state();
    let Some(reference) = state
        .fetch(w3c::VENDOR_INSTANA)
        .and_then(SpanReference::parse_w3c_state)
    else {
        return c;
    };

    let ids = parse_long_id(&reference.trace_id)
        .and_then(|(hi, lo)| Ok((hi, lo, parse_id(&reference.span_id)?)));
    match ids {
        Ok((trace_id_hi, trace_id, span_id)) => {
            c.trace_id_hi = trace_id_hi;
            c.trace_id = trace_id;
            c.span_id = span_id;
        }
        Err(e) => debug!("Failed to restore span context from tracestate: {e}"),
    }

    c
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::context::EumCorrelationData;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn correlation_enabled() -> Config {
        Config::default()
    }

    fn correlation_disabled() -> Config {
        Config {
            disable_w3c_trace_correlation: true,
            ..Default::default()
        }
    }

    fn w3c_only(raw_parent: &str, raw_state: &str) -> SpanContext {
        SpanContext {
            w3c_context: w3c::Context {
                raw_parent: raw_parent.to_string(),
                raw_state: raw_state.to_string(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_new_root() {
        let c = SpanContext::new_root();

        assert_ne!(c.trace_id, 0);
        assert_eq!(c.trace_id, c.span_id);
        assert_eq!(c.trace_id_hi, 0);
        assert_eq!(c.parent_id, 0);
        assert!(c.is_root());
        assert!(!c.foreign_trace);
        assert!(c.baggage.is_none());

        let parent = c.w3c_context.parent();
        assert_eq!(parent.trace_id, format!("{:032x}", c.trace_id));
        assert_eq!(parent.parent_id, format!("{:016x}", c.span_id));
        assert!(parent.flags.sampled);
        assert!(c.w3c_context.raw_state.is_empty());
    }

    #[test]
    fn test_new_child_of_root() {
        let root = SpanContext::new_root();
        let child = SpanContext::new_child(&root, &correlation_enabled());

        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.trace_id_hi, root.trace_id_hi);
        assert_eq!(child.parent_id, root.span_id);
        assert_ne!(child.span_id, root.span_id);
        assert_ne!(child.span_id, 0);
        assert!(!child.is_root());
        assert!(!child.foreign_trace);
        assert!(child.links.is_empty());

        let w3c_parent = child.w3c_context.parent();
        assert_eq!(w3c_parent.trace_id, format!("{:032x}", root.trace_id));
        assert_eq!(w3c_parent.parent_id, format!("{:016x}", child.span_id));
    }

    #[test]
    fn test_new_child_copies_baggage_and_flags() {
        let parent = SpanContext {
            trace_id_hi: 10,
            trace_id: 1,
            span_id: 2,
            parent_id: 3,
            sampled: true,
            suppressed: true,
            links: vec![SpanReference {
                trace_id: "a".to_string(),
                span_id: "b".to_string(),
            }],
            correlation: EumCorrelationData {
                kind: "web".to_string(),
                id: "1".to_string(),
            },
            ..Default::default()
        }
        .with_baggage_item("foo", "bar");

        let child = SpanContext::new_child(&parent, &correlation_enabled());

        assert_eq!(child.trace_id_hi, 10);
        assert_eq!(child.trace_id, 1);
        assert_eq!(child.parent_id, 2);
        assert!(child.sampled);
        assert!(child.suppressed);
        assert_eq!(child.baggage, Some(HashMap::from([("foo".to_string(), "bar".to_string())])));
        assert!(child.links.is_empty());
        assert_eq!(child.correlation, EumCorrelationData::default());

        let w3c_parent = child.w3c_context.parent();
        assert_eq!(w3c_parent.trace_id, "000000000000000a0000000000000001");
        assert!(!w3c_parent.flags.sampled);
    }

    #[test]
    fn test_new_child_with_native_ids_ignores_w3c_restoration() {
        let parent = SpanContext {
            trace_id: 0x1a,
            span_id: 0x2b,
            w3c_context: w3c::Context {
                raw_parent: TRACEPARENT.to_string(),
                raw_state: "in=1234;5678".to_string(),
            },
            ..Default::default()
        };

        let child = SpanContext::new_child(&parent, &correlation_enabled());

        assert_eq!(child.trace_id, 0x1a);
        assert_eq!(child.parent_id, 0x2b);
        assert!(!child.foreign_trace);
        assert!(child.links.is_empty());

        // the W3C trace ID is continued, only the parent moves to the new span
        let w3c_parent = child.w3c_context.parent();
        assert_eq!(w3c_parent.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(w3c_parent.parent_id, format!("{:016x}", child.span_id));
        assert_eq!(child.w3c_context.raw_state, "in=1234;5678");
    }

    #[test]
    fn test_new_child_restores_from_traceparent() {
        let parent = w3c_only(TRACEPARENT, "in=1234;5678,rojo=00f067aa0ba902b7");

        let child = SpanContext::new_child(&parent, &correlation_enabled());

        assert_eq!(child.trace_id_hi, 0x4bf9_2f35_77b3_4da6);
        assert_eq!(child.trace_id, 0xa3ce_929d_0e0e_4736);
        assert_eq!(child.parent_id, 0x00f0_67aa_0ba9_02b7);
        assert_ne!(child.span_id, 0);
        assert!(child.foreign_trace);
        assert!(!child.suppressed);
        assert_eq!(
            child.links,
            vec![SpanReference {
                trace_id: "1234".to_string(),
                span_id: "5678".to_string(),
            }]
        );

        let w3c_parent = child.w3c_context.parent();
        assert_eq!(w3c_parent.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(w3c_parent.parent_id, format!("{:016x}", child.span_id));
    }

    #[test]
    fn test_new_child_restores_unsampled_traceparent() {
        let parent = w3c_only(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
            "",
        );

        let child = SpanContext::new_child(&parent, &correlation_enabled());

        assert!(child.suppressed);
        assert!(child.foreign_trace);
        assert!(child.links.is_empty());
    }

    #[test]
    fn test_new_child_with_unusable_w3c_context_starts_new_trace() {
        let parent = w3c_only("garbage", "rojo=00f067aa0ba902b7");

        let child = SpanContext::new_child(&parent, &correlation_enabled());

        assert_ne!(child.trace_id, 0);
        assert_eq!(child.trace_id, child.span_id);
        assert!(child.is_root());
        assert!(!child.foreign_trace);
        assert_eq!(child.w3c_context, parent.w3c_context);
    }

    #[test]
    fn test_restore_from_malformed_traceparent_keeps_w3c_context() {
        for raw_parent in ["garbage", "00-4bf92f3577b34da6a3ce929d0e0e4736-zz-01"] {
            let tr_ctx = w3c::Context {
                raw_parent: raw_parent.to_string(),
                raw_state: "rojo=1".to_string(),
            };

            let c = restore_from_w3c_context(&tr_ctx, &correlation_enabled());

            assert!(!c.has_native_ids(), "traceparent {raw_parent:?}");
            assert_eq!(c.w3c_context, tr_ctx);
        }
    }

    #[test]
    fn test_new_child_of_empty_context_is_root() {
        let child = SpanContext::new_child(&SpanContext::default(), &correlation_enabled());

        assert!(child.is_root());
        assert_eq!(child.trace_id, child.span_id);
        assert!(!child.w3c_context.is_zero());
        assert!(!child.foreign_trace);
    }

    #[test]
    fn test_new_child_correlation_disabled_uses_tracestate() {
        let parent = w3c_only(TRACEPARENT, "rojo=1,in=1a;2b");

        let child = SpanContext::new_child(&parent, &correlation_disabled());

        assert_eq!(child.trace_id_hi, 0);
        assert_eq!(child.trace_id, 0x1a);
        assert_eq!(child.parent_id, 0x2b);
        assert!(!child.foreign_trace);
        assert!(child.links.is_empty());

        let w3c_parent = child.w3c_context.parent();
        assert_eq!(w3c_parent.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(w3c_parent.parent_id, format!("{:016x}", child.span_id));
    }

    #[test]
    fn test_new_child_correlation_disabled_without_instana_state() {
        let parent = w3c_only(TRACEPARENT, "rojo=1");

        let child = SpanContext::new_child(&parent, &correlation_disabled());

        assert!(child.is_root());
        assert_eq!(child.trace_id, child.span_id);
        assert_ne!(child.trace_id, 0xa3ce_929d_0e0e_4736);
        assert_eq!(child.w3c_context, parent.w3c_context);
    }

    #[test]
    fn test_new_child_correlation_disabled_malformed_instana_state() {
        for state in ["in=zz;2b", "in=1a2b", "in=1a;"] {
            let parent = w3c_only(TRACEPARENT, state);

            let child = SpanContext::new_child(&parent, &correlation_disabled());

            assert!(child.is_root(), "state {state:?}");
            assert_eq!(child.w3c_context, parent.w3c_context);
        }
    }

    #[test]
    fn test_restore_never_populates_partially() {
        let tr_ctx = w3c::Context {
            raw_parent: TRACEPARENT.to_string(),
            raw_state: "in=1a;zz".to_string(),
        };

        let c = restore_from_w3c_state(&tr_ctx);

        assert!(!c.has_native_ids());
        assert_eq!(c.w3c_context, tr_ctx);
        assert_eq!(
            restore_from_w3c_context(&w3c::Context::default(), &correlation_enabled()),
            SpanContext::default()
        );
    }
}
