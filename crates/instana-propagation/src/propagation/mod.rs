// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace context propagation through Instana headers.
//!
//! # Headers
//!
//! | Header | Value |
//! |--------|-------|
//! | `x-instana-t` | trace ID, lowercase hex; 64 bits on write, 64 or 128 bits on read |
//! | `x-instana-s` | span ID, lowercase hex |
//! | `x-instana-l` | `0` when the trace is suppressed, `1` otherwise |
//! | `x-instana-b-<key>` | baggage item |
//!
//! Header names are matched case-insensitively on read. On write, the casing
//! already present in the carrier is reused, so that a differently cased
//! duplicate is never added.
//!
//! # HTTP Header Maps
//!
//! Carriers backed by an [`http::HeaderMap`] additionally receive the W3C
//! `traceparent` and `tracestate` headers on inject, with the Instana
//! `tracestate` entry set to `<trace id>;<span id>`. On extract, a valid W3C
//! trace context is attached to the extracted span context.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use instana_propagation::propagation;
//!
//! let headers = HashMap::from([
//!     ("X-Instana-T".to_string(), "1a".to_string()),
//!     ("X-Instana-S".to_string(), "2b".to_string()),
//! ]);
//!
//! let context = propagation::extract(&headers).expect("context not found");
//! assert_eq!(context.trace_id, 0x1a);
//! assert_eq!(context.span_id, 0x2b);
//! ```

use std::collections::HashMap;

use http::{header::HeaderName, HeaderMap};
use tracing::debug;

use crate::context::SpanContext;
use crate::derivation::native_w3c_parent;
use crate::id::{format_id, parse_id, parse_long_id};
use crate::w3c;
use carrier::Carrier;
use error::Error;

pub mod carrier;
pub mod error;

/// Trace ID header
pub const FIELD_T: &str = "x-instana-t";
/// Span ID header
pub const FIELD_S: &str = "x-instana-s";
/// Level header
pub const FIELD_L: &str = "x-instana-l";
/// Baggage header prefix
pub const FIELD_B: &str = "x-instana-b-";

const LEVEL_SUPPRESSED: &str = "0";
const LEVEL_SAMPLED: &str = "1";

/// Header names as already spelled in a carrier.
struct FieldNames {
    trace_id: String,
    span_id: String,
    level: String,
    baggage_prefix: String,
}

impl FieldNames {
    fn discover(keys: &[&str]) -> Self {
        let mut names = Self {
            trace_id: FIELD_T.to_string(),
            span_id: FIELD_S.to_string(),
            level: FIELD_L.to_string(),
            baggage_prefix: FIELD_B.to_string(),
        };

        for &key in keys {
            if key.eq_ignore_ascii_case(FIELD_T) {
                names.trace_id = key.to_string();
            } else if key.eq_ignore_ascii_case(FIELD_S) {
                names.span_id = key.to_string();
            } else if key.eq_ignore_ascii_case(FIELD_L) {
                names.level = key.to_string();
            } else if strip_baggage_prefix(key).is_some() {
                names.baggage_prefix = key[..FIELD_B.len()].to_string();
            }
        }

        names
    }
}

/// Returns the baggage key of a `x-instana-b-<key>` header, in its original case.
fn strip_baggage_prefix(key: &str) -> Option<&str> {
    key.get(..FIELD_B.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(FIELD_B))
        .map(|_| &key[FIELD_B.len()..])
}

/// Writes the span context into the carrier.
///
/// Existing trace headers are overwritten. For header map carriers, stale
/// Instana headers are removed first and the W3C trace context is written too.
///
/// # Errors
///
/// Returns [`Error::InvalidCarrier`] if the carrier cannot be both read and written.
pub fn inject(sc: &SpanContext, carrier: &mut dyn Carrier) -> Result<(), Error> {
    let fields = {
        let reader = carrier.reader().ok_or(Error::InvalidCarrier("read"))?;
        FieldNames::discover(&reader.keys())
    };

    if carrier.writer().is_none() {
        return Err(Error::InvalidCarrier("write"));
    }

    if let Some(headers) = carrier.headers_mut() {
        remove_instana_headers(headers, &fields);
        add_w3c_trace_context(headers, sc);
    }

    let writer = carrier.writer().ok_or(Error::InvalidCarrier("write"))?;
    writer.set(&fields.trace_id, format_id(sc.trace_id));
    writer.set(&fields.span_id, format_id(sc.span_id));
    writer.set(&fields.level, format_level(sc).to_string());

    if let Some(baggage) = &sc.baggage {
        for (k, v) in baggage {
            writer.set(&format!("{}{k}", fields.baggage_prefix), v.clone());
        }
    }

    Ok(())
}

fn remove_instana_headers(headers: &mut HeaderMap, fields: &FieldNames) {
    headers.remove(fields.trace_id.as_str());
    headers.remove(fields.span_id.as_str());
    headers.remove(fields.level.as_str());

    let baggage_keys = headers
        .keys()
        .filter(|k| strip_baggage_prefix(k.as_str()).is_some())
        .cloned()
        .collect::<Vec<HeaderName>>();
    for key in baggage_keys {
        headers.remove(key);
    }
}

/// Writes `traceparent` pointing at the current span and moves the Instana
/// entry to the front of `tracestate`.
///
/// The Instana entry carries the low 64 bits of the trace ID only.
fn add_w3c_trace_context(headers: &mut HeaderMap, sc: &SpanContext) {
    let trace_id = format_id(sc.trace_id);
    let span_id = format_id(sc.span_id);

    let mut parent = w3c::Parent::parse(&sc.w3c_context.raw_parent)
        .unwrap_or_else(|_| native_w3c_parent(sc));
    parent.parent_id.clone_from(&span_id);

    let state = sc
        .w3c_context
        .state()
        .add(w3c::VENDOR_INSTANA, &format!("{trace_id};{span_id}"));

    let tr_ctx = w3c::Context {
        raw_parent: parent.to_string(),
        raw_state: state.to_string(),
    };
    w3c::inject(&tr_ctx, headers);
}

/// Reads a span context from the carrier.
///
/// Both the trace ID and the span ID headers are required. Baggage keys keep
/// the case they were received with.
///
/// # Errors
///
/// - [`Error::InvalidCarrier`] if the carrier cannot be read
/// - [`Error::ContextNotFound`] if none of the ID headers is present
/// - [`Error::CorruptedContext`] if only one of them is present or an ID is malformed
pub fn extract(carrier: &dyn Carrier) -> Result<SpanContext, Error> {
    let reader = carrier.reader().ok_or(Error::InvalidCarrier("read"))?;

    let mut sc = SpanContext::default();
    let mut baggage = HashMap::new();
    let mut field_count = 0;

    for key in reader.keys() {
        let value = reader.get(key);

        if key.eq_ignore_ascii_case(FIELD_T) {
            field_count += 1;
            let value = value.ok_or_else(|| unreadable(FIELD_T))?;
            (sc.trace_id_hi, sc.trace_id) =
                parse_long_id(value).map_err(|e| corrupted(FIELD_T, &e))?;
        } else if key.eq_ignore_ascii_case(FIELD_S) {
            field_count += 1;
            let value = value.ok_or_else(|| unreadable(FIELD_S))?;
            sc.span_id = parse_id(value).map_err(|e| corrupted(FIELD_S, &e))?;
        }

        let Some(value) = value else {
            continue;
        };

        if key.eq_ignore_ascii_case(FIELD_L) {
            sc.suppressed = parse_level(value);
        } else if let Some(baggage_key) = strip_baggage_prefix(key) {
            baggage.insert(baggage_key.to_string(), value.to_string());
        }
    }

    match field_count {
        0 => return Err(Error::ContextNotFound),
        1 => {
            debug!("Only one of {FIELD_T} and {FIELD_S} is present, ignoring trace context");
            return Err(Error::CorruptedContext(format!(
                "both {FIELD_T} and {FIELD_S} are required"
            )));
        }
        _ => {}
    }

    if !baggage.is_empty() {
        sc.baggage = Some(baggage);
    }

    if let Some(headers) = carrier.headers() {
        match w3c::extract(headers) {
            Ok(tr_ctx) => sc.w3c_context = tr_ctx,
            Err(e) => debug!("No W3C trace context attached: {e}"),
        }
    }

    Ok(sc)
}

/// Reads the parent of a new span from the carrier.
///
/// Behaves like [`extract`], except that a header map carrying only a valid W3C
/// trace context yields a span context holding just that W3C context. Deriving
/// a child from it with [`SpanContext::new_child`] continues the W3C trace.
///
/// # Errors
///
/// Same as [`extract`].
pub fn extract_parent(carrier: &dyn Carrier) -> Result<SpanContext, Error> {
    match extract(carrier) {
        Err(Error::ContextNotFound) => {
            let tr_ctx = carrier
                .headers()
                .and_then(|headers| w3c::extract(headers).ok())
                .ok_or(Error::ContextNotFound)?;

            Ok(SpanContext {
                w3c_context: tr_ctx,
                ..Default::default()
            })
        }
        res => res,
    }
}

fn unreadable(field: &str) -> Error {
    debug!("Failed to read {field}: not a text value");
    Error::CorruptedContext(format!("{field}: not a text value"))
}

fn corrupted(field: &str, e: &Error) -> Error {
    debug!("Failed to parse {field}: {e}");
    Error::CorruptedContext(format!("{field}: {e}"))
}

fn parse_level(s: &str) -> bool {
    s == LEVEL_SUPPRESSED
}

fn format_level(sc: &SpanContext) -> &'static str {
    if sc.suppressed {
        LEVEL_SUPPRESSED
    } else {
        LEVEL_SAMPLED
    }
}
