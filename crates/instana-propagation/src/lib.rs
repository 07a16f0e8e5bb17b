// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Instana Propagation
//!
//! Span context handling for distributed tracing: identifier encoding, child
//! context derivation and trace context propagation through Instana
//! (`x-instana-*`) and W3C (`traceparent`, `tracestate`) headers.
//!
//! ## Architecture
//!
//! - [`id`]: hexadecimal encoding of trace and span identifiers
//! - [`w3c`]: W3C trace context values and headers
//! - [`context`]: the [`SpanContext`] value type
//! - [`derivation`]: root and child context creation, W3C restoration
//! - [`propagation`]: inject into and extract from carriers
//! - [`config`]: settings read from `INSTANA_*` environment variables
//! - [`logger`]: log formatter for the library's diagnostics
//!
//! ## Example
//!
//! ```
//! use http::HeaderMap;
//! use instana_propagation::{config, propagation, SpanContext};
//!
//! let config = config::get_config();
//!
//! let mut incoming = HeaderMap::new();
//! incoming.insert("x-instana-t", "1a".parse().unwrap());
//! incoming.insert("x-instana-s", "2b".parse().unwrap());
//!
//! let parent = propagation::extract_parent(&incoming).unwrap_or_default();
//! let child = SpanContext::new_child(&parent, &config);
//! assert_eq!(child.trace_id, 0x1a);
//! assert_eq!(child.parent_id, 0x2b);
//!
//! let mut outgoing = HeaderMap::new();
//! propagation::inject(&child, &mut outgoing).unwrap();
//! assert_eq!(outgoing["x-instana-t"], "1a");
//! assert!(outgoing.contains_key("traceparent"));
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(missing_copy_implementations)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

pub mod config;

pub mod context;

/// Context Derivation Engine
pub mod derivation;

pub mod id;

pub mod logger;

pub mod propagation;

/// Foreign (W3C) trace context adapter
pub mod w3c;

pub use context::{EumCorrelationData, SpanContext, SpanReference};
pub use propagation::error::Error;
