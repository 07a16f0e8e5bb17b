// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for trace context propagation operations.
//!
//! Errors are non-fatal. The worst outcome of any of them is that the current
//! span becomes an unlinked root: the trace is still exported, only the
//! correlation with the upstream service is lost.
//!
//! # Handling
//!
//! - **`InvalidCarrier`**: the caller passed a carrier lacking read or write access
//! - **`ContextNotFound`**: no upstream trace, start a new root context
//! - **`CorruptedContext`**: partial or garbled headers, treated as absent
//! - **`MalformedId`**: hex decoding failure, converted to "absent" by the
//!   context restoration layer

use thiserror::Error;

/// Error during trace context extraction, injection or identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The carrier does not provide the capability required by the operation.
    #[error("invalid carrier: {0} access is not supported")]
    InvalidCarrier(&'static str),

    /// Neither the trace ID nor the span ID header is present.
    #[error("span context not found in carrier")]
    ContextNotFound,

    /// Only one of the trace ID and span ID headers is present, or a value is malformed.
    #[error("span context corrupted: {0}")]
    CorruptedContext(String),

    /// The string is not a valid hexadecimal identifier.
    #[error("malformed id {0:?}")]
    MalformedId(String),
}

impl Error {
    #[must_use]
    pub(crate) fn malformed_id(id: &str) -> Self {
        Self::MalformedId(id.to_string())
    }

    /// Whether the error means "no upstream trace" rather than an actual failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContextNotFound)
    }
}
