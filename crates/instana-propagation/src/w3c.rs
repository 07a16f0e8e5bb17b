// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! W3C Trace Context values (`traceparent` and `tracestate`).
//!
//! This module exposes the small part of the W3C Trace Context format that the
//! span context needs: a raw header pair that can be checked for presence,
//! parsed into a [`Parent`] and a vendor [`State`] list, modified and written back.
//!
//! # Header Format Examples
//!
//! ```text
//! traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
//! tracestate: in=1a;63,congo=t61rcWkgMzE
//! ```
//!
//! The Instana vendor entry (`in=<trace id>;<span id>`) embeds the native
//! identifiers of the last Instana-instrumented service that handled the request.

use std::fmt;

use http::{header::HeaderName, HeaderMap, HeaderValue};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// HTTP header key for W3C traceparent (version-traceId-parentId-flags).
pub const TRACEPARENT_KEY: &str = "traceparent";

/// HTTP header key for W3C tracestate (vendor-specific state).
pub const TRACESTATE_KEY: &str = "tracestate";

/// Vendor key of the Instana entry in `tracestate`.
pub const VENDOR_INSTANA: &str = "in";

/// Highest traceparent version produced by this implementation.
pub const VERSION_MAX: u8 = 0;

/// Maximum number of list members allowed in `tracestate`.
const MAX_STATE_ENTRIES: usize = 32;

const FLAG_SAMPLED: u8 = 0x01;

lazy_static! {
    /// Format: `version-traceId-parentId-flags[-optional]`
    static ref TRACEPARENT_REGEX: Regex =
        Regex::new(r"(?i)^([a-f0-9]{2})-([a-f0-9]{32})-([a-f0-9]{16})-([a-f0-9]{2})(-.*)?$")
            .expect("failed creating regex");

    static ref INVALID_SEGMENT_REGEX: Regex = Regex::new(r"^0+$").expect("failed creating regex");
}

/// Error while reading W3C trace context headers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("traceparent header not found")]
    MissingTraceparent,

    #[error("malformed traceparent {0:?}")]
    MalformedTraceparent(String),

    #[error("unsupported traceparent version {0:?}")]
    UnsupportedVersion(String),
}

/// Trace flags of the `traceparent` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Whether the caller may have recorded trace data.
    pub sampled: bool,
}

impl Flags {
    fn from_byte(flags: u8) -> Self {
        Self {
            sampled: flags & FLAG_SAMPLED != 0,
        }
    }

    fn as_byte(self) -> u8 {
        if self.sampled {
            FLAG_SAMPLED
        } else {
            0
        }
    }
}

/// Parsed `traceparent` header.
///
/// IDs are kept as the hex strings found on the wire, so that a value read
/// from a header can be written back without loss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parent {
    pub version: u8,
    pub trace_id: String,
    pub parent_id: String,
    pub flags: Flags,
}

impl Parent {
    /// Parses a `traceparent` header value.
    ///
    /// # Errors
    ///
    /// Returns an error for version `ff`, malformed or all-zero IDs, and for
    /// version `00` values carrying extra fields. Higher versions are parsed
    /// leniently and their extra fields are dropped.
    pub fn parse(traceparent: &str) -> Result<Self, Error> {
        let traceparent = traceparent.trim();
        let captures = TRACEPARENT_REGEX
            .captures(traceparent)
            .ok_or_else(|| Error::MalformedTraceparent(traceparent.to_string()))?;

        let version = &captures[1];
        let tail = captures.get(5).map_or("", |m| m.as_str());
        match version {
            "ff" | "FF" => return Err(Error::UnsupportedVersion(version.to_string())),
            "00" if !tail.is_empty() => {
                return Err(Error::MalformedTraceparent(traceparent.to_string()));
            }
            _ => {}
        }

        let trace_id = &captures[2];
        let parent_id = &captures[3];
        if INVALID_SEGMENT_REGEX.is_match(trace_id) || INVALID_SEGMENT_REGEX.is_match(parent_id) {
            return Err(Error::MalformedTraceparent(traceparent.to_string()));
        }

        let malformed = |_| Error::MalformedTraceparent(traceparent.to_string());
        let version = u8::from_str_radix(version, 16).map_err(malformed)?;
        let flags = u8::from_str_radix(&captures[4], 16).map_err(malformed)?;

        Ok(Self {
            version,
            trace_id: trace_id.to_lowercase(),
            parent_id: parent_id.to_lowercase(),
            flags: Flags::from_byte(flags),
        })
    }
}

/// Formats the header value. IDs are left-padded with zeros to their full
/// width, and the version is capped at [`VERSION_MAX`].
impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{:0>32}-{:0>16}-{:02x}",
            self.version.min(VERSION_MAX),
            self.trace_id,
            self.parent_id,
            self.flags.as_byte()
        )
    }
}

/// Ordered list of vendor entries from the `tracestate` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    entries: Vec<(String, String)>,
}

impl State {
    /// Parses a (possibly comma-joined) `tracestate` value. Invalid members are skipped.
    #[must_use]
    pub fn parse(tracestate: &str) -> Self {
        let entries = tracestate
            .split(',')
            .map(str::trim)
            .filter_map(|member| {
                let (vendor, data) = member.split_once('=')?;
                let vendor = vendor.trim();
                if vendor.is_empty() {
                    debug!("Skipping tracestate member without a key: {member:?}");
                    return None;
                }
                Some((vendor.to_string(), data.trim().to_string()))
            })
            .take(MAX_STATE_ENTRIES)
            .collect();

        Self { entries }
    }

    /// Returns the data stored for the vendor, if any.
    #[must_use]
    pub fn fetch(&self, vendor: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(v, _)| v == vendor)
            .map(|(_, data)| data.as_str())
    }

    /// Returns a new state with the vendor entry moved to the front and set to `data`.
    ///
    /// Other entries keep their relative order; the list is truncated to the
    /// maximum number of members allowed by the W3C specification.
    #[must_use]
    pub fn add(&self, vendor: &str, data: &str) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.push((vendor.to_string(), data.to_string()));
        entries.extend(self.entries.iter().filter(|(v, _)| v != vendor).cloned());
        entries.truncate(MAX_STATE_ENTRIES);

        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (vendor, data)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{vendor}={data}")?;
        }
        Ok(())
    }
}

/// Raw W3C trace context as received or about to be sent.
///
/// The zero value (both headers empty) means that no W3C context is associated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub raw_parent: String,
    pub raw_state: String,
}

impl Context {
    /// Creates a context with the given parent and an empty vendor state.
    #[must_use]
    pub fn new(parent: &Parent) -> Self {
        Self {
            raw_parent: parent.to_string(),
            raw_state: String::new(),
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.raw_parent.is_empty() && self.raw_state.is_empty()
    }

    /// Parses the `traceparent` part. Returns an empty [`Parent`] if it is malformed.
    #[must_use]
    pub fn parent(&self) -> Parent {
        Parent::parse(&self.raw_parent).unwrap_or_default()
    }

    #[must_use]
    pub fn state(&self) -> State {
        State::parse(&self.raw_state)
    }
}

/// Reads the W3C trace context from HTTP headers.
///
/// Several `tracestate` headers are joined into a single list as required by
/// the W3C specification.
///
/// # Errors
///
/// Fails if `traceparent` is missing or invalid.
pub fn extract(headers: &HeaderMap) -> Result<Context, Error> {
    let traceparent = headers
        .get(TRACEPARENT_KEY)
        .ok_or(Error::MissingTraceparent)?
        .to_str()
        .map_err(|_| Error::MalformedTraceparent(String::from("<non-ascii>")))?
        .trim();

    Parent::parse(traceparent)?;

    let raw_state = headers
        .get_all(TRACESTATE_KEY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(",");

    Ok(Context {
        raw_parent: traceparent.to_string(),
        raw_state,
    })
}

/// Writes the W3C trace context into HTTP headers, replacing any existing values.
pub fn inject(context: &Context, headers: &mut HeaderMap) {
    let traceparent = HeaderName::from_static(TRACEPARENT_KEY);
    let tracestate = HeaderName::from_static(TRACESTATE_KEY);

    headers.remove(&traceparent);
    headers.remove(&tracestate);

    match HeaderValue::from_str(&context.raw_parent) {
        Ok(value) => {
            headers.insert(traceparent, value);
        }
        Err(e) => {
            debug!("Skipping invalid traceparent {:?}: {e}", context.raw_parent);
            return;
        }
    }

    if context.raw_state.is_empty() {
        return;
    }

    match HeaderValue::from_str(&context.raw_state) {
        Ok(value) => {
            headers.insert(tracestate, value);
        }
        Err(e) => debug!("Skipping invalid tracestate {:?}: {e}", context.raw_state),
    }
}
