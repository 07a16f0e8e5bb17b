// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Carrier traits for trace context propagation.
//!
//! Carriers provide an abstraction for reading from and writing to different
//! transport mechanisms (HTTP headers, message metadata, etc.) used to
//! propagate trace context across service boundaries.
//!
//! # Capabilities
//!
//! A [`Carrier`] exposes up to three capabilities, each of them optional:
//! - **read** ([`Extractor`]): required by extraction and injection
//! - **write** ([`Injector`]): required by injection
//! - **header map**: direct access to an [`http::HeaderMap`], used to delete
//!   stale headers and to read and write the W3C trace context
//!
//! # Carrier Types
//!
//! - **`HashMap`**: text map, read and write
//! - **`&HashMap`**: read-only view of a text map
//! - **`serde_json::Value`**: JSON message metadata, writable only when it is an object
//! - **`http::HeaderMap`**: HTTP headers, read, write and header map access
//!
//! # Case Handling
//!
//! Lookups through [`Extractor::get`] are case-insensitive. Keys are stored
//! exactly as written, so the casing already used by a carrier can be
//! discovered and kept. `http::HeaderMap` lowercases every key on its own.

use std::collections::HashMap;
use std::hash::BuildHasher;

use http::{header::HeaderName, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

/// Trait for injecting trace context into a carrier.
pub trait Injector {
    /// Sets a key-value pair in the carrier, keeping the key as given.
    fn set(&mut self, key: &str, value: String);
}

/// Trait for extracting trace context from a carrier.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use instana_propagation::propagation::carrier::Extractor;
///
/// let headers = HashMap::from([("X-Instana-T".to_string(), "1a".to_string())]);
///
/// assert_eq!(Extractor::get(&headers, "x-instana-t"), Some("1a"));
/// assert_eq!(Extractor::keys(&headers), vec!["X-Instana-T"]);
/// ```
pub trait Extractor {
    /// Gets a value from the carrier by key (case-insensitive).
    ///
    /// An exact match wins over a match differing only in case.
    fn get(&self, key: &str) -> Option<&str>;

    /// Gets all keys present in the carrier, as stored.
    fn keys(&self) -> Vec<&str>;
}

/// A value that trace context can be extracted from and/or injected into.
pub trait Carrier {
    /// Read access, `None` if the carrier cannot be read.
    fn reader(&self) -> Option<&dyn Extractor>;

    /// Write access, `None` if the carrier is read-only.
    fn writer(&mut self) -> Option<&mut dyn Injector>;

    /// The underlying HTTP header map, if the carrier is backed by one.
    fn headers(&self) -> Option<&HeaderMap> {
        None
    }

    fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        None
    }
}

impl<S: BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

impl<S: BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = HashMap::get(self, key) {
            return Some(value.as_str());
        }

        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        HashMap::keys(self).map(String::as_str).collect::<Vec<_>>()
    }
}

impl<S: BuildHasher> Carrier for HashMap<String, String, S> {
    fn reader(&self) -> Option<&dyn Extractor> {
        Some(self)
    }

    fn writer(&mut self) -> Option<&mut dyn Injector> {
        Some(self)
    }
}

impl<S: BuildHasher> Carrier for &HashMap<String, String, S> {
    fn reader(&self) -> Option<&dyn Extractor> {
        Some(*self)
    }

    fn writer(&mut self) -> Option<&mut dyn Injector> {
        None
    }
}

/// Only works with `Value::Object` variants. Non-object values are silently ignored.
impl Injector for Value {
    fn set(&mut self, key: &str, value: String) {
        if let Value::Object(map) = self {
            map.insert(key.to_string(), Value::String(value));
        }
    }
}

/// Only string values of `Value::Object` variants are visible.
impl Extractor for Value {
    fn get(&self, key: &str) -> Option<&str> {
        let Value::Object(map) = self else {
            return None;
        };

        map.get(key)
            .or_else(|| {
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .and_then(Value::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        if let Value::Object(map) = self {
            map.keys().map(String::as_str).collect::<Vec<_>>()
        } else {
            Vec::new()
        }
    }
}

impl Carrier for Value {
    fn reader(&self) -> Option<&dyn Extractor> {
        Some(self)
    }

    fn writer(&mut self) -> Option<&mut dyn Injector> {
        if self.is_object() {
            Some(self)
        } else {
            None
        }
    }
}

/// Replaces every value of the header. Invalid names or values are skipped.
impl Injector for HeaderMap {
    fn set(&mut self, key: &str, value: String) {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                debug!("Skipping invalid header name {key:?}: {e}");
                return;
            }
        };

        match HeaderValue::try_from(value) {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(e) => debug!("Skipping invalid value of header {key:?}: {e}"),
        }
    }
}

/// Returns the first value of a header. Non-ASCII values are ignored.
impl Extractor for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key)?.to_str().ok()
    }

    fn keys(&self) -> Vec<&str> {
        HeaderMap::keys(self)
            .map(HeaderName::as_str)
            .collect::<Vec<_>>()
    }
}

impl Carrier for HeaderMap {
    fn reader(&self) -> Option<&dyn Extractor> {
        Some(self)
    }

    fn writer(&mut self) -> Option<&mut dyn Injector> {
        Some(self)
    }

    fn headers(&self) -> Option<&HeaderMap> {
        Some(self)
    }

    fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        Some(self)
    }
}
