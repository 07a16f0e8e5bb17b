// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration Module
//!
//! ## Configuration Priority
//!
//! Sources are applied in the order they are added to the [`ConfigBuilder`],
//! later sources override earlier ones:
//!
//! 1. **Defaults** - Hard-coded defaults in the code
//! 2. **Environment variables** - `INSTANA_*` environment variables
//!
//! ## Supported Variables
//!
//! | Variable | Field | Notes |
//! |----------|-------|-------|
//! | `INSTANA_LOG_LEVEL` | `log_level` | case-insensitive, defaults to `warn` |
//! | `INSTANA_DISABLE_W3C_TRACE_CORRELATION` | `disable_w3c_trace_correlation` | any non-empty value disables correlation |
//!
//! The resulting [`Config`] is immutable and is passed explicitly to the code
//! that needs it, e.g. span context derivation.

pub mod env;
pub mod log_level;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::{env::EnvConfigSource, log_level::LogLevel};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    ParseError(String),
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("Failed to load config: {e}");
                failed_sources += 1;
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        self.config
    }
}

/// Tracer settings relevant to context propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub log_level: LogLevel,
    /// Do not continue W3C trace IDs. Incoming `traceparent` values are only
    /// used to find the Instana entry in `tracestate`.
    pub disable_w3c_trace_correlation: bool,
}

/// Loads the configuration from defaults and `INSTANA_*` environment variables.
#[must_use]
pub fn get_config() -> Config {
    ConfigBuilder::default()
        .add_source(Box::new(EnvConfigSource))
        .build()
}

/// Treats any non-empty value as `true`, whatever it says.
pub fn deserialize_presence_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Option::deserialize(deserializer)?;

    Ok(match opt {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(!s.trim().is_empty()),
        Some(_) => Some(true),
    })
}
