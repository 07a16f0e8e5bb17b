// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment variable configuration source (`INSTANA_*`).

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::config::{
    deserialize_presence_flag, log_level::LogLevel, Config, ConfigError, ConfigSource,
};

const ENV_PREFIX: &str = "INSTANA_";

/// Subset of `INSTANA_*` variables understood by this crate, keyed without the prefix.
#[derive(Debug, PartialEq, Deserialize, Clone, Copy, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
    pub log_level: Option<LogLevel>,
    #[serde(deserialize_with = "deserialize_presence_flag")]
    pub disable_w3c_trace_correlation: Option<bool>,
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    if let Some(log_level) = env_config.log_level {
        config.log_level = log_level;
    }
    if let Some(disabled) = env_config.disable_w3c_trace_correlation {
        config.disable_w3c_trace_correlation = disabled;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed(ENV_PREFIX));

        let env_config = figment.extract::<EnvConfig>().map_err(|e| {
            ConfigError::ParseError(format!(
                "Failed to parse config from environment variables: {e}, using default config."
            ))
        })?;
        merge_config(config, &env_config);

        Ok(())
    }
}
