// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration.

use crate::error::Result;
use crate::topic::{AddressBuilder, Identity};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client name (for logs and transport endpoint naming).
    #[serde(default = "default_name")]
    pub name: String,

    /// Routing prefix segments placed before the application id.
    #[serde(default = "default_prefix")]
    pub prefix: Vec<String>,

    /// Application id shared by all clients of one deployment.
    #[serde(default = "default_application_id")]
    pub application_id: String,

    /// Group part of this client's identity.
    pub group_id: String,

    /// Client part of this client's identity.
    pub client_id: String,

    /// Timeout used by `send_request_default` (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Log level for binaries embedding the client.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Callback executor settings.
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_name() -> String {
    "labmesh-client".to_string()
}

fn default_prefix() -> Vec<String> {
    vec!["labmesh".to_string()]
}

fn default_application_id() -> String {
    "default".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Configuration with defaults for everything but the identity.
    pub fn new(group_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            prefix: default_prefix(),
            application_id: default_application_id(),
            group_id: group_id.into(),
            client_id: client_id.into(),
            default_timeout_ms: default_timeout_ms(),
            log_level: default_log_level(),
            executor: ExecutorConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the client name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set routing prefix and application id.
    #[must_use]
    pub fn routing<I, S>(mut self, prefix: I, application_id: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix = prefix.into_iter().map(Into::into).collect();
        self.application_id = application_id.into();
        self
    }

    /// Set the default request timeout.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set executor settings.
    #[must_use]
    pub fn executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.group_id.is_empty() || self.client_id.is_empty() {
            return Err(ConfigError::Invalid("group_id and client_id must be set".into()));
        }
        Identity::new(self.group_id.as_str(), self.client_id.as_str())
            .map_err(|e| ConfigError::Invalid(format!("identity: {}", e)))?;
        AddressBuilder::new(self.prefix.iter().map(String::as_str), self.application_id.as_str())
            .map_err(|e| ConfigError::Invalid(format!("routing: {}", e)))?;
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid("default_timeout_ms must be positive".into()));
        }
        self.executor.validate()
    }

    /// This client's identity.
    pub fn identity(&self) -> Result<Identity> {
        Identity::new(self.group_id.as_str(), self.client_id.as_str())
    }

    /// Address builder for this client's routing prefix.
    pub fn address_builder(&self) -> Result<AddressBuilder> {
        AddressBuilder::new(self.prefix.iter().map(String::as_str), self.application_id.as_str())
    }

    #[must_use]
    pub fn default_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Callback executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Fixed worker count. Absent means an elastic pool.
    #[serde(default)]
    pub pool_size: Option<usize>,

    /// Ceiling of the elastic pool.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Idle time after which an elastic worker retires (milliseconds).
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,

    /// Time granted to drain queued work on shutdown (milliseconds).
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Extra time granted after cancelling queued work (milliseconds).
    #[serde(default = "default_force_grace_ms")]
    pub force_grace_ms: u64,
}

fn default_max_threads() -> usize {
    64
}

fn default_keep_alive_ms() -> u64 {
    30_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_force_grace_ms() -> u64 {
    1_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            max_threads: default_max_threads(),
            keep_alive_ms: default_keep_alive_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            force_grace_ms: default_force_grace_ms(),
        }
    }
}

impl ExecutorConfig {
    /// Fixed-size pool.
    #[must_use]
    pub fn fixed(pool_size: usize) -> Self {
        Self {
            pool_size: Some(pool_size),
            ..Default::default()
        }
    }

    /// Elastic pool with the given ceiling and keep-alive.
    #[must_use]
    pub fn elastic(max_threads: usize, keep_alive: Duration) -> Self {
        Self {
            pool_size: None,
            max_threads,
            keep_alive_ms: keep_alive.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Set both shutdown grace periods.
    #[must_use]
    pub fn grace(mut self, shutdown: Duration, force: Duration) -> Self {
        self.shutdown_grace_ms = shutdown.as_millis() as u64;
        self.force_grace_ms = force.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.pool_size == Some(0) {
            return Err(ConfigError::Invalid("executor.pool_size must be positive".into()));
        }
        if self.pool_size.is_none() && self.max_threads == 0 {
            return Err(ConfigError::Invalid("executor.max_threads must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    #[must_use]
    pub fn force_grace(&self) -> Duration {
        Duration::from_millis(self.force_grace_ms)
    }
}
