//! Declarative configuration for a [`Resolver`](crate::Resolver).
//!
//! ```
//! let config = asg_upstreams::ResolverConfig::from_json(r#"{
//!     "provider": "aws",
//!     "group_identifier": "web-asg",
//!     "port": 8080,
//!     "lifecycle_filter_enabled": true,
//!     "aws": { "region": "eu-west-1" }
//! }"#).unwrap();
//!
//! assert_eq!(config.ttl(), std::time::Duration::from_secs(5));
//! assert!(config.validate().is_ok());
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::{ConfigError, InventoryGroup};

/// TTL applied when none, or zero, is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// The inventory backends a [`ResolverConfig`] may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// EC2 + Auto Scaling.
    Aws,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "aws" => Ok(ProviderKind::Aws),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Hints forwarded verbatim to the provider's SDK.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    pub region: Option<String>,
    pub profile: Option<String>,
}

/// Bounded retries around a single refresh.
///
/// Only provider failures are retried; an empty group is reported as is.
/// Every attempt, and every backoff, counts against the refresh deadline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    #[serde(rename = "initial_backoff_ms", deserialize_with = "duration_from_millis")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", deserialize_with = "duration_from_millis")]
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }
}

fn duration_from_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Everything needed to build a [`Resolver`](crate::Resolver).
///
/// The option names of earlier releases (`asg_name`, `cache_interval_seconds`,
/// `with_in_service`, `aws_config`) are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Name of the inventory backend. Only `"aws"` is supported.
    pub provider: String,
    /// The group whose members become upstreams.
    #[serde(alias = "asg_name")]
    pub group_identifier: String,
    /// Port appended to every member address.
    pub port: u16,
    /// How long a resolved list is served before it is refreshed. Zero means [`DEFAULT_TTL`].
    #[serde(alias = "cache_interval_seconds")]
    pub ttl_seconds: u64,
    /// Keep only members whose lifecycle state is `InService`.
    #[serde(alias = "with_in_service")]
    pub lifecycle_filter_enabled: bool,
    /// Resolve once, synchronously, while building the resolver.
    pub precache: bool,
    #[serde(alias = "aws_config")]
    pub aws: ProviderCredentials,
    pub retry: RetryPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Aws.name().to_string(),
            group_identifier: String::new(),
            port: 0,
            ttl_seconds: DEFAULT_TTL.as_secs(),
            lifecycle_filter_enabled: false,
            precache: false,
            aws: ProviderCredentials::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ResolverConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(ConfigError::Parse)
    }

    /// The configured TTL, with zero replaced by [`DEFAULT_TTL`].
    pub fn ttl(&self) -> Duration {
        match self.ttl_seconds {
            0 => DEFAULT_TTL,
            seconds => Duration::from_secs(seconds),
        }
    }

    /// Check the provider name and the group identifier.
    pub fn validate(&self) -> Result<(ProviderKind, InventoryGroup), ConfigError> {
        let provider = self.provider.parse::<ProviderKind>()?;
        let group = InventoryGroup::new(&self.group_identifier)?;
        Ok((provider, group))
    }
}
