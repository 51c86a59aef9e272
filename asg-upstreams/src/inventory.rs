//! Defines the interface that [`Resolver`](crate::Resolver) requires in order
//! to discover the members of an inventory group, and the values it exchanges with it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;

use crate::InventoryGroup;

/// Number of instance ids a single lifecycle lookup may carry unless the
/// provider says otherwise. Auto Scaling's `DescribeAutoScalingInstances` caps at 10.
pub const DEFAULT_MAX_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(size) => size,
    None => panic!("batch size must be non-zero"),
};

/// Interface to a cloud inventory that knows which instances belong to a
/// group and what lifecycle state each of them is in.
#[async_trait::async_trait]
pub trait InventoryProvider {
    /// Largest number of instance ids [`lifecycle_states`](Self::lifecycle_states)
    /// accepts in one call.
    fn max_batch_size(&self) -> NonZeroUsize {
        DEFAULT_MAX_BATCH_SIZE
    }

    /// Return every instance currently registered in `group`.
    ///
    /// An empty set is not an error at this level; callers report it as
    /// [`ResolveError::EmptyGroup`](crate::ResolveError::EmptyGroup).
    async fn list_members(&self, group: &InventoryGroup)
        -> Result<HashSet<Endpoint>, anyhow::Error>;

    /// Look up the lifecycle state of each instance in `instance_ids`.
    ///
    /// Never called with more than [`max_batch_size`](Self::max_batch_size) ids.
    /// Instances unknown to the provider are simply absent from the result.
    async fn lifecycle_states(
        &self,
        instance_ids: &[String],
    ) -> Result<HashMap<String, LifecycleStatus>, anyhow::Error>;
}

/// A member of an inventory group.
///
/// Two endpoints are equal when their `instance_id`s are equal.
#[derive(Debug, Clone)]
pub struct Endpoint {
    instance_id: String,
    address: String,
}

impl Endpoint {
    pub fn new(instance_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            address: address.into(),
        }
    }

    /// The provider's identifier for this instance.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The private network address of this instance.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Build the dial target for this endpoint on `port`.
    pub fn dial_target(&self, port: u16) -> DialTarget {
        DialTarget::new(&self.address, port)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.instance_id == other.instance_id
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instance_id.hash(state);
    }
}

/// Lifecycle state reported by the provider for a group member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// The instance is serving traffic.
    InService,
    /// Any other state (`Pending`, `Terminating`, `Standby`, ...), kept verbatim.
    Other(String),
}

impl LifecycleStatus {
    pub fn is_in_service(&self) -> bool {
        matches!(self, LifecycleStatus::InService)
    }
}

impl From<&str> for LifecycleStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "InService" => LifecycleStatus::InService,
            other => LifecycleStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStatus::InService => f.write_str("InService"),
            LifecycleStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// The `host:port` string a load balancer dials to reach an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialTarget(String);

impl DialTarget {
    /// Join `address` and `port`. IP literals go through [`SocketAddr`] so that
    /// IPv6 addresses come out bracketed.
    pub fn new(address: &str, port: u16) -> Self {
        match address.parse::<IpAddr>() {
            Ok(ip) => DialTarget(SocketAddr::new(ip, port).to_string()),
            Err(_) => DialTarget(format!("{}:{}", address, port)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DialTarget {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<DialTarget> for String {
    fn from(target: DialTarget) -> Self {
        target.0
    }
}
