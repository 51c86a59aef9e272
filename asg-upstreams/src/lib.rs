//! `asg-upstreams` turns the live members of a cloud autoscaling group into
//! `host:port` upstreams for a load balancer, and keeps them fresh without
//! putting the cloud API on the request path.
//!
//! # Simple example
//!
//! ```rust
//! use asg_upstreams::{Endpoint, InventoryGroup, InventoryProvider, LifecycleStatus, Resolver};
//! use std::collections::{HashMap, HashSet};
//!
//! // Always reports the same two instances.
//! struct StaticInventory;
//!
//! #[async_trait::async_trait]
//! impl InventoryProvider for StaticInventory {
//!     async fn list_members(
//!         &self,
//!         _group: &InventoryGroup,
//!     ) -> Result<HashSet<Endpoint>, anyhow::Error> {
//!         Ok([
//!             Endpoint::new("i-0a1b", "10.0.1.17"),
//!             Endpoint::new("i-0c2d", "10.0.2.23"),
//!         ]
//!         .into_iter()
//!         .collect())
//!     }
//!
//!     async fn lifecycle_states(
//!         &self,
//!         instance_ids: &[String],
//!     ) -> Result<HashMap<String, LifecycleStatus>, anyhow::Error> {
//!         Ok(instance_ids
//!             .iter()
//!             .map(|id| (id.clone(), LifecycleStatus::InService))
//!             .collect())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = Resolver::builder("web-asg", 8080)
//!         .inventory(StaticInventory)
//!         .precache(true)
//!         .build()
//!         .await
//!         .expect("failed to build Resolver");
//!
//!     let upstreams = resolver.get_upstreams(&http::Request::new(())).unwrap();
//!     assert_eq!(upstreams.len(), 2);
//! }
//! ```
//!
//! Only members the provider reports as `InService` can be kept, at the
//! cost of one extra call per ten instances on every refresh.
//!
//! ```rust,no_run
//! # use asg_upstreams::{Endpoint, InventoryGroup, InventoryProvider, LifecycleStatus};
//! # use std::collections::{HashMap, HashSet};
//! # struct StaticInventory;
//! # #[async_trait::async_trait]
//! # impl InventoryProvider for StaticInventory {
//! #     async fn list_members(&self, _: &InventoryGroup) -> Result<HashSet<Endpoint>, anyhow::Error> {
//! #         Ok(HashSet::new())
//! #     }
//! #     async fn lifecycle_states(&self, _: &[String]) -> Result<HashMap<String, LifecycleStatus>, anyhow::Error> {
//! #         Ok(HashMap::new())
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() {
//!     use asg_upstreams::Resolver;
//!     use std::time::Duration;
//!
//!     let resolver = Resolver::builder("web-asg", 8080)
//!         .inventory(StaticInventory)
//!         .lifecycle_filter(true)
//!         .ttl(Duration::from_secs(30))
//!         .build()
//!         .await
//!         .expect("failed to build Resolver");
//! }
//! ```
//!
//! With the `aws` feature enabled a resolver can be built straight from its
//! configuration, using EC2 and Auto Scaling as the inventory.
//!
//! ```rust,ignore
//! let config = asg_upstreams::ResolverConfig::from_json(r#"{
//!     "provider": "aws",
//!     "group_identifier": "web-asg",
//!     "port": 8080,
//!     "precache": true
//! }"#)?;
//!
//! let resolver = asg_upstreams::Resolver::from_config(&config).await?;
//! ```
//!
//! # Internals
//! Reads go through an [`EndpointCache`]. A read never waits on the provider:
//! it returns the current snapshot, even a stale one, and if the snapshot is
//! stale it spawns a single background refresh. A refresh that fails leaves
//! the snapshot untouched, so the next read tries again.

mod batch;
mod config;
mod endpoint_cache;
mod error;
mod group;
mod inventory;
mod membership;
mod resolver;

#[cfg(feature = "aws")]
mod aws;

#[cfg(feature = "aws")]
pub use aws::*;
pub use batch::*;
pub use config::*;
pub use endpoint_cache::*;
pub use error::*;
pub use group::*;
pub use inventory::*;
pub use membership::*;
pub use resolver::*;
