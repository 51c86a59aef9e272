use std::collections::{HashMap, HashSet};
use std::time::Duration;

use asg_upstreams::{Endpoint, InventoryGroup, InventoryProvider, LifecycleStatus, Resolver};

/// Pretends to be an autoscaling group of three instances, one still booting.
struct StaticInventory;

#[async_trait::async_trait]
impl InventoryProvider for StaticInventory {
    async fn list_members(
        &self,
        _group: &InventoryGroup,
    ) -> Result<HashSet<Endpoint>, anyhow::Error> {
        Ok([
            Endpoint::new("i-0a1b", "10.0.1.17"),
            Endpoint::new("i-0c2d", "10.0.2.23"),
            Endpoint::new("i-0e3f", "10.0.3.31"),
        ]
        .into_iter()
        .collect())
    }

    async fn lifecycle_states(
        &self,
        instance_ids: &[String],
    ) -> Result<HashMap<String, LifecycleStatus>, anyhow::Error> {
        Ok(instance_ids
            .iter()
            .map(|id| match id.as_str() {
                "i-0e3f" => (id.clone(), LifecycleStatus::from("Pending")),
                _ => (id.clone(), LifecycleStatus::InService),
            })
            .collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let resolver = Resolver::builder("web-asg", 8080)
        .inventory(StaticInventory)
        .lifecycle_filter(true)
        .ttl(Duration::from_secs(5))
        .precache(true)
        .build()
        .await?;

    let upstreams = resolver.get_upstreams(&http::Request::new(()))?;

    for upstream in upstreams.iter() {
        println!("UPSTREAM={}", upstream);
    }

    Ok(())
}
