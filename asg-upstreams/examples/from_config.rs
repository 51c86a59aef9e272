use anyhow::Context;

use asg_upstreams::{Resolver, ResolverConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setting `precache` resolves the group once before the resolver is returned,
    // so the first request never sees `Error::NotReady`.
    let config = ResolverConfig::from_json(
        r#"{
            "provider": "aws",
            "group_identifier": "web-asg",
            "port": 8080,
            "ttl_seconds": 10,
            "lifecycle_filter_enabled": true,
            "precache": true,
            "aws": { "region": "eu-west-1" }
        }"#,
    )?;

    let resolver = Resolver::from_config(&config)
        .await
        .context("failed to build Resolver")?;

    let upstreams = resolver.get_upstreams(&http::Request::new(()))?;

    println!("UPSTREAMS={:?}", upstreams);

    Ok(())
}
