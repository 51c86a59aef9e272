use asg_upstreams::{
    CacheState, DialTarget, Error, RefreshOutcome, ResolveError, Resolver, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tests::fake_inventory::FakeInventory;

fn request() -> http::Request<()> {
    http::Request::new(())
}

#[tokio::test(start_paused = true)]
async fn fresh_snapshot_is_served_without_calling_the_provider() {
    // Steps:
    //  1. Precache a resolver with a TTL of 5 seconds.
    //  2. Read at t=0 and t=4.
    // What we want to test:
    //  Both reads see the very same snapshot and the provider is called once.
    let inventory = FakeInventory::with_instances(3);
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .ttl(Duration::from_secs(5))
        .precache(true)
        .build()
        .await
        .expect("failed to build resolver");

    let first = resolver.get_upstreams(&request()).unwrap();
    tokio::time::advance(Duration::from_secs(4)).await;
    let second = resolver.get_upstreams(&request()).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.len(), 3);
    assert_eq!(inventory.list_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stale_reads_start_a_single_refresh() {
    // Steps:
    //  1. Precache a resolver, then let the snapshot go stale.
    //  2. Slow the provider down.
    //  3. Fire 50 concurrent reads.
    // What we want to test:
    //  Exactly one refresh runs and none of the reads waits for it.
    let ttl = Duration::from_secs(1);
    let latency = Duration::from_millis(300);
    let inventory = FakeInventory::with_instances(2);
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .ttl(ttl)
        .precache(true)
        .build()
        .await
        .expect("failed to build resolver");
    let before = resolver.get_upstreams(&request()).unwrap();

    inventory.set_list_latency(latency);
    tokio::time::sleep(ttl + Duration::from_millis(50)).await;
    assert_eq!(resolver.status().state, CacheState::Stale);

    let barrier = Arc::new(tokio::sync::Barrier::new(50));
    let readers: Vec<_> = (0..50)
        .map(|_| {
            let resolver = resolver.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                let started = std::time::Instant::now();
                let upstreams = resolver.get_upstreams(&request());
                (upstreams, started.elapsed())
            })
        })
        .collect();

    for reader in readers {
        let (upstreams, elapsed) = reader.await.expect("reader panicked");
        assert!(Arc::ptr_eq(&upstreams.unwrap(), &before));
        assert!(elapsed < latency, "read waited {:?} on the refresh", elapsed);
    }

    tokio::time::sleep(latency * 2).await;

    assert_eq!(inventory.list_calls(), 2);
    let status = resolver.status();
    assert_eq!(status.refreshes, 2);
    assert_eq!(status.state, CacheState::Fresh);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_serving_the_old_snapshot() {
    let inventory = FakeInventory::with_instances(1);
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .retry_policy(RetryPolicy::none())
        .precache(true)
        .build()
        .await
        .expect("failed to build resolver");
    let snapshot = resolver.cache().snapshot().unwrap();

    inventory.fail_listing(true);
    tokio::time::advance(Duration::from_secs(5)).await;

    // Kicks off the background refresh, which fails.
    let stale = resolver.get_upstreams(&request()).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(inventory.list_calls(), 2);
    let after = resolver.cache().snapshot().unwrap();
    assert!(Arc::ptr_eq(&snapshot, &after));
    assert_eq!(snapshot.expires_at(), after.expires_at());
    assert_eq!(
        resolver.get_upstreams(&request()).unwrap(),
        stale,
    );
    assert!(matches!(
        resolver.status().last_error.as_deref(),
        Some(ResolveError::Provider(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_is_retried_on_the_next_read() {
    let inventory = FakeInventory::with_instances(1);
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .retry_policy(RetryPolicy::none())
        .precache(true)
        .build()
        .await
        .expect("failed to build resolver");

    inventory.fail_listing(true);
    tokio::time::advance(Duration::from_secs(5)).await;
    resolver.get_upstreams(&request()).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(inventory.list_calls(), 2);

    inventory.fail_listing(false);
    inventory.add_instance("i-new", "10.9.9.9", "InService");
    resolver.get_upstreams(&request()).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(inventory.list_calls(), 3);
    let upstreams = resolver.get_upstreams(&request()).unwrap();
    assert!(upstreams.contains(&DialTarget::new("10.9.9.9", 8080)));
    assert_eq!(resolver.status().state, CacheState::Fresh);
    assert!(resolver.status().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn refresh_slower_than_the_ttl_is_abandoned() {
    let inventory = FakeInventory::with_instances(1);
    inventory.set_list_latency(Duration::from_secs(10));
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .ttl(Duration::from_secs(5))
        .build()
        .await
        .expect("failed to build resolver");

    let err = resolver.cache().refresh().await.unwrap_err();

    assert!(matches!(
        err.resolve_error(),
        Some(ResolveError::DeadlineExceeded(ttl)) if *ttl == Duration::from_secs(5)
    ));
    assert!(!resolver.status().refresh_in_flight);
}

#[tokio::test(start_paused = true)]
async fn empty_cache_reports_the_refresh_failure() {
    let inventory = FakeInventory::with_instances(1);
    inventory.fail_listing(true);
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .retry_policy(RetryPolicy::none())
        .build()
        .await
        .expect("failed to build resolver");

    assert!(matches!(
        resolver.get_upstreams(&request()),
        Err(Error::NotReady)
    ));
    tokio::time::sleep(Duration::from_millis(1)).await;

    let err = resolver.get_upstreams(&request()).unwrap_err();
    assert!(matches!(
        err.resolve_error(),
        Some(ResolveError::Provider(_))
    ));
    assert_eq!(resolver.status().state, CacheState::Empty);
}

#[tokio::test(start_paused = true)]
async fn huge_ttl_background_refresh_fills_the_cache() {
    let inventory = FakeInventory::with_instances(1);
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .ttl(Duration::MAX)
        .build()
        .await
        .expect("failed to build resolver");

    assert!(matches!(
        resolver.get_upstreams(&request()),
        Err(Error::NotReady)
    ));
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(resolver.get_upstreams(&request()).unwrap().len(), 1);
    assert_eq!(resolver.status().state, CacheState::Fresh);
    assert!(!resolver.status().refresh_in_flight);
}

#[tokio::test(start_paused = true)]
async fn refresh_while_another_is_in_flight_is_skipped() {
    let inventory = FakeInventory::with_instances(1);
    inventory.set_list_latency(Duration::from_secs(1));
    let resolver = Resolver::builder("web", 8080)
        .inventory(inventory.clone())
        .build()
        .await
        .expect("failed to build resolver");

    let (first, second) = tokio::join!(resolver.cache().refresh(), resolver.cache().refresh());

    assert_eq!(first.unwrap(), RefreshOutcome::Refreshed);
    assert_eq!(second.unwrap(), RefreshOutcome::AlreadyInFlight);
    assert_eq!(inventory.list_calls(), 1);
}
