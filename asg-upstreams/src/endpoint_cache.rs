//! A TTL-bounded cache of resolved upstreams with stale-while-revalidate reads.
//!
//! Readers only ever load an [`Arc`] out of an [`ArcSwap`], so a slow provider
//! never blocks them. At most one refresh runs at a time: the reader that
//! flips `refresh_in_flight` from `false` to `true` spawns it, everybody else
//! keeps serving whatever snapshot is current.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::time::{Duration, Instant};
use tracing_futures::Instrument;

use crate::{DialTarget, Endpoint, Error, InventoryProvider, MembershipResolver, ResolveError, RetryPolicy};

/// Expiry used when `now + ttl` is not representable, about 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The dial targets of one successful refresh.
pub type Upstreams = Arc<[DialTarget]>;

/// A complete result of one successful refresh.
#[derive(Debug)]
pub struct Snapshot {
    targets: Upstreams,
    refreshed_at: Instant,
    expires_at: Instant,
}

impl Snapshot {
    pub fn targets(&self) -> &Upstreams {
        &self.targets
    }

    pub fn refreshed_at(&self) -> Instant {
        self.refreshed_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// What [`EndpointCache::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This call resolved the group and stored a new snapshot.
    Refreshed,
    /// Another refresh was already running, so this call did nothing.
    AlreadyInFlight,
}

/// Where the cache is in its `Empty -> Fresh -> Stale -> Fresh` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No refresh has succeeded yet.
    Empty,
    /// The snapshot is within its TTL.
    Fresh,
    /// The snapshot outlived its TTL and is served until a refresh replaces it.
    Stale,
}

/// Point-in-time view of an [`EndpointCache`], for health endpoints and logs.
#[derive(Debug, Clone)]
pub struct CacheStatus {
    pub state: CacheState,
    pub refresh_in_flight: bool,
    pub upstreams: usize,
    pub expires_at: Option<Instant>,
    pub last_error: Option<Arc<ResolveError>>,
    pub refreshes: u64,
    pub failed_refreshes: u64,
}

/// Snapshot and last failure are swapped together so readers see a consistent pair.
#[derive(Debug, Default)]
struct CacheEntry {
    snapshot: Option<Arc<Snapshot>>,
    last_failure: Option<Arc<ResolveError>>,
}

struct Shared<P> {
    resolver: MembershipResolver<P>,
    port: u16,
    ttl: Duration,
    retry: RetryPolicy,
    entry: ArcSwap<CacheEntry>,
    refresh_in_flight: AtomicBool,
    refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
}

/// Holds the last resolved upstreams of one inventory group.
///
/// Cloning is cheap; clones share the same snapshot and single-flight state.
pub struct EndpointCache<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for EndpointCache<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Clears the single-flight flag when a refresh ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: InventoryProvider + Send + Sync + 'static> EndpointCache<P> {
    /// Create an empty cache that resolves through `resolver` and builds dial
    /// targets on `port`. Snapshots live for `ttl`, which is also the deadline
    /// of every refresh.
    pub fn new(resolver: MembershipResolver<P>, port: u16, ttl: Duration, retry: RetryPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                resolver,
                port,
                ttl,
                retry,
                entry: ArcSwap::from_pointee(CacheEntry::default()),
                refresh_in_flight: AtomicBool::new(false),
                refreshes: AtomicU64::new(0),
                failed_refreshes: AtomicU64::new(0),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// The current snapshot, fresh or stale, without triggering a refresh.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.entry.load().snapshot.clone()
    }

    /// Return the current upstreams without waiting on the provider.
    ///
    /// When the cache is empty or stale a background refresh is started,
    /// unless one is already running. Errors:
    /// - [`Error::Resolve`] with [`ResolveError::EmptyGroup`] or
    ///   [`ResolveError::NoneInService`] while the latest refresh found nothing
    ///   to serve, even if an older snapshot exists;
    /// - [`Error::Resolve`] with the last failure if nothing was ever resolved;
    /// - [`Error::NotReady`] if nothing was ever resolved and no refresh has finished.
    pub fn read(&self) -> Result<Upstreams, Error> {
        let entry = self.shared.entry.load_full();

        let needs_refresh = match &entry.snapshot {
            Some(snapshot) => snapshot.is_stale(Instant::now()),
            None => true,
        };
        if needs_refresh {
            self.spawn_refresh();
        }

        if let Some(failure) = &entry.last_failure {
            if failure.is_nothing_to_serve() {
                return Err(Error::Resolve(Arc::clone(failure)));
            }
        }

        match (&entry.snapshot, &entry.last_failure) {
            (Some(snapshot), _) => Ok(Arc::clone(&snapshot.targets)),
            (None, Some(failure)) => Err(Error::Resolve(Arc::clone(failure))),
            (None, None) => Err(Error::NotReady),
        }
    }

    /// Refresh now and wait for the outcome.
    ///
    /// Returns [`RefreshOutcome::AlreadyInFlight`] straight away if another
    /// refresh is running. On failure the current snapshot is kept and the
    /// error is returned.
    pub async fn refresh(&self) -> Result<RefreshOutcome, Error> {
        match InFlight::acquire(&self.shared.refresh_in_flight) {
            Some(_guard) => {
                self.shared.refresh().await.map_err(Error::Resolve)?;
                Ok(RefreshOutcome::Refreshed)
            }
            None => {
                tracing::debug!("refresh already in flight");
                Ok(RefreshOutcome::AlreadyInFlight)
            }
        }
    }

    /// Populate the cache before it serves any read.
    pub async fn precache(&self) -> Result<(), Error> {
        tracing::debug!(group = %self.shared.resolver.group(), "precaching upstreams");
        self.refresh().await.map(|_| ())
    }

    pub fn status(&self) -> CacheStatus {
        let entry = self.shared.entry.load();
        let state = match &entry.snapshot {
            None => CacheState::Empty,
            Some(snapshot) if snapshot.is_stale(Instant::now()) => CacheState::Stale,
            Some(_) => CacheState::Fresh,
        };

        CacheStatus {
            state,
            refresh_in_flight: self.shared.refresh_in_flight.load(Ordering::Acquire),
            upstreams: entry.snapshot.as_ref().map_or(0, |s| s.targets.len()),
            expires_at: entry.snapshot.as_ref().map(|s| s.expires_at),
            last_error: entry.last_failure.clone(),
            refreshes: self.shared.refreshes.load(Ordering::Relaxed),
            failed_refreshes: self.shared.failed_refreshes.load(Ordering::Relaxed),
        }
    }

    fn spawn_refresh(&self) {
        if self.shared.refresh_in_flight.load(Ordering::Acquire) {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("no tokio runtime available, cannot refresh upstreams");
                return;
            }
        };

        // The spawned task takes over the flag and clears it through its own guard.
        if self
            .shared
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let span = tracing::debug_span!("background_refresh", group = %shared.resolver.group());
        runtime.spawn(
            async move {
                let _guard = InFlight(&shared.refresh_in_flight);
                // Already logged and recorded.
                let _ = shared.refresh().await;
            }
            .instrument(span),
        );
    }
}

impl<P: InventoryProvider + Send + Sync> Shared<P> {
    /// Callers must hold the single-flight flag.
    async fn refresh(&self) -> Result<(), Arc<ResolveError>> {
        let started = Instant::now();
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        let outcome = match tokio::time::timeout(self.ttl, self.resolve_with_retry()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ResolveError::DeadlineExceeded(self.ttl)),
        };

        let current = self.entry.load_full();

        match outcome {
            Ok(endpoints) => {
                let mut targets: Vec<DialTarget> = endpoints
                    .iter()
                    .map(|endpoint| endpoint.dial_target(self.port))
                    .collect();
                targets.sort();
                targets.dedup();

                let now = Instant::now();
                let snapshot = Snapshot {
                    targets: Arc::from(targets),
                    refreshed_at: now,
                    expires_at: expiry(now, self.ttl),
                };
                tracing::debug!(
                    upstreams = snapshot.targets.len(),
                    elapsed = ?started.elapsed(),
                    "refreshed upstreams"
                );

                self.entry.store(Arc::new(CacheEntry {
                    snapshot: Some(Arc::new(snapshot)),
                    last_failure: None,
                }));
                Ok(())
            }
            Err(err) => {
                self.failed_refreshes.fetch_add(1, Ordering::Relaxed);

                match (&err, &current.snapshot) {
                    (ResolveError::EmptyGroup { .. }, _) => {
                        tracing::warn!(error = ?err, "inventory group has no members")
                    }
                    (ResolveError::NoneInService { .. }, _) => {
                        tracing::warn!(error = ?err, "no inventory group member is in service")
                    }
                    (_, Some(_)) => {
                        tracing::warn!(error = ?err, "failed to refresh upstreams, serving stale snapshot")
                    }
                    (_, None) => tracing::error!(error = ?err, "failed to resolve upstreams"),
                }

                let err = Arc::new(err);
                self.entry.store(Arc::new(CacheEntry {
                    snapshot: current.snapshot.clone(),
                    last_failure: Some(Arc::clone(&err)),
                }));
                Err(err)
            }
        }
    }

    async fn resolve_with_retry(&self) -> Result<Vec<Endpoint>, ResolveError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;

        loop {
            match self.resolver.resolve().await {
                Ok(endpoints) => return Ok(endpoints),
                Err(err) if err.is_provider_error() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, ?backoff, error = ?err, "resolution failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(self.retry.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
