//! Provides the builder and implementation of [`Resolver`], the entry point a
//! load balancer calls to get its upstreams.

use std::future::{ready, Ready};
use std::task::{Context, Poll};

use tokio::time::Duration;
use tower_service::Service;

use crate::{
    BuildError, CacheStatus, ConfigError, EndpointCache, Error, InventoryGroup, InventoryProvider,
    MembershipResolver, ProviderCredentials, ProviderKind, ResolverConfig, RetryPolicy, Upstreams,
    DEFAULT_TTL,
};

/// Serves the members of an inventory group as dial targets, refreshing them
/// in the background as they go stale.
///
/// ```rust
/// use asg_upstreams::{Endpoint, InventoryGroup, InventoryProvider, LifecycleStatus, Resolver};
/// use std::collections::{HashMap, HashSet};
///
/// struct StaticInventory;
///
/// #[async_trait::async_trait]
/// impl InventoryProvider for StaticInventory {
///     async fn list_members(
///         &self,
///         _group: &InventoryGroup,
///     ) -> Result<HashSet<Endpoint>, anyhow::Error> {
///         Ok([Endpoint::new("i-0a1b", "10.0.1.17")].into_iter().collect())
///     }
///
///     async fn lifecycle_states(
///         &self,
///         instance_ids: &[String],
///     ) -> Result<HashMap<String, LifecycleStatus>, anyhow::Error> {
///         Ok(instance_ids
///             .iter()
///             .map(|id| (id.clone(), LifecycleStatus::InService))
///             .collect())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let resolver = Resolver::builder("web-asg", 8080)
///         .inventory(StaticInventory)
///         .precache(true)
///         .build()
///         .await
///         .expect("failed to build Resolver");
///
///     let request = http::Request::new(());
///     let upstreams = resolver.get_upstreams(&request).unwrap();
///     assert_eq!(upstreams[0].as_str(), "10.0.1.17:8080");
/// }
/// ```
pub struct Resolver<P> {
    cache: EndpointCache<P>,
}

impl<P> Clone for Resolver<P> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl Resolver<()> {
    /// Start configuring a `Resolver` for the members of `group`, dialed on `port`.
    pub fn builder<G>(group: G, port: u16) -> ResolverBuilder<(), G>
    where
        G: TryInto<InventoryGroup>,
        G::Error: Into<ConfigError>,
    {
        ResolverBuilder::new(group, port)
    }
}

impl<P: InventoryProvider + Send + Sync + 'static> Resolver<P> {
    /// Return the current upstreams as `host:port` dial targets.
    ///
    /// Never waits on the inventory provider; see [`EndpointCache::read`].
    pub fn get_upstreams<B>(&self, _request: &http::Request<B>) -> Result<Upstreams, Error> {
        self.cache.read()
    }

    /// The cache backing this resolver.
    pub fn cache(&self) -> &EndpointCache<P> {
        &self.cache
    }

    pub fn status(&self) -> CacheStatus {
        self.cache.status()
    }
}

impl<P, B> Service<http::Request<B>> for Resolver<P>
where
    P: InventoryProvider + Send + Sync + 'static,
{
    type Response = Upstreams;
    type Error = Error;
    type Future = Ready<Result<Upstreams, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        ready(self.get_upstreams(&request))
    }
}

/// Builder to configure and create a [`Resolver`].
pub struct ResolverBuilder<T, G> {
    group: G,
    port: u16,
    provider: ProviderKind,
    credentials: ProviderCredentials,
    ttl: Option<Duration>,
    lifecycle_filter: bool,
    precache: bool,
    retry: RetryPolicy,
    inventory: T,
}

impl<G> ResolverBuilder<(), G>
where
    G: TryInto<InventoryGroup>,
    G::Error: Into<ConfigError>,
{
    /// Set the group to resolve and the port its members are dialed on.
    pub fn new(group: G, port: u16) -> ResolverBuilder<(), G> {
        Self {
            group,
            port,
            provider: ProviderKind::Aws,
            credentials: ProviderCredentials::default(),
            ttl: None,
            lifecycle_filter: false,
            precache: false,
            retry: RetryPolicy::default(),
            inventory: (),
        }
    }

    /// Set the [`InventoryProvider`] the resolver queries.
    pub fn inventory<T: InventoryProvider + Send + Sync + 'static>(
        self,
        inventory: T,
    ) -> ResolverBuilder<T, G> {
        ResolverBuilder {
            inventory,
            group: self.group,
            port: self.port,
            provider: self.provider,
            credentials: self.credentials,
            ttl: self.ttl,
            lifecycle_filter: self.lifecycle_filter,
            precache: self.precache,
            retry: self.retry,
        }
    }

    /// Use the built-in backend named by the builder's provider
    /// (see [`from_config`](ResolverBuilder::from_config)).
    #[cfg(feature = "aws")]
    pub async fn default_inventory(self) -> ResolverBuilder<crate::AwsInventory, G> {
        let inventory = match self.provider {
            ProviderKind::Aws => crate::AwsInventory::from_credentials(&self.credentials).await,
        };
        self.inventory(inventory)
    }
}

impl ResolverBuilder<(), InventoryGroup> {
    /// Validate `config` and carry all of its settings over to a builder.
    ///
    /// Fails with a [`ConfigError`] for an unknown provider or an empty group identifier.
    pub fn from_config(config: &ResolverConfig) -> Result<Self, ConfigError> {
        let (provider, group) = config.validate()?;

        Ok(Self {
            provider,
            credentials: config.aws.clone(),
            ttl: Some(config.ttl()),
            lifecycle_filter: config.lifecycle_filter_enabled,
            precache: config.precache,
            retry: config.retry.clone(),
            ..Self::new(group, config.port)
        })
    }
}

impl<T, G> ResolverBuilder<T, G>
where
    G: TryInto<InventoryGroup>,
    G::Error: Into<ConfigError>,
{
    /// Set how long resolved upstreams are served before they are refreshed.
    /// This is also the deadline of every refresh.
    ///
    /// Default is 5 seconds. A zero TTL is replaced by the default.
    pub fn ttl(self, ttl: Duration) -> ResolverBuilder<T, G> {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }

    /// Keep only the members whose lifecycle state is `InService`.
    ///
    /// Costs one extra provider call per batch of instances on every refresh.
    pub fn lifecycle_filter(self, enabled: bool) -> ResolverBuilder<T, G> {
        Self {
            lifecycle_filter: enabled,
            ..self
        }
    }

    /// Resolve once before [`build`](ResolverBuilder::build) returns, so that the
    /// first read is never [`Error::NotReady`]. If that resolution fails, so does `build`.
    pub fn precache(self, precache: bool) -> ResolverBuilder<T, G> {
        Self { precache, ..self }
    }

    /// Set the [`RetryPolicy`] applied within each refresh.
    pub fn retry_policy(self, retry: RetryPolicy) -> ResolverBuilder<T, G> {
        Self { retry, ..self }
    }

    /// Set the region and profile hints passed to the built-in backend.
    pub fn credentials(self, credentials: ProviderCredentials) -> ResolverBuilder<T, G> {
        Self {
            credentials,
            ..self
        }
    }
}

impl<T, G> ResolverBuilder<T, G>
where
    T: InventoryProvider + Send + Sync + 'static,
    G: TryInto<InventoryGroup>,
    G::Error: Into<ConfigError>,
{
    /// Construct a [`Resolver`] from the [`ResolverBuilder`] instance.
    pub async fn build(self) -> Result<Resolver<T>, BuildError> {
        let group: InventoryGroup = self.group.try_into().map_err(Into::<ConfigError>::into)?;
        let ttl = match self.ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => DEFAULT_TTL,
        };

        tracing::debug!(
            group = %group,
            provider = self.provider.name(),
            port = self.port,
            ?ttl,
            lifecycle_filter = self.lifecycle_filter,
            "building resolver"
        );

        let resolver = MembershipResolver::new(self.inventory, group, self.lifecycle_filter);
        let cache = EndpointCache::new(resolver, self.port, ttl, self.retry);

        if self.precache {
            cache.precache().await.map_err(BuildError::Precache)?;
        }

        Ok(Resolver { cache })
    }
}

#[cfg(feature = "aws")]
impl Resolver<crate::AwsInventory> {
    /// Build a resolver backed by AWS from `config`.
    pub async fn from_config(config: &ResolverConfig) -> Result<Self, BuildError> {
        ResolverBuilder::from_config(config)?
            .default_inventory()
            .await
            .build()
            .await
    }
}

const _: () = {
    const fn assert_is_send<T: Send + Sync>() {}
    assert_is_send::<ResolverBuilder<(), InventoryGroup>>();
    assert_is_send::<Resolver<()>>();
};
