//! Error types returned while configuring a [`Resolver`](crate::Resolver) and
//! while resolving its upstreams.

use std::sync::Arc;
use std::time::Duration;

/// Rejected configuration. Returned once, when the resolver is built, and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `provider` named a backend this crate does not know about.
    #[error("invalid provider: {0:?}")]
    UnknownProvider(String),
    /// The inventory group identifier was empty.
    #[error("empty inventory group identifier")]
    EmptyGroupIdentifier,
    /// The backend is known but was not compiled in.
    #[error("provider {0:?} is not available, enable the `{0}` cargo feature")]
    ProviderUnavailable(String),
    /// The configuration document could not be parsed.
    #[error("failed to parse resolver configuration")]
    Parse(#[source] serde_json::Error),
}

impl From<std::convert::Infallible> for ConfigError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Error returned while building a [`Resolver`](crate::Resolver).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Precaching was requested and the first refresh failed.
    #[error("failed to precache upstreams")]
    Precache(#[source] Error),
}

/// A failed attempt at turning an inventory group into endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The group exists but has no members.
    #[error("inventory group {group:?} has no members")]
    EmptyGroup { group: String },
    /// Lifecycle filtering left no member of the group in service.
    #[error("no member of inventory group {group:?} is in service")]
    NoneInService { group: String },
    /// The inventory provider failed (transport, auth or backend error).
    #[error("inventory provider request failed")]
    Provider(#[source] anyhow::Error),
    /// The refresh did not finish within its deadline.
    #[error("refresh did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl ResolveError {
    /// `true` for the failures that come from the provider rather than from the group itself.
    pub fn is_provider_error(&self) -> bool {
        !self.is_nothing_to_serve()
    }

    /// `true` when the group was resolved but yielded no upstreams.
    ///
    /// Served in place of any older snapshot so callers fall back to their own upstreams.
    pub fn is_nothing_to_serve(&self) -> bool {
        matches!(
            self,
            ResolveError::EmptyGroup { .. } | ResolveError::NoneInService { .. }
        )
    }
}

/// Error returned by [`Resolver::get_upstreams`](crate::Resolver::get_upstreams) and
/// [`EndpointCache::read`](crate::EndpointCache::read).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No refresh has completed yet, so there is nothing to serve.
    #[error("upstreams have not been resolved yet")]
    NotReady,
    /// There is no usable snapshot and the last refresh failed with this error.
    #[error(transparent)]
    Resolve(Arc<ResolveError>),
}

impl From<ResolveError> for Error {
    fn from(err: ResolveError) -> Self {
        Error::Resolve(Arc::new(err))
    }
}

impl Error {
    /// Borrow the underlying [`ResolveError`], if there is one.
    pub fn resolve_error(&self) -> Option<&ResolveError> {
        match self {
            Error::NotReady => None,
            Error::Resolve(err) => Some(err),
        }
    }
}
