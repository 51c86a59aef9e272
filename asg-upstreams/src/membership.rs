//! Turns the raw membership of an inventory group into the endpoints that
//! should receive traffic.

use std::collections::HashMap;

use anyhow::Context as _;

use crate::{split, Endpoint, InventoryGroup, InventoryProvider, ResolveError};

/// Resolves the members of one [`InventoryGroup`], optionally keeping only
/// the instances the provider reports as in service.
pub struct MembershipResolver<P> {
    provider: P,
    group: InventoryGroup,
    lifecycle_filter: bool,
}

impl<P: InventoryProvider + Send + Sync> MembershipResolver<P> {
    pub fn new(provider: P, group: InventoryGroup, lifecycle_filter: bool) -> Self {
        Self {
            provider,
            group,
            lifecycle_filter,
        }
    }

    /// The group this resolver enumerates.
    pub fn group(&self) -> &InventoryGroup {
        &self.group
    }

    /// Whether members are filtered on their lifecycle state.
    pub fn lifecycle_filter(&self) -> bool {
        self.lifecycle_filter
    }

    /// Enumerate the group and, when lifecycle filtering is enabled, drop
    /// every member that is not in service.
    ///
    /// Lifecycle lookups are issued in batches of at most
    /// [`InventoryProvider::max_batch_size`] ids. If any batch fails the whole
    /// resolution fails: a partially filtered list is never returned.
    #[tracing::instrument(level = "debug", skip(self), fields(group = %self.group))]
    pub async fn resolve(&self) -> Result<Vec<Endpoint>, ResolveError> {
        let members = self
            .provider
            .list_members(&self.group)
            .await
            .context("failed to list inventory group members")
            .map_err(ResolveError::Provider)?;

        if members.is_empty() {
            return Err(ResolveError::EmptyGroup {
                group: self.group.identifier().to_string(),
            });
        }

        tracing::debug!(members = members.len(), "listed inventory group members");

        if !self.lifecycle_filter {
            return Ok(members.into_iter().collect());
        }

        let instance_ids = members
            .iter()
            .map(|endpoint| endpoint.instance_id().to_string());

        let mut states = HashMap::with_capacity(members.len());
        for batch in split(instance_ids, self.provider.max_batch_size()) {
            let batch_states = self
                .provider
                .lifecycle_states(&batch)
                .await
                .with_context(|| {
                    format!("failed to describe lifecycle state of {} instances", batch.len())
                })
                .map_err(ResolveError::Provider)?;

            tracing::debug!(
                requested = batch.len(),
                described = batch_states.len(),
                "described instance lifecycle states"
            );
            states.extend(batch_states);
        }

        let in_service: Vec<Endpoint> = members
            .into_iter()
            .filter(|endpoint| match states.get(endpoint.instance_id()) {
                Some(status) if status.is_in_service() => true,
                Some(status) => {
                    tracing::debug!(
                        instance_id = endpoint.instance_id(),
                        %status,
                        "skipping instance that is not in service"
                    );
                    false
                }
                None => {
                    tracing::warn!(
                        instance_id = endpoint.instance_id(),
                        "provider reported no lifecycle state, skipping instance"
                    );
                    false
                }
            })
            .collect();

        tracing::debug!(in_service = in_service.len(), "filtered members by lifecycle state");

        if in_service.is_empty() {
            return Err(ResolveError::NoneInService {
                group: self.group.identifier().to_string(),
            });
        }

        Ok(in_service)
    }
}
