//! Implements [`InventoryProvider`] for AWS Auto Scaling groups.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use aws_sdk_autoscaling::Client as AutoScalingClient;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client as Ec2Client;

use crate::{Endpoint, InventoryGroup, InventoryProvider, LifecycleStatus, ProviderCredentials};

/// EC2 tag that Auto Scaling puts on every instance it launches.
const GROUP_NAME_TAG_FILTER: &str = "tag:aws:autoscaling:groupName";

/// Implements [`InventoryProvider`] on top of EC2 and Auto Scaling.
///
/// Members are found with `DescribeInstances`, filtered on the group's name
/// tag, and their lifecycle state with `DescribeAutoScalingInstances`.
pub struct AwsInventory {
    ec2: Ec2Client,
    autoscaling: AutoScalingClient,
}

impl AwsInventory {
    /// Construct a new [`AwsInventory`] from the default AWS credential chain,
    /// overriding region and profile when `credentials` sets them.
    pub async fn from_credentials(credentials: &ProviderCredentials) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &credentials.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(profile) = &credentials.profile {
            loader = loader.profile_name(profile);
        }

        let config = loader.load().await;

        Self::from_clients(Ec2Client::new(&config), AutoScalingClient::new(&config))
    }

    /// Use already configured SDK clients.
    pub fn from_clients(ec2: Ec2Client, autoscaling: AutoScalingClient) -> Self {
        Self { ec2, autoscaling }
    }
}

#[async_trait::async_trait]
impl InventoryProvider for AwsInventory {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_members(
        &self,
        group: &InventoryGroup,
    ) -> Result<HashSet<Endpoint>, anyhow::Error> {
        let filter = Filter::builder()
            .name(GROUP_NAME_TAG_FILTER)
            .values(group.identifier())
            .build();

        let mut members = HashSet::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .ec2
                .describe_instances()
                .filters(filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .context("DescribeInstances failed")?;

            for instance in output
                .reservations()
                .iter()
                .flat_map(|reservation| reservation.instances())
            {
                match (instance.instance_id(), instance.private_ip_address()) {
                    (Some(instance_id), Some(address)) => {
                        members.insert(Endpoint::new(instance_id, address));
                    }
                    (instance_id, _) => {
                        tracing::debug!(?instance_id, "skipping instance without a private address")
                    }
                }
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        tracing::debug!(members = members.len(), "described group instances");

        Ok(members)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(instances = instance_ids.len()))]
    async fn lifecycle_states(
        &self,
        instance_ids: &[String],
    ) -> Result<HashMap<String, LifecycleStatus>, anyhow::Error> {
        let output = self
            .autoscaling
            .describe_auto_scaling_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("DescribeAutoScalingInstances failed")?;

        Ok(output
            .auto_scaling_instances()
            .iter()
            .map(|details| {
                (
                    details.instance_id().to_string(),
                    LifecycleStatus::from(details.lifecycle_state()),
                )
            })
            .collect())
    }
}
