use async_trait::async_trait;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::credentials::ServicePrincipal;

pub const CONTAINER_SERVICE_PROVIDER: &str = "Microsoft.ContainerService";
pub const MANAGED_CLUSTER_RESOURCE_TYPE: &str = "managedClusters";

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupName(pub String);

#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterName(pub String);

macro_rules! display_newtype {
    ($($ty:ident),*) => {
        $(impl Display for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_newtype!(SubscriptionId, ResourceGroupName, ClusterName);

#[derive(Debug, Error)]
#[error("unrecognised {kind} '{value}'")]
pub struct ParseTagError {
    kind: &'static str,
    value: String,
}

/// Orchestrator a container service runs, spelled the way ARM reports it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum OrchestratorType {
    Kubernetes,
    Dcos,
    Swarm,
    DockerCe,
    Custom,
}

impl OrchestratorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorType::Kubernetes => "Kubernetes",
            OrchestratorType::Dcos => "DCOS",
            OrchestratorType::Swarm => "Swarm",
            OrchestratorType::DockerCe => "DockerCE",
            OrchestratorType::Custom => "Custom",
        }
    }
}

impl Display for OrchestratorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrchestratorType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            OrchestratorType::Kubernetes,
            OrchestratorType::Dcos,
            OrchestratorType::Swarm,
            OrchestratorType::DockerCe,
            OrchestratorType::Custom,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| ParseTagError {
            kind: "orchestrator type",
            value: s.to_string(),
        })
    }
}

/// Which flavour of cluster a step targets. `Aks` is the managed variant.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ClusterVariant {
    Acs,
    Aks,
}

impl ClusterVariant {
    pub fn is_managed(&self) -> bool {
        matches!(self, ClusterVariant::Aks)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterVariant::Acs => "ACS",
            ClusterVariant::Aks => "AKS",
        }
    }
}

impl Display for ClusterVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterVariant {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACS" => Ok(ClusterVariant::Acs),
            "AKS" => Ok(ClusterVariant::Aks),
            _ => Err(ParseTagError {
                kind: "cluster variant",
                value: s.to_string(),
            }),
        }
    }
}

// Tags read from files accept the same spellings as the command line.
macro_rules! serde_tag {
    ($($ty:ident),*) => {
        $(impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        })*
    };
}

serde_tag!(OrchestratorType, ClusterVariant);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerService {
    pub orchestrator_type: OrchestratorType,
    pub master_fqdn: String,
    pub admin_username: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenericResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Builds an ARM resource id:
/// `/subscriptions/{s}/resourceGroups/{rg}/providers/{provider}/{parent}/{type}/{name}`.
pub fn construct_resource_id(
    subscription: &SubscriptionId,
    resource_group: &ResourceGroupName,
    provider: &str,
    resource_type: &str,
    resource_name: &str,
    parent_path: &str,
) -> String {
    let parent = parent_path.trim_matches('/');
    let mut id = format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}",
        subscription, resource_group, provider
    );
    if !parent.is_empty() {
        id.push('/');
        id.push_str(parent);
    }
    id.push('/');
    id.push_str(resource_type);
    id.push('/');
    id.push_str(resource_name);
    id
}

#[async_trait]
pub trait AzureClient {
    fn subscription_id(&self) -> &SubscriptionId;

    /// `Ok(None)` when the resource group has no container service by that name.
    async fn container_service(
        &self,
        resource_group: &ResourceGroupName,
        name: &ClusterName,
    ) -> anyhow::Result<Option<ContainerService>>;

    async fn generic_resource(&self, id: &str) -> anyhow::Result<GenericResource>;
}

pub type SharedAzureClient = Arc<dyn AzureClient + Send + Sync + 'static>;

/// Exchanges a service principal for a live control-plane client.
#[async_trait]
pub trait ClientFactory {
    async fn connect(&self, principal: &ServicePrincipal) -> anyhow::Result<SharedAzureClient>;
}

pub type SharedClientFactory = Arc<dyn ClientFactory + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_profile_id_nests_under_managed_cluster() {
        let id = construct_resource_id(
            &SubscriptionId("sub".into()),
            &ResourceGroupName("rg".into()),
            CONTAINER_SERVICE_PROVIDER,
            "accessProfiles",
            "clusterAdmin",
            "managedClusters/demo",
        );
        assert_eq!(
            id,
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ContainerService\
             /managedClusters/demo/accessProfiles/clusterAdmin"
        );
    }

    #[test]
    fn empty_parent_path_is_skipped() {
        let id = construct_resource_id(
            &SubscriptionId("sub".into()),
            &ResourceGroupName("rg".into()),
            CONTAINER_SERVICE_PROVIDER,
            "containerServices",
            "acs",
            "",
        );
        assert_eq!(
            id,
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.ContainerService/containerServices/acs"
        );
    }

    #[test]
    fn tags_parse_case_insensitively() {
        assert_eq!("aks".parse::<ClusterVariant>().unwrap(), ClusterVariant::Aks);
        assert_eq!(
            "dcos".parse::<OrchestratorType>().unwrap(),
            OrchestratorType::Dcos
        );
        assert_eq!(
            "DockerCE".parse::<OrchestratorType>().unwrap(),
            OrchestratorType::DockerCe
        );
        assert!("nomad".parse::<OrchestratorType>().is_err());
        assert!("gke".parse::<ClusterVariant>().is_err());
    }
}
