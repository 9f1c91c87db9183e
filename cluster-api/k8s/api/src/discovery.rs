//! Resolves the CAPI group's preferred version and which resource kinds it serves.

use crate::capi::{Machine, MachineDeployment, MachinePool, MachineSet};
use kube::api::ApiResource;
use tracing::info;

/// The subset of the API server's discovery endpoint the provider needs.
#[async_trait::async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// The preferred version of `group`, or `None` if the group is not served.
    async fn preferred_version(&self, group: &str) -> Result<Option<String>, kube::Error>;

    /// `(plural, kind)` for every resource served at `group_version`.
    async fn resources(&self, group_version: &str) -> Result<Vec<(String, String)>, kube::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to find API group {0:?}")]
    GroupNotFound(String),

    #[error("required resource {resource:?} not found in {group_version}")]
    MissingResource {
        resource: &'static str,
        group_version: String,
    },

    #[error("discovery failed: {0}")]
    Client(#[from] kube::Error),
}

/// The resolved group/version/resource tuples for every CAPI kind the provider reads.
#[derive(Clone, Debug, PartialEq)]
pub struct CapiResources {
    pub group: String,
    pub version: String,
    pub machines: ApiResource,
    pub machine_sets: ApiResource,
    pub machine_deployments: Option<ApiResource>,
    pub machine_pools: Option<ApiResource>,
}

const MACHINES: &str = "machines";
const MACHINE_SETS: &str = "machinesets";
const MACHINE_DEPLOYMENTS: &str = "machinedeployments";
const MACHINE_POOLS: &str = "machinepools";

// === impl CapiResources ===

impl CapiResources {
    /// Discovers the preferred version of `group` and probes each CAPI resource within it.
    ///
    /// Machines and MachineSets are required. MachineDeployments and MachinePools are optional;
    /// when absent the corresponding informers and node groups are disabled.
    pub async fn discover<D>(client: &D, group: &str) -> Result<Self, DiscoveryError>
    where
        D: DiscoveryClient + ?Sized,
    {
        let version = client
            .preferred_version(group)
            .await?
            .ok_or_else(|| DiscoveryError::GroupNotFound(group.to_string()))?;
        let group_version = format!("{group}/{version}");
        let served = client.resources(&group_version).await?;

        let find = |plural: &'static str, kind: &'static str| {
            served
                .iter()
                .find(|(name, _)| name == plural)
                .map(|_| ApiResource {
                    group: group.to_string(),
                    version: version.clone(),
                    api_version: group_version.clone(),
                    kind: kind.to_string(),
                    plural: plural.to_string(),
                })
        };
        let require = |plural: &'static str, kind: &'static str| {
            find(plural, kind).ok_or_else(|| DiscoveryError::MissingResource {
                resource: plural,
                group_version: group_version.clone(),
            })
        };

        let machine_sets = require(MACHINE_SETS, MachineSet::KIND)?;
        let machines = require(MACHINES, Machine::KIND)?;
        let machine_deployments = find(MACHINE_DEPLOYMENTS, MachineDeployment::KIND);
        if machine_deployments.is_none() {
            info!(%group_version, "MachineDeployments are not served; they will not be autoscaled");
        }
        let machine_pools = find(MACHINE_POOLS, MachinePool::KIND);
        if machine_pools.is_none() {
            info!(%group_version, "MachinePools are not served; they will not be autoscaled");
        }

        Ok(Self {
            group: group.to_string(),
            version,
            machines,
            machine_sets,
            machine_deployments,
            machine_pools,
        })
    }

    pub fn group_version(&self) -> &str {
        &self.machines.api_version
    }
}

// === impl kube::Client ===

#[async_trait::async_trait]
impl DiscoveryClient for kube::Client {
    async fn preferred_version(&self, group: &str) -> Result<Option<String>, kube::Error> {
        let groups = self.list_api_groups().await?;
        Ok(groups
            .groups
            .into_iter()
            .find(|g| g.name == group)
            .and_then(|g| {
                g.preferred_version
                    .or_else(|| g.versions.into_iter().next())
                    .map(|v| v.version)
            }))
    }

    async fn resources(&self, group_version: &str) -> Result<Vec<(String, String)>, kube::Error> {
        let list = self.list_api_group_resources(group_version).await?;
        Ok(list
            .resources
            .into_iter()
            .map(|r| (r.name, r.kind))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDiscovery {
        groups: HashMap<String, String>,
        resources: HashMap<String, Vec<(String, String)>>,
    }

    impl FakeDiscovery {
        fn serve(mut self, group: &str, version: &str, plurals: &[(&str, &str)]) -> Self {
            self.groups.insert(group.to_string(), version.to_string());
            self.resources.insert(
                format!("{group}/{version}"),
                plurals
                    .iter()
                    .map(|(p, k)| (p.to_string(), k.to_string()))
                    .collect(),
            );
            self
        }
    }

    #[async_trait::async_trait]
    impl DiscoveryClient for FakeDiscovery {
        async fn preferred_version(&self, group: &str) -> Result<Option<String>, kube::Error> {
            Ok(self.groups.get(group).cloned())
        }

        async fn resources(
            &self,
            group_version: &str,
        ) -> Result<Vec<(String, String)>, kube::Error> {
            Ok(self.resources.get(group_version).cloned().unwrap_or_default())
        }
    }

    const ALL: &[(&str, &str)] = &[
        ("machines", "Machine"),
        ("machinesets", "MachineSet"),
        ("machinesets/scale", "Scale"),
        ("machinedeployments", "MachineDeployment"),
        ("machinedeployments/scale", "Scale"),
        ("machinepools", "MachinePool"),
    ];

    #[tokio::test]
    async fn discovers_all_resources() {
        let client = FakeDiscovery::default().serve("cluster.x-k8s.io", "v1beta1", ALL);
        let resources = CapiResources::discover(&client, "cluster.x-k8s.io")
            .await
            .expect("discovery must succeed");
        assert_eq!(resources.version, "v1beta1");
        assert_eq!(resources.group_version(), "cluster.x-k8s.io/v1beta1");
        assert_eq!(resources.machine_sets.plural, "machinesets");
        assert_eq!(resources.machine_sets.kind, "MachineSet");
        assert_eq!(
            resources.machine_deployments.map(|ar| ar.plural),
            Some("machinedeployments".to_string())
        );
        assert!(resources.machine_pools.is_some());
    }

    #[tokio::test]
    async fn honors_group_override() {
        let client = FakeDiscovery::default()
            .serve("cluster.x-k8s.io", "v1beta1", ALL)
            .serve("capi.example.com", "v1alpha4", &ALL[..3]);
        let resources = CapiResources::discover(&client, "capi.example.com")
            .await
            .expect("discovery must succeed");
        assert_eq!(resources.group_version(), "capi.example.com/v1alpha4");
        assert_eq!(resources.machine_deployments, None);
        assert_eq!(resources.machine_pools, None);
    }

    #[tokio::test]
    async fn missing_group_is_fatal() {
        let client = FakeDiscovery::default();
        assert!(matches!(
            CapiResources::discover(&client, "cluster.x-k8s.io").await,
            Err(DiscoveryError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_required_resource_is_fatal() {
        let client = FakeDiscovery::default().serve(
            "cluster.x-k8s.io",
            "v1beta1",
            &[("machinesets", "MachineSet"), ("machinedeployments", "MachineDeployment")],
        );
        assert!(matches!(
            CapiResources::discover(&client, "cluster.x-k8s.io").await,
            Err(DiscoveryError::MissingResource {
                resource: "machines",
                ..
            })
        ));
    }
}
