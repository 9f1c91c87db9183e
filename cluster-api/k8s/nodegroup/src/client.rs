use capi_autoscaler_provider_core::{Error, Result};
use capi_autoscaler_provider_k8s_api::{
    Api, ApiResource, CapiResources, Client, DynamicObject, Machine, ObjectKey, Patch,
    PatchParams, PostParams, ScalableKind,
};
use tracing::debug;

/// The writes the provider issues against the management cluster.
///
/// Reads of replica counts also go through this interface since the cache is never trusted for
/// them.
#[async_trait::async_trait]
pub trait ManagementClient: Send + Sync {
    /// Reads `spec.replicas` from the resource's scale subresource.
    async fn get_replicas(&self, kind: ScalableKind, key: &ObjectKey) -> Result<i32>;

    /// Writes `spec.replicas` through the resource's scale subresource.
    async fn set_replicas(&self, kind: ScalableKind, key: &ObjectKey, replicas: i32)
        -> Result<()>;

    async fn get_machine(&self, key: &ObjectKey) -> Result<DynamicObject>;

    async fn replace_machine(&self, key: &ObjectKey, machine: &DynamicObject) -> Result<()>;
}

/// A [`ManagementClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeManagementClient {
    client: Client,
    resources: CapiResources,
}

// === impl KubeManagementClient ===

impl KubeManagementClient {
    pub fn new(client: Client, resources: CapiResources) -> Self {
        Self { client, resources }
    }

    fn resource(&self, kind: ScalableKind) -> Result<&ApiResource> {
        let resource = match kind {
            ScalableKind::MachineSet => Some(&self.resources.machine_sets),
            ScalableKind::MachineDeployment => self.resources.machine_deployments.as_ref(),
            ScalableKind::MachinePool => self.resources.machine_pools.as_ref(),
        };
        resource.ok_or_else(|| {
            Error::Configuration(format!(
                "{kind} is not served by {}",
                self.resources.group_version()
            ))
        })
    }

    fn api(&self, resource: &ApiResource, key: &ObjectKey) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &key.namespace, resource)
    }
}

#[async_trait::async_trait]
impl ManagementClient for KubeManagementClient {
    async fn get_replicas(&self, kind: ScalableKind, key: &ObjectKey) -> Result<i32> {
        let api = self.api(self.resource(kind)?, key);
        let scale = api
            .get_scale(&key.name)
            .await
            .map_err(Error::api(kind.as_str(), key))?;
        Ok(scale.spec.and_then(|s| s.replicas).unwrap_or_default())
    }

    async fn set_replicas(
        &self,
        kind: ScalableKind,
        key: &ObjectKey,
        replicas: i32,
    ) -> Result<()> {
        let api = self.api(self.resource(kind)?, key);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        match api
            .patch_scale(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => return Ok(()),
            Err(error) if is_patch_unsupported(&error) => {
                debug!(%kind, %key, %error, "Scale patch unsupported; replacing scale");
            }
            Err(error) => return Err(Error::api(kind.as_str(), key)(error)),
        }

        let mut scale = api
            .get_scale(&key.name)
            .await
            .map_err(Error::api(kind.as_str(), key))?;
        scale.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        let data = serde_json::to_vec(&scale).map_err(kube::Error::SerdeError)?;
        api.replace_scale(&key.name, &PostParams::default(), data)
            .await
            .map_err(Error::api(kind.as_str(), key))?;
        Ok(())
    }

    async fn get_machine(&self, key: &ObjectKey) -> Result<DynamicObject> {
        self.api(&self.resources.machines, key)
            .get(&key.name)
            .await
            .map_err(Error::api(Machine::KIND, key))
    }

    async fn replace_machine(&self, key: &ObjectKey, machine: &DynamicObject) -> Result<()> {
        self.api(&self.resources.machines, key)
            .replace(&key.name, &PostParams::default(), machine)
            .await
            .map_err(Error::api(Machine::KIND, key))?;
        Ok(())
    }
}

/// Whether the server rejected a merge patch on the scale subresource.
fn is_patch_unsupported(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(rsp) if rsp.code == 405 || rsp.code == 415)
}
