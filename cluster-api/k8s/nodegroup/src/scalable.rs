use crate::Controller;
use capi_autoscaler_provider_core::{Error, Instance, Result};
use capi_autoscaler_provider_k8s_api::{
    annotations::{self, Bounds},
    ObjectKey, Scalable, ScalableKind,
};
use capi_autoscaler_provider_k8s_index::Admitted;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// An admitted MachineSet, MachineDeployment, or MachinePool and the operations the autoscaler
/// may perform on it.
///
/// Bounds are captured when the resource is admitted. Everything else is read either from the
/// cache or from the management API at the time of the call.
#[derive(Clone)]
pub struct ScalableResource {
    controller: Arc<Controller>,
    resource: Scalable,
    bounds: Bounds,
    id: String,
}

// === impl ScalableResource ===

impl ScalableResource {
    pub fn new(controller: Arc<Controller>, Admitted { resource, bounds }: Admitted) -> Self {
        Self {
            id: resource.id(),
            controller,
            resource,
            bounds,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ScalableKind {
        self.resource.kind()
    }

    pub fn key(&self) -> &ObjectKey {
        self.resource.key()
    }

    pub fn min(&self) -> i32 {
        self.bounds.min
    }

    pub fn max(&self) -> i32 {
        self.bounds.max
    }

    pub(crate) fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// The latest cached state of the resource, falling back to the admitted snapshot if it has
    /// since left the cache.
    fn current(&self) -> Scalable {
        self.controller
            .index
            .read()
            .scalable(self.kind(), self.key())
            .unwrap_or_else(|| self.resource.clone())
    }

    /// The replica count as last observed by the cache. Only suitable for diagnostics.
    pub fn cached_replicas(&self) -> i32 {
        self.current().cached_replicas()
    }

    /// Reads the replica count from the scale subresource.
    pub async fn replicas(&self) -> Result<i32> {
        self.controller
            .client
            .get_replicas(self.kind(), self.key())
            .await
    }

    /// Writes the replica count through the scale subresource.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn set_size(&self, size: i32) -> Result<()> {
        let Bounds { min, max } = self.bounds;
        if size < min || size > max {
            return Err(Error::SizeOutOfBounds { size, min, max });
        }
        self.controller
            .client
            .set_replicas(self.kind(), self.key(), size)
            .await?;
        info!(%size, "Scaled");
        Ok(())
    }

    /// The instances backing the resource.
    pub fn nodes(&self) -> Vec<Instance> {
        self.controller.index.read().instances(&self.resource)
    }

    /// Sets the delete markers on a Machine so that CAPI prefers it when replicas are lowered.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn mark_machine_for_deletion(&self, machine: &ObjectKey) -> Result<()> {
        let mut obj = self.controller.client.get_machine(machine).await?;
        let timestamp = chrono::Utc::now().to_rfc3339();
        annotations::mark_for_deletion(
            obj.metadata.annotations.get_or_insert_with(Default::default),
            &timestamp,
        );
        self.controller.client.replace_machine(machine, &obj).await?;
        debug!("Marked machine for deletion");
        Ok(())
    }

    /// Removes the delete markers from a Machine. Machines without markers are not written.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn unmark_machine_for_deletion(&self, machine: &ObjectKey) -> Result<()> {
        let mut obj = self.controller.client.get_machine(machine).await?;
        let removed = obj
            .metadata
            .annotations
            .as_mut()
            .map(annotations::unmark_for_deletion)
            .unwrap_or(false);
        if !removed {
            debug!("Machine is not marked for deletion");
            return Ok(());
        }
        self.controller.client.replace_machine(machine, &obj).await?;
        debug!("Unmarked machine for deletion");
        Ok(())
    }

    /// Whether the resource is a MachineDeployment whose status has not converged on its spec.
    pub fn is_machine_deployment_and_rolling_out(&self) -> bool {
        self.current().is_machine_deployment_and_rolling_out()
    }

    pub fn annotations(&self) -> &annotations::Annotations {
        self.resource.annotations()
    }
}

impl std::fmt::Debug for ScalableResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalableResource")
            .field("id", &self.id)
            .field("bounds", &self.bounds)
            .finish()
    }
}
