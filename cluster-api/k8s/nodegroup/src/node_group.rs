use crate::ScalableResource;
use capi_autoscaler_provider_core::{
    node_name, Error, Instance, NodeGroup, NodeGroupAutoscalingOptions, Result,
};
use capi_autoscaler_provider_k8s_api::{annotations, Node, ObjectKey, Scalable};
use tracing::{debug, info, instrument, warn};

/// A node group backed by a CAPI scalable resource.
#[derive(Clone, Debug)]
pub struct ClusterApiNodeGroup {
    scalable: ScalableResource,
}

/// What must happen to remove a single Node from the group.
#[derive(Debug)]
enum Removal {
    /// Mark the Machine and lower replicas by one.
    Machine(ObjectKey),

    /// The Machine is already being deleted by its owner.
    Deleting(ObjectKey),

    /// A MachinePool instance with no Machine; only replicas are lowered.
    PoolInstance,
}

// === impl ClusterApiNodeGroup ===

impl ClusterApiNodeGroup {
    pub fn new(scalable: ScalableResource) -> Self {
        Self { scalable }
    }

    pub fn scalable(&self) -> &ScalableResource {
        &self.scalable
    }

    /// Resolves every Node to a removal, failing if any Node belongs elsewhere.
    fn removals(&self, nodes: &[Node]) -> Result<Vec<Removal>> {
        let index = self.scalable.controller().index.read();
        nodes
            .iter()
            .map(|node| {
                let name = node_name(node);
                let group = index
                    .node_group_for_node(node)?
                    .ok_or_else(|| Error::NoNodeGroup(name.to_string()))?;
                let actual = group.resource.id();
                if actual != self.id() {
                    return Err(Error::NodeGroupMismatch {
                        node: name.to_string(),
                        expected: self.id().to_string(),
                        actual,
                    });
                }

                match index.find_machine_for_node(node)? {
                    Some(machine) if machine.is_deleting() => {
                        Ok(Removal::Deleting(machine.key.clone()))
                    }
                    Some(machine) => Ok(Removal::Machine(machine.key.clone())),
                    None if matches!(group.resource, Scalable::MachinePool(_)) => {
                        Ok(Removal::PoolInstance)
                    }
                    None => Err(Error::UnknownMachine(name.to_string())),
                }
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl NodeGroup for ClusterApiNodeGroup {
    fn id(&self) -> &str {
        self.scalable.id()
    }

    fn min_size(&self) -> i32 {
        self.scalable.min()
    }

    fn max_size(&self) -> i32 {
        self.scalable.max()
    }

    async fn target_size(&self) -> Result<i32> {
        self.scalable.replicas().await
    }

    async fn increase_size(&self, delta: i32) -> Result<()> {
        if delta <= 0 {
            return Err(Error::SizeIncreaseNotPositive(delta));
        }

        let size = self.scalable.replicas().await?;
        let max = self.max_size();
        match size.checked_add(delta) {
            Some(desired) if desired <= max => self.scalable.set_size(desired).await,
            _ => Err(Error::SizeIncreaseTooLarge {
                desired: i64::from(size) + i64::from(delta),
                max,
            }),
        }
    }

    async fn decrease_target_size(&self, delta: i32) -> Result<()> {
        if delta >= 0 {
            return Err(Error::SizeDecreaseNotNegative(delta));
        }

        let size = self.scalable.replicas().await?;
        let existing = self.scalable.nodes().len();
        let desired = i64::from(size) + i64::from(delta);
        if desired < existing as i64 {
            return Err(Error::SizeDecreaseTooLarge {
                size,
                delta,
                existing,
            });
        }
        self.scalable.set_size(size + delta).await
    }

    #[instrument(skip_all, fields(id = %self.id(), nodes = nodes.len()))]
    async fn delete_nodes(&self, nodes: &[Node]) -> Result<()> {
        let _lock = self.scalable.controller().delete_lock.lock().await;

        let mut replicas = self.scalable.replicas().await?;
        if replicas <= self.min_size() {
            return Err(Error::MinSizeReached {
                id: self.id().to_string(),
                min: self.min_size(),
            });
        }

        let removals = self.removals(nodes)?;
        if i64::from(replicas) - (nodes.len() as i64) < i64::from(self.min_size()) {
            return Err(Error::BelowMinSize {
                id: self.id().to_string(),
                count: nodes.len(),
                size: replicas,
                min: self.min_size(),
            });
        }

        let mut pool_instances = 0;
        for removal in removals {
            let machine = match removal {
                Removal::Machine(machine) => machine,
                Removal::Deleting(machine) => {
                    // Replicas are left for the owner to lower.
                    debug!(%machine, "Machine is already being deleted");
                    continue;
                }
                Removal::PoolInstance => {
                    pool_instances += 1;
                    continue;
                }
            };

            self.scalable.mark_machine_for_deletion(&machine).await?;
            if let Err(error) = self.scalable.set_size(replicas - 1).await {
                if let Err(error) = self.scalable.unmark_machine_for_deletion(&machine).await {
                    warn!(%machine, %error, "Failed to unmark machine");
                }
                return Err(error);
            }
            replicas -= 1;
        }

        if pool_instances > 0 {
            self.scalable.set_size(replicas - pool_instances).await?;
        }

        info!("Deleted nodes");
        Ok(())
    }

    async fn nodes(&self) -> Result<Vec<Instance>> {
        Ok(self.scalable.nodes())
    }

    fn debug(&self) -> String {
        format!(
            "{} (min: {}, max: {}, replicas: {})",
            self.id(),
            self.min_size(),
            self.max_size(),
            self.scalable.cached_replicas(),
        )
    }

    fn exist(&self) -> bool {
        true
    }

    async fn create(&self) -> Result<Box<dyn NodeGroup>> {
        Err(Error::NotImplemented)
    }

    async fn delete(&self) -> Result<()> {
        Err(Error::NotImplemented)
    }

    fn autoprovisioned(&self) -> bool {
        false
    }

    fn get_options(
        &self,
        defaults: &NodeGroupAutoscalingOptions,
    ) -> Result<Option<NodeGroupAutoscalingOptions>> {
        let configured = self.scalable.annotations();
        let mut options = defaults.clone();
        let mut overridden = false;

        let mut float = |key: &'static str, value: &mut f64| -> Result<()> {
            if let Some(v) = annotations::float_option(configured, key)? {
                *value = v;
                overridden = true;
            }
            Ok(())
        };
        float(
            annotations::SCALE_DOWN_UTILIZATION_THRESHOLD,
            &mut options.scale_down_utilization_threshold,
        )?;
        float(
            annotations::SCALE_DOWN_GPU_UTILIZATION_THRESHOLD,
            &mut options.scale_down_gpu_utilization_threshold,
        )?;

        let mut duration = |key: &'static str, value: &mut std::time::Duration| -> Result<()> {
            if let Some(v) = annotations::duration_option(configured, key)? {
                *value = v;
                overridden = true;
            }
            Ok(())
        };
        duration(
            annotations::SCALE_DOWN_UNNEEDED_TIME,
            &mut options.scale_down_unneeded_time,
        )?;
        duration(
            annotations::SCALE_DOWN_UNREADY_TIME,
            &mut options.scale_down_unready_time,
        )?;
        duration(
            annotations::MAX_NODE_PROVISION_TIME,
            &mut options.max_node_provision_time,
        )?;

        Ok(overridden.then_some(options))
    }
}
