use crate::{ClusterApiNodeGroup, Controller, ScalableResource};
use capi_autoscaler_provider_core::{node_name, CloudProvider, Result, ScaleDownCandidates};
use capi_autoscaler_provider_k8s_api::Node;
use capi_autoscaler_provider_k8s_index::Admitted;
use std::sync::Arc;
use tracing::{debug, info};

/// Publishes admitted CAPI scalable resources as node groups.
#[derive(Clone, Debug)]
pub struct ClusterApiProvider {
    controller: Arc<Controller>,
}

// === impl ClusterApiProvider ===

impl ClusterApiProvider {
    pub const NAME: &'static str = "clusterapi";

    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }

    fn node_group(&self, group: Admitted) -> ClusterApiNodeGroup {
        ClusterApiNodeGroup::new(ScalableResource::new(self.controller.clone(), group))
    }
}

#[async_trait::async_trait]
impl CloudProvider for ClusterApiProvider {
    type NodeGroup = ClusterApiNodeGroup;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn node_groups(&self) -> Result<Vec<ClusterApiNodeGroup>> {
        let admitted = self.controller.index.read().node_groups();
        Ok(admitted
            .into_iter()
            .map(|group| self.node_group(group))
            .collect())
    }

    fn node_group_for_node(&self, node: &Node) -> Result<Option<ClusterApiNodeGroup>> {
        let admitted = self.controller.index.read().node_group_for_node(node)?;
        Ok(admitted.map(|group| self.node_group(group)))
    }

    fn has_instance(&self, node: &Node) -> Result<bool> {
        self.controller.index.read().has_instance(node)
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

impl ScaleDownCandidates for ClusterApiProvider {
    /// Drops Nodes that are not in a node group or whose MachineDeployment is rolling out.
    fn scale_down_candidates(&self, nodes: Vec<Node>) -> Vec<Node> {
        let index = self.controller.index.read();
        nodes
            .into_iter()
            .filter(|node| match index.node_group_for_node(node) {
                Ok(Some(group)) if group.resource.is_machine_deployment_and_rolling_out() => {
                    debug!(
                        node = %node_name(node),
                        id = %group.resource.id(),
                        "Node group is rolling out"
                    );
                    false
                }
                Ok(Some(_)) => true,
                Ok(None) => false,
                Err(error) => {
                    info!(node = %node_name(node), %error, "Failed to resolve node group");
                    false
                }
            })
            .collect()
    }
}
