//! The interfaces a cluster autoscaler drives a cloud provider through.
//!
//! A provider publishes a set of [`NodeGroup`]s, each a horizontally resizable set of
//! instances backing workload `Node`s. The autoscaler reads their bounds and target sizes, maps
//! Nodes back to groups, and asks groups to grow, shrink unfulfilled capacity, or delete specific
//! Nodes. Providers never create node groups on the autoscaler's behalf.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
pub mod instance;
pub mod options;

pub use self::{
    error::{Error, Result},
    instance::{Instance, InstanceErrorClass, InstanceErrorInfo, InstanceState, InstanceStatus},
    options::NodeGroupAutoscalingOptions,
};
use capi_autoscaler_provider_k8s_api::Node;

/// A set of instances resized as a unit.
#[async_trait::async_trait]
pub trait NodeGroup: Send + Sync + std::fmt::Debug {
    /// An identifier that is unique and stable for the lifetime of the group.
    fn id(&self) -> &str;

    fn min_size(&self) -> i32;

    fn max_size(&self) -> i32;

    /// The desired number of instances. This may differ from the number of Nodes that exist.
    async fn target_size(&self) -> Result<i32>;

    /// Raises the target size by `delta`, which must be positive.
    async fn increase_size(&self, delta: i32) -> Result<()>;

    /// Lowers the target size by `delta`, which must be negative. Only capacity that has not
    /// yet materialized as Nodes may be removed this way.
    async fn decrease_target_size(&self, delta: i32) -> Result<()>;

    /// Deletes the given Nodes from the group and lowers the target size accordingly.
    async fn delete_nodes(&self, nodes: &[Node]) -> Result<()>;

    /// The instances that belong to the group.
    async fn nodes(&self) -> Result<Vec<Instance>>;

    /// A one-line human-readable description.
    fn debug(&self) -> String;

    fn exist(&self) -> bool;

    async fn create(&self) -> Result<Box<dyn NodeGroup>>;

    async fn delete(&self) -> Result<()>;

    fn autoprovisioned(&self) -> bool;

    /// Per-group overrides of the autoscaler's defaults, if the group configures any.
    fn get_options(
        &self,
        defaults: &NodeGroupAutoscalingOptions,
    ) -> Result<Option<NodeGroupAutoscalingOptions>>;
}

/// Publishes node groups and maps Nodes onto them.
#[async_trait::async_trait]
pub trait CloudProvider: Send + Sync {
    type NodeGroup: NodeGroup;

    fn name(&self) -> &'static str;

    /// Every node group currently eligible for autoscaling.
    fn node_groups(&self) -> Result<Vec<Self::NodeGroup>>;

    /// The group owning `node`, or `None` if the node is not managed by this provider.
    fn node_group_for_node(&self, node: &Node) -> Result<Option<Self::NodeGroup>>;

    /// Whether `node` is backed by an instance this provider knows about.
    fn has_instance(&self, node: &Node) -> Result<bool>;

    /// Called once per autoscaler loop before any other method.
    async fn refresh(&self) -> Result<()>;

    fn cleanup(&self) -> Result<()>;
}

/// Narrows the set of Nodes the autoscaler may consider for scale-down.
pub trait ScaleDownCandidates {
    fn scale_down_candidates(&self, nodes: Vec<Node>) -> Vec<Node>;
}

/// The name a Node is known by in diagnostics.
pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

/// The provider-id a Node reports, if any.
pub fn node_provider_id(node: &Node) -> Option<&str> {
    node.spec
        .as_ref()
        .and_then(|spec| spec.provider_id.as_deref())
        .filter(|id| !id.is_empty())
}
