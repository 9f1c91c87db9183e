use std::time::Duration;

/// Per-node-group tuning of the autoscaler's scale-down behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeGroupAutoscalingOptions {
    /// Sum of requested CPU or memory over capacity below which a node may be removed.
    pub scale_down_utilization_threshold: f64,

    /// As above, for GPU-equipped nodes.
    pub scale_down_gpu_utilization_threshold: f64,

    /// How long a node must be unneeded before it is eligible for removal.
    pub scale_down_unneeded_time: Duration,

    /// How long an unready node must be unneeded before it is eligible for removal.
    pub scale_down_unready_time: Duration,

    /// How long to wait for a new node to register before treating it as failed.
    pub max_node_provision_time: Duration,
}

impl Default for NodeGroupAutoscalingOptions {
    fn default() -> Self {
        Self {
            scale_down_utilization_threshold: 0.5,
            scale_down_gpu_utilization_threshold: 0.5,
            scale_down_unneeded_time: Duration::from_secs(10 * 60),
            scale_down_unready_time: Duration::from_secs(20 * 60),
            max_node_provision_time: Duration::from_secs(15 * 60),
        }
    }
}
