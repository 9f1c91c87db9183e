//! Node-group operations over CAPI scalable resources.
//!
//! Reads are served from the shared cache; replica counts and every write go through a
//! [`ManagementClient`]. A [`Controller`] is shared by all node groups so that node deletions,
//! which interleave Machine annotations with replica changes, are serialized across groups.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod node_group;
mod provider;
mod scalable;


pub use self::{
    client::{KubeManagementClient, ManagementClient},
    node_group::ClusterApiNodeGroup,
    provider::ClusterApiProvider,
    scalable::ScalableResource,
};
use capi_autoscaler_provider_k8s_index::SharedIndex;
use std::sync::Arc;

/// State shared by every node group.
pub struct Controller {
    index: SharedIndex,
    client: Arc<dyn ManagementClient>,

    /// Held for the duration of a node-deletion batch.
    delete_lock: tokio::sync::Mutex<()>,
}

// === impl Controller ===

impl Controller {
    pub fn new(index: SharedIndex, client: Arc<dyn ManagementClient>) -> Arc<Self> {
        Arc::new(Self {
            index,
            client,
            delete_lock: tokio::sync::Mutex::new(()),
        })
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}
