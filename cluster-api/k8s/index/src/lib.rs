//! Cluster API node-group cache
//!
//! The cache mirrors the management cluster's CAPI objects and the workload cluster's Nodes,
//! keyed so that a Node can be traced back to the scalable resource that owns it:
//!
//! ```text
//! [ Node ] -> [ Machine ] -> [ MachineSet ] -> [ MachineDeployment ]
//!    \
//!     `--(providerIDList)--> [ MachinePool ]
//! ```
//!
//! Nodes and Machines are joined on their normalized provider-ids, so both are additionally
//! indexed by provider-id. Each watched kind is fed by its own [`Informer`] which projects
//! dynamic objects into typed records before they enter the shared [`Index`].
//!
//! The cache is authoritative only for the existence and shape of objects. Replica counts are
//! always read from the management API when they matter.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod autodiscovery;
mod informer;
pub mod metrics;
mod resolve;

#[cfg(test)]
mod tests;

pub use self::{
    autodiscovery::{AutoDiscovery, DiscoverySpec},
    informer::{Cached, Informer, NodeInformer, SyncError, SyncWait},
    metrics::CacheMetrics,
    resolve::Admitted,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use capi_autoscaler_provider_core::node_provider_id;
use capi_autoscaler_provider_k8s_api::{
    provider_id, Machine, MachineDeployment, MachinePool, MachineSet, Node, ObjectKey,
};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds all cached state. Written by the informer tasks; read by node-group operations.
#[derive(Debug, Default)]
pub struct Index {
    discovery: AutoDiscovery,

    machines: HashMap<ObjectKey, Machine>,
    machine_sets: HashMap<ObjectKey, MachineSet>,
    machine_deployments: HashMap<ObjectKey, MachineDeployment>,
    machine_pools: HashMap<ObjectKey, MachinePool>,
    nodes: HashMap<String, Node>,

    /// Machines by normalized provider-id. More than one entry per id indicates a conflict.
    machines_by_provider_id: HashMap<String, HashSet<ObjectKey>>,

    /// Node names by normalized provider-id.
    nodes_by_provider_id: HashMap<String, HashSet<String>>,
}

// === impl Index ===

impl Index {
    pub fn new(discovery: AutoDiscovery) -> Self {
        Self {
            discovery,
            ..Default::default()
        }
    }

    pub fn shared(discovery: AutoDiscovery) -> SharedIndex {
        Arc::new(RwLock::new(Self::new(discovery)))
    }

    pub fn discovery(&self) -> &AutoDiscovery {
        &self.discovery
    }

    pub fn machine(&self, key: &ObjectKey) -> Option<&Machine> {
        self.machines.get(key)
    }

    pub fn machine_set(&self, key: &ObjectKey) -> Option<&MachineSet> {
        self.machine_sets.get(key)
    }

    pub fn machine_deployment(&self, key: &ObjectKey) -> Option<&MachineDeployment> {
        self.machine_deployments.get(key)
    }

    pub fn machine_pool(&self, key: &ObjectKey) -> Option<&MachinePool> {
        self.machine_pools.get(key)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Returns the Nodes whose normalized provider-id matches `provider_id`.
    pub fn nodes_for_provider_id<'a>(
        &'a self,
        provider_id: &str,
    ) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes_by_provider_id
            .get(provider_id::normalize(provider_id))
            .into_iter()
            .flatten()
            .filter_map(|name| self.nodes.get(name))
    }

    pub(crate) fn apply_machine(&mut self, machine: Machine) {
        self.unindex_machine(&machine.key);
        if let Some(id) = machine.provider_id().map(provider_id::normalize) {
            if !id.is_empty() {
                self.machines_by_provider_id
                    .entry(id.to_string())
                    .or_default()
                    .insert(machine.key.clone());
            }
        }
        self.machines.insert(machine.key.clone(), machine);
    }

    pub(crate) fn delete_machine(&mut self, key: &ObjectKey) {
        self.unindex_machine(key);
        self.machines.remove(key);
    }

    fn unindex_machine(&mut self, key: &ObjectKey) {
        let Some(id) = self
            .machines
            .get(key)
            .and_then(Machine::provider_id)
            .map(provider_id::normalize)
        else {
            return;
        };
        if let Some(keys) = self.machines_by_provider_id.get_mut(id) {
            keys.remove(key);
            if keys.is_empty() {
                self.machines_by_provider_id.remove(id);
            }
        }
    }

    pub(crate) fn apply_machine_set(&mut self, ms: MachineSet) {
        self.machine_sets.insert(ms.key.clone(), ms);
    }

    pub(crate) fn delete_machine_set(&mut self, key: &ObjectKey) {
        self.machine_sets.remove(key);
    }

    pub(crate) fn apply_machine_deployment(&mut self, md: MachineDeployment) {
        self.machine_deployments.insert(md.key.clone(), md);
    }

    pub(crate) fn delete_machine_deployment(&mut self, key: &ObjectKey) {
        self.machine_deployments.remove(key);
    }

    pub(crate) fn apply_machine_pool(&mut self, mp: MachinePool) {
        self.machine_pools.insert(mp.key.clone(), mp);
    }

    pub(crate) fn delete_machine_pool(&mut self, key: &ObjectKey) {
        self.machine_pools.remove(key);
    }

    pub(crate) fn apply_node(&mut self, node: Node) {
        let Some(name) = node.metadata.name.clone() else {
            return;
        };
        self.unindex_node(&name);
        if let Some(id) = node_provider_id(&node).map(provider_id::normalize) {
            if !id.is_empty() {
                self.nodes_by_provider_id
                    .entry(id.to_string())
                    .or_default()
                    .insert(name.clone());
            }
        }
        self.nodes.insert(name, node);
    }

    pub(crate) fn delete_node(&mut self, name: &str) {
        self.unindex_node(name);
        self.nodes.remove(name);
    }

    fn unindex_node(&mut self, name: &str) {
        let Some(id) = self
            .nodes
            .get(name)
            .and_then(node_provider_id)
            .map(provider_id::normalize)
        else {
            return;
        };
        if let Some(names) = self.nodes_by_provider_id.get_mut(id) {
            names.remove(name);
            if names.is_empty() {
                self.nodes_by_provider_id.remove(id);
            }
        }
    }
}
