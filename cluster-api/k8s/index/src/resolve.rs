//! Resolution of Nodes to the scalable resources that own them.

use crate::Index;
use capi_autoscaler_provider_core::{
    node_name, node_provider_id, Error, Instance, InstanceState, Result,
};
use capi_autoscaler_provider_k8s_api::{
    annotations::{self, Bounds},
    provider_id, Machine, MachinePool, MachineSet, Node, ObjectKey, Scalable, ScalableKind,
};
use tracing::{debug, warn};

/// Error code reported for Machines that failed before a Node registered.
const PROVISIONING_FAILED: &str = "ProvisioningFailed";

/// A scalable resource that passed auto-discovery and carries usable bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct Admitted {
    pub resource: Scalable,
    pub bounds: Bounds,
}

impl Index {
    /// Applies auto-discovery and bounds validation to a scalable resource.
    ///
    /// Resources without bounds annotations, or with a max size of zero, are silently not node
    /// groups. Resources with invalid bounds are dropped with a warning.
    pub fn admit(&self, resource: Scalable) -> Option<Admitted> {
        if !self.discovery.admits(&resource) {
            debug!(id = %resource.id(), "Not selected by node-group auto-discovery");
            return None;
        }

        match resource.bounds() {
            Ok(Some(bounds)) if bounds.max > 0 => Some(Admitted { resource, bounds }),
            Ok(Some(_)) => {
                debug!(id = %resource.id(), "Autoscaling disabled by max size of 0");
                None
            }
            Ok(None) => None,
            Err(error) => {
                warn!(id = %resource.id(), %error, "Ignoring node group with invalid bounds");
                None
            }
        }
    }

    /// Lists every admitted node group, ordered by kind and key.
    ///
    /// MachineSets owned by a MachineDeployment are scaled through the deployment and are never
    /// listed on their own.
    pub fn node_groups(&self) -> Vec<Admitted> {
        let sets = self
            .machine_sets
            .values()
            .filter(|ms| ms.deployment_owner().is_none())
            .cloned()
            .map(Scalable::from);
        let deployments = self.machine_deployments.values().cloned().map(Scalable::from);
        let pools = self.machine_pools.values().cloned().map(Scalable::from);

        let mut groups = sets
            .chain(deployments)
            .chain(pools)
            .filter_map(|resource| self.admit(resource))
            .collect::<Vec<_>>();
        groups.sort_by(|a, b| {
            (a.resource.kind(), a.resource.key()).cmp(&(b.resource.kind(), b.resource.key()))
        });
        groups
    }

    /// The cached state of a scalable resource.
    pub fn scalable(&self, kind: ScalableKind, key: &ObjectKey) -> Option<Scalable> {
        match kind {
            ScalableKind::MachineSet => self.machine_sets.get(key).cloned().map(Into::into),
            ScalableKind::MachineDeployment => {
                self.machine_deployments.get(key).cloned().map(Into::into)
            }
            ScalableKind::MachinePool => self.machine_pools.get(key).cloned().map(Into::into),
        }
    }

    /// Looks up the Machine indexed under the normalized form of `provider_id`.
    pub fn machine_by_provider_id(&self, provider_id: &str) -> Result<Option<&Machine>> {
        let Some(keys) = self
            .machines_by_provider_id
            .get(provider_id::normalize(provider_id))
        else {
            return Ok(None);
        };

        if keys.len() > 1 {
            let mut machines = keys.iter().map(ToString::to_string).collect::<Vec<_>>();
            machines.sort();
            return Err(Error::AmbiguousProviderId {
                provider_id: provider_id.to_string(),
                machines,
            });
        }

        Ok(keys.iter().next().and_then(|key| self.machines.get(key)))
    }

    /// Finds the Machine backing a Node.
    ///
    /// Machines are matched by provider-id first. Failed Machines are matched by the synthetic
    /// provider-id that encodes their key. Finally, the Node's machine annotation is consulted,
    /// which links Machines whose provider-id has not been populated yet.
    pub fn find_machine_for_node(&self, node: &Node) -> Result<Option<&Machine>> {
        if let Some(id) = node_provider_id(node) {
            if let Some(machine) = self.machine_by_provider_id(id)? {
                return Ok(Some(machine));
            }

            if let Some(key) = provider_id::parse_failed_machine_id(id) {
                if let Some(machine) = self.machines.get(&key) {
                    return Ok(Some(machine));
                }
            }
        }

        // The autoscaler may hand us a Node without annotations, so fall back to the cached copy,
        // found by name or else by provider-id.
        let name = node_name(node);
        let locator = node
            .metadata
            .annotations
            .as_ref()
            .and_then(annotations::node_machine)
            .or_else(|| {
                let by_id = node_provider_id(node)
                    .into_iter()
                    .flat_map(|id| self.nodes_for_provider_id(id));
                self.nodes
                    .get(name)
                    .into_iter()
                    .chain(by_id)
                    .find_map(|n| {
                        n.metadata
                            .annotations
                            .as_ref()
                            .and_then(annotations::node_machine)
                    })
            });
        let Some(locator) = locator else {
            return Ok(None);
        };
        let Some(key) = ObjectKey::parse(locator) else {
            debug!(node = %name, %locator, "Ignoring malformed machine annotation");
            return Ok(None);
        };
        Ok(self.machines.get(&key))
    }

    /// Walks a Machine's owner references up to its scalable resource.
    ///
    /// A MachineSet owned by a MachineDeployment resolves to the deployment.
    pub fn owner_of(&self, machine: &Machine) -> Option<Scalable> {
        if let Some(owner) = machine.owner(MachineSet::KIND) {
            let key = ObjectKey::new(&machine.key.namespace, &owner.name);
            let Some(ms) = self.machine_sets.get(&key) else {
                debug!(machine = %machine.key, machineset = %key, "Owner not found");
                return None;
            };

            let Some(owner) = ms.deployment_owner() else {
                return Some(ms.clone().into());
            };
            let key = ObjectKey::new(&ms.key.namespace, &owner.name);
            return match self.machine_deployments.get(&key) {
                Some(md) => Some(md.clone().into()),
                None => {
                    debug!(machineset = %ms.key, machinedeployment = %key, "Owner not found");
                    None
                }
            };
        }

        if let Some(owner) = machine.owner(MachinePool::KIND) {
            let key = ObjectKey::new(&machine.key.namespace, &owner.name);
            return self.machine_pools.get(&key).cloned().map(Into::into);
        }

        debug!(machine = %machine.key, "Machine has no scalable owner");
        None
    }

    /// The MachinePool listing an instance with the given provider-id.
    pub fn pool_for_provider_id(&self, provider_id: &str) -> Option<&MachinePool> {
        let id = provider_id::normalize(provider_id);
        if id.is_empty() {
            return None;
        }
        self.machine_pools
            .values()
            .filter(|mp| mp.contains(id))
            .min_by(|a, b| a.key.cmp(&b.key))
    }

    /// The scalable resource owning a Node, regardless of admission.
    pub fn scalable_for_node(&self, node: &Node) -> Result<Option<Scalable>> {
        if let Some(machine) = self.find_machine_for_node(node)? {
            return Ok(self.owner_of(machine));
        }

        Ok(node_provider_id(node)
            .and_then(|id| self.pool_for_provider_id(id))
            .cloned()
            .map(Into::into))
    }

    /// The admitted node group owning a Node, or `None` if the Node is not ours.
    pub fn node_group_for_node(&self, node: &Node) -> Result<Option<Admitted>> {
        let Some(resource) = self.scalable_for_node(node)? else {
            debug!(node = %node_name(node), "No scalable resource found for node");
            return Ok(None);
        };
        Ok(self.admit(resource))
    }

    /// Whether a Node is backed by a known Machine or MachinePool instance.
    pub fn has_instance(&self, node: &Node) -> Result<bool> {
        if self.find_machine_for_node(node)?.is_some() {
            return Ok(true);
        }
        Ok(node_provider_id(node)
            .and_then(|id| self.pool_for_provider_id(id))
            .is_some())
    }

    /// The Machines a scalable resource manages, ordered by key.
    ///
    /// MachineSets and MachineDeployments select Machines by label in their own namespace.
    /// MachinePools own their Machines directly, if they have any at all.
    pub fn machines_for(&self, resource: &Scalable) -> Vec<&Machine> {
        let mut machines = self
            .machines
            .values()
            .filter(|m| m.key.namespace == resource.namespace())
            .filter(|m| match resource.selector() {
                Some(selector) => selector.matches(&m.labels()),
                None => m
                    .owner(MachinePool::KIND)
                    .map(|o| o.name == resource.name())
                    .unwrap_or(false),
            })
            .collect::<Vec<_>>();
        machines.sort_by(|a, b| a.key.cmp(&b.key));
        machines
    }

    /// The instances the autoscaler considers members of a scalable resource.
    ///
    /// A Machine contributes its provider-id if it has one, a synthetic failed-machine id if it
    /// failed to provision, or the provider-id of the Node it references. Machines with none of
    /// these are still provisioning and contribute nothing. MachinePools without Machines
    /// contribute their provider-id list.
    pub fn instances(&self, resource: &Scalable) -> Vec<Instance> {
        let machines = self.machines_for(resource);
        if let Scalable::MachinePool(mp) = resource {
            if machines.is_empty() {
                return mp.provider_ids().map(Instance::running).collect();
            }
        }

        machines
            .into_iter()
            .filter_map(|m| self.machine_instance(m))
            .collect()
    }

    fn machine_instance(&self, machine: &Machine) -> Option<Instance> {
        let state = if machine.is_deleting() {
            InstanceState::Deleting
        } else {
            InstanceState::Running
        };

        if let Some(id) = machine.provider_id() {
            return Some(Instance::new(id, state));
        }

        if let Some(message) = machine.failure_message() {
            let id = provider_id::failed_machine_id(&machine.key);
            return Some(Instance::failed(id, PROVISIONING_FAILED, message));
        }

        let id = machine
            .node_name()
            .and_then(|name| self.nodes.get(name))
            .and_then(node_provider_id)?;
        Some(Instance::new(id, state))
    }
}
