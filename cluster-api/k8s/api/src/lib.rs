#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod capi;
pub mod discovery;
pub mod duration;
pub mod labels;
pub mod provider_id;
mod scalable;

pub use self::{
    capi::{InvalidObject, Machine, MachineDeployment, MachinePool, MachineSet},
    discovery::{CapiResources, DiscoveryClient, DiscoveryError},
    labels::{Labels, Selector},
    scalable::{Scalable, ScalableKind},
};
pub use k8s_openapi::{
    api::{
        self,
        autoscaling::v1::{Scale, ScaleSpec},
        core::v1::{Node, NodeSpec},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference, Time},
};
pub use kube::{
    api::{
        Api, ApiResource, DynamicObject, ObjectMeta, Patch, PatchParams, PostParams, ResourceExt,
    },
    core::ErrorResponse,
    Client, Error,
};

/// The API group CAPI resources are published under unless overridden.
pub const DEFAULT_CAPI_GROUP: &str = "cluster.x-k8s.io";

/// Identifies a namespaced object in the management cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Parses a `namespace/name` locator.
    pub fn parse(key: &str) -> Option<Self> {
        let (namespace, name) = key.split_once('/')?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectKey;

    #[test]
    fn parses_object_keys() {
        assert_eq!(
            ObjectKey::parse("default/m-0"),
            Some(ObjectKey::new("default", "m-0"))
        );
        assert_eq!(ObjectKey::parse("m-0"), None);
        assert_eq!(ObjectKey::parse("/m-0"), None);
        assert_eq!(ObjectKey::parse("default/"), None);
        assert_eq!(ObjectKey::parse("a/b/c"), None);
    }
}
