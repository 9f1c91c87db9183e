use super::{field, object_key, InvalidObject};
use crate::{provider_id, ObjectKey};
use kube::api::{DynamicObject, ObjectMeta};
use serde::Deserialize;

/// A MachinePool scales a set of instances directly; its members are listed by provider-id
/// rather than through Machines.
#[derive(Clone, Debug, PartialEq)]
pub struct MachinePool {
    pub key: ObjectKey,
    pub metadata: ObjectMeta,
    pub spec: MachinePoolSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachinePoolSpec {
    pub cluster_name: Option<String>,
    pub replicas: Option<i32>,
    #[serde(rename = "providerIDList", default)]
    pub provider_id_list: Vec<String>,
}

impl MachinePool {
    pub const KIND: &'static str = "MachinePool";

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.spec
            .provider_id_list
            .iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Whether the pool lists an instance with the given normalized provider-id.
    pub fn contains(&self, normalized: &str) -> bool {
        self.provider_ids()
            .any(|id| provider_id::normalize(id) == normalized)
    }
}

impl TryFrom<&DynamicObject> for MachinePool {
    type Error = InvalidObject;

    fn try_from(obj: &DynamicObject) -> Result<Self, Self::Error> {
        let key = object_key(Self::KIND, &obj.metadata)?;
        Ok(Self {
            spec: field(Self::KIND, &key, obj, "spec")?,
            metadata: obj.metadata.clone(),
            key,
        })
    }
}
