use super::{field, object_key, InvalidObject};
use crate::{labels::Selector, ObjectKey};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::api::{DynamicObject, ObjectMeta};
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq)]
pub struct MachineSet {
    pub key: ObjectKey,
    pub metadata: ObjectMeta,
    pub spec: MachineSetSpec,
    pub selector: Selector,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    pub cluster_name: Option<String>,
    pub replicas: Option<i32>,
    #[serde(default)]
    pub selector: LabelSelector,
}

impl MachineSet {
    pub const KIND: &'static str = "MachineSet";

    /// The owning MachineDeployment, if any.
    pub fn deployment_owner(&self) -> Option<&OwnerReference> {
        self.metadata
            .owner_references
            .iter()
            .flatten()
            .find(|o| o.kind == super::MachineDeployment::KIND)
    }
}

impl TryFrom<&DynamicObject> for MachineSet {
    type Error = InvalidObject;

    fn try_from(obj: &DynamicObject) -> Result<Self, Self::Error> {
        let key = object_key(Self::KIND, &obj.metadata)?;
        let spec: MachineSetSpec = field(Self::KIND, &key, obj, "spec")?;
        let selector =
            Selector::try_from(&spec.selector).map_err(|source| InvalidObject::Selector {
                kind: Self::KIND,
                key: key.clone(),
                source,
            })?;
        Ok(Self {
            metadata: obj.metadata.clone(),
            key,
            spec,
            selector,
        })
    }
}
