use super::{field, object_key, InvalidObject};
use crate::{annotations, labels::Labels, ObjectKey};
use k8s_openapi::{
    api::core::v1::ObjectReference, apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::api::{DynamicObject, ObjectMeta};
use serde::Deserialize;

/// A Machine backs at most one workload Node.
#[derive(Clone, Debug, PartialEq)]
pub struct Machine {
    pub key: ObjectKey,
    pub metadata: ObjectMeta,
    pub spec: MachineSpec,
    pub status: MachineStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    pub cluster_name: Option<String>,

    /// Unset while the infrastructure is still provisioning.
    #[serde(rename = "providerID")]
    pub provider_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    pub node_ref: Option<ObjectReference>,
    pub failure_message: Option<String>,
}

impl Machine {
    pub const KIND: &'static str = "Machine";

    /// The provider-id, if one has been assigned.
    pub fn provider_id(&self) -> Option<&str> {
        self.spec.provider_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.status.failure_message.as_deref()
    }

    /// The name of the workload Node this Machine is linked to.
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .node_ref
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// Whether the host platform has begun deleting this Machine.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .map(annotations::is_marked_for_deletion)
            .unwrap_or(false)
    }

    pub fn labels(&self) -> Labels {
        self.metadata.labels.clone().into()
    }

    /// The first owner reference of the given kind.
    pub fn owner(&self, kind: &str) -> Option<&OwnerReference> {
        self.metadata
            .owner_references
            .iter()
            .flatten()
            .find(|o| o.kind == kind)
    }
}

impl TryFrom<&DynamicObject> for Machine {
    type Error = InvalidObject;

    fn try_from(obj: &DynamicObject) -> Result<Self, Self::Error> {
        let key = object_key(Self::KIND, &obj.metadata)?;
        Ok(Self {
            spec: field(Self::KIND, &key, obj, "spec")?,
            status: field(Self::KIND, &key, obj, "status")?,
            metadata: obj.metadata.clone(),
            key,
        })
    }
}
