use super::{field, object_key, InvalidObject};
use crate::{labels::Selector, ObjectKey};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{DynamicObject, ObjectMeta};
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq)]
pub struct MachineDeployment {
    pub key: ObjectKey,
    pub metadata: ObjectMeta,
    pub spec: MachineDeploymentSpec,
    pub status: MachineDeploymentStatus,
    pub selector: Selector,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentSpec {
    pub cluster_name: Option<String>,
    pub replicas: Option<i32>,
    #[serde(default)]
    pub selector: LabelSelector,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDeploymentStatus {
    pub replicas: Option<i32>,
    pub updated_replicas: Option<i32>,
    pub available_replicas: Option<i32>,
    pub unavailable_replicas: Option<i32>,
}

impl MachineDeployment {
    pub const KIND: &'static str = "MachineDeployment";

    /// Whether the deployment's status disagrees with its desired replicas, i.e. a template
    /// change is still being rolled out. Unreported status counts are treated as zero.
    pub fn is_rolling_out(&self) -> bool {
        let desired = self.spec.replicas.unwrap_or_default();
        let MachineDeploymentStatus {
            replicas,
            updated_replicas,
            available_replicas,
            unavailable_replicas,
        } = self.status;

        replicas.unwrap_or_default() != desired
            || updated_replicas.unwrap_or_default() < desired
            || available_replicas.unwrap_or_default() < desired
            || unavailable_replicas.unwrap_or_default() > 0
    }
}

impl TryFrom<&DynamicObject> for MachineDeployment {
    type Error = InvalidObject;

    fn try_from(obj: &DynamicObject) -> Result<Self, Self::Error> {
        let key = object_key(Self::KIND, &obj.metadata)?;
        let spec: MachineDeploymentSpec = field(Self::KIND, &key, obj, "spec")?;
        let status = field(Self::KIND, &key, obj, "status")?;
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
            status,
            selector,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capi::tests::mk_dynamic;
    use serde_json::json;

    fn mk_md(status: serde_json::Value) -> MachineDeployment {
        let obj = mk_dynamic(
            "MachineDeployment",
            "default",
            "md",
            json!({
                "spec": { "replicas": 3, "selector": {} },
                "status": status,
            }),
        );
        MachineDeployment::try_from(&obj).expect("machinedeployment must parse")
    }

    #[test]
    fn settled_deployment_is_not_rolling_out() {
        let md = mk_md(json!({
            "replicas": 3,
            "updatedReplicas": 3,
            "readyReplicas": 3,
            "availableReplicas": 3,
            "unavailableReplicas": 0,
        }));
        assert!(!md.is_rolling_out());
    }

    #[test]
    fn rollout_signals() {
        for (status, msg) in [
            (
                json!({ "replicas": 4, "updatedReplicas": 3, "availableReplicas": 3 }),
                "surge replicas",
            ),
            (
                json!({ "replicas": 3, "updatedReplicas": 2, "availableReplicas": 3 }),
                "not all replicas updated",
            ),
            (
                json!({ "replicas": 3, "updatedReplicas": 3, "availableReplicas": 2 }),
                "not all replicas available",
            ),
            (
                json!({
                    "replicas": 3,
                    "updatedReplicas": 3,
                    "availableReplicas": 3,
                    "unavailableReplicas": 1,
                }),
                "unavailable replicas",
            ),
            (json!(null), "no status reported"),
        ] {
            assert!(mk_md(status).is_rolling_out(), "{}", msg);
        }
    }
}
