//! Typed projections of the CAPI objects the provider reads.
//!
//! The CAPI group and version are only known after discovery, so objects are watched as
//! [`DynamicObject`]s and projected into these records as they enter the cache. Only the fields
//! the provider consumes are modeled; everything else is ignored.

pub mod machine;
pub mod machine_deployment;
pub mod machine_pool;
pub mod machine_set;

pub use self::{
    machine::{Machine, MachineSpec, MachineStatus},
    machine_deployment::{MachineDeployment, MachineDeploymentSpec, MachineDeploymentStatus},
    machine_pool::{MachinePool, MachinePoolSpec},
    machine_set::{MachineSet, MachineSetSpec},
};
use crate::{labels::InvalidOperator, ObjectKey};
use kube::api::{DynamicObject, ObjectMeta};
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum InvalidObject {
    #[error("{kind} has no namespace")]
    MissingNamespace { kind: &'static str },

    #[error("{kind} has no name")]
    MissingName { kind: &'static str },

    #[error("{kind} {key} has an invalid {field}: {source}")]
    Field {
        kind: &'static str,
        key: ObjectKey,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} {key} has an invalid selector: {source}")]
    Selector {
        kind: &'static str,
        key: ObjectKey,
        #[source]
        source: InvalidOperator,
    },
}

/// Validates an object's metadata and extracts its key.
pub(crate) fn object_key(
    kind: &'static str,
    metadata: &ObjectMeta,
) -> Result<ObjectKey, InvalidObject> {
    let namespace = metadata
        .namespace
        .as_deref()
        .ok_or(InvalidObject::MissingNamespace { kind })?;
    let name = metadata
        .name
        .as_deref()
        .ok_or(InvalidObject::MissingName { kind })?;
    Ok(ObjectKey::new(namespace, name))
}

/// Deserializes a top-level field (`spec`, `status`) of a dynamic object. A missing field
/// yields the type's default.
pub(crate) fn field<T: DeserializeOwned + Default>(
    kind: &'static str,
    key: &ObjectKey,
    obj: &DynamicObject,
    field: &'static str,
) -> Result<T, InvalidObject> {
    match obj.data.get(field) {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => {
            T::deserialize(value).map_err(|source| InvalidObject::Field {
                kind,
                key: key.clone(),
                field,
                source,
            })
        }
    }
}
