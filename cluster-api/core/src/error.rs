use capi_autoscaler_provider_k8s_api::{
    annotations::OptionError, DiscoveryError, InvalidObject, ObjectKey,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Any API server failure other than a missing object, surfaced verbatim.
    #[error(transparent)]
    Client(#[from] kube::Error),

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("size increase must be positive, got {0}")]
    SizeIncreaseNotPositive(i32),

    #[error("size increase too large - desired:{desired} max:{max}")]
    SizeIncreaseTooLarge { desired: i64, max: i32 },

    #[error("size decrease must be negative, got {0}")]
    SizeDecreaseNotNegative(i32),

    #[error(
        "attempt to delete existing nodes targetSize:{size} delta:{delta} existingNodes: {existing}"
    )]
    SizeDecreaseTooLarge {
        size: i32,
        delta: i32,
        existing: usize,
    },

    #[error("size {size} is outside of bounds [{min}, {max}]")]
    SizeOutOfBounds { size: i32, min: i32, max: i32 },

    #[error("{id}: min size reached ({min}), nodes will not be deleted")]
    MinSizeReached { id: String, min: i32 },

    #[error("unable to delete {count} machines in {id}, machine replicas are {size}, minSize is {min}")]
    BelowMinSize {
        id: String,
        count: usize,
        size: i32,
        min: i32,
    },

    #[error("node {node:?} belongs to node group {actual:?}, not {expected:?}")]
    NodeGroupMismatch {
        node: String,
        expected: String,
        actual: String,
    },

    #[error("node {0:?} does not belong to any node group")]
    NoNodeGroup(String),

    #[error("unknown machine for node {0:?}")]
    UnknownMachine(String),

    #[error("provider-id {provider_id:?} is claimed by multiple machines: {machines:?}")]
    AmbiguousProviderId {
        provider_id: String,
        machines: Vec<String>,
    },

    #[error("not implemented")]
    NotImplemented,

    #[error(transparent)]
    InvalidObject(#[from] InvalidObject),

    #[error(transparent)]
    InvalidOption(#[from] OptionError),
}

impl Error {
    /// Maps an API error on a named object, turning 404s into [`Error::NotFound`].
    pub fn api<'a>(kind: &'static str, key: &'a ObjectKey) -> impl FnOnce(kube::Error) -> Self + 'a {
        move |error| match error {
            kube::Error::Api(ref rsp) if rsp.code == 404 => Self::NotFound {
                kind,
                key: key.clone(),
            },
            error => Self::Client(error),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_semantic_errors() {
        assert_eq!(
            Error::SizeIncreaseTooLarge { desired: 6, max: 5 }.to_string(),
            "size increase too large - desired:6 max:5"
        );
        assert_eq!(
            Error::SizeDecreaseTooLarge {
                size: 3,
                delta: -2,
                existing: 2
            }
            .to_string(),
            "attempt to delete existing nodes targetSize:3 delta:-2 existingNodes: 2"
        );
        assert!(Error::NotFound {
            kind: "MachineSet",
            key: ObjectKey::new("default", "ms"),
        }
        .is_not_found());
    }
}
