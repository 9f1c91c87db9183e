use crate::{
    annotations::{
        self, Annotations, Bounds, BoundsError, CLUSTER_NAME_LABEL, CLUSTER_NAME_LABEL_DEPRECATED,
    },
    capi::{MachineDeployment, MachinePool, MachineSet},
    labels::{Labels, Selector},
    ObjectKey,
};
use std::fmt;

/// The kinds of objects that may be resized through the scale subresource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalableKind {
    MachineSet,
    MachineDeployment,
    MachinePool,
}

/// A snapshot of a scalable object taken from the cache.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalable {
    MachineSet(MachineSet),
    MachineDeployment(MachineDeployment),
    MachinePool(MachinePool),
}

// === impl ScalableKind ===

impl ScalableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MachineSet => MachineSet::KIND,
            Self::MachineDeployment => MachineDeployment::KIND,
            Self::MachinePool => MachinePool::KIND,
        }
    }
}

impl fmt::Display for ScalableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Scalable ===

impl Scalable {
    pub fn kind(&self) -> ScalableKind {
        match self {
            Self::MachineSet(_) => ScalableKind::MachineSet,
            Self::MachineDeployment(_) => ScalableKind::MachineDeployment,
            Self::MachinePool(_) => ScalableKind::MachinePool,
        }
    }

    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::MachineSet(ms) => &ms.key,
            Self::MachineDeployment(md) => &md.key,
            Self::MachinePool(mp) => &mp.key,
        }
    }

    /// The node-group identity: `<Kind>/<namespace>/<name>`.
    pub fn id(&self) -> String {
        let key = self.key();
        format!("{}/{}/{}", self.kind(), key.namespace, key.name)
    }

    pub fn namespace(&self) -> &str {
        &self.key().namespace
    }

    pub fn name(&self) -> &str {
        &self.key().name
    }

    fn metadata(&self) -> &kube::api::ObjectMeta {
        match self {
            Self::MachineSet(ms) => &ms.metadata,
            Self::MachineDeployment(md) => &md.metadata,
            Self::MachinePool(mp) => &mp.metadata,
        }
    }

    pub fn annotations(&self) -> &Annotations {
        static EMPTY: Annotations = Annotations::new();
        self.metadata().annotations.as_ref().unwrap_or(&EMPTY)
    }

    pub fn labels(&self) -> Labels {
        self.metadata().labels.clone().into()
    }

    /// The cluster this resource belongs to, from `spec.clusterName` or the cluster-name label.
    pub fn cluster_name(&self) -> Option<&str> {
        let spec = match self {
            Self::MachineSet(ms) => ms.spec.cluster_name.as_deref(),
            Self::MachineDeployment(md) => md.spec.cluster_name.as_deref(),
            Self::MachinePool(mp) => mp.spec.cluster_name.as_deref(),
        };
        spec.filter(|n| !n.is_empty()).or_else(|| {
            annotations::get(
                self.metadata().labels.as_ref()?,
                CLUSTER_NAME_LABEL,
                CLUSTER_NAME_LABEL_DEPRECATED,
            )
            .map(|(_, v)| v)
        })
    }

    /// The replica count as last observed by the cache.
    pub fn cached_replicas(&self) -> i32 {
        match self {
            Self::MachineSet(ms) => ms.spec.replicas,
            Self::MachineDeployment(md) => md.spec.replicas,
            Self::MachinePool(mp) => mp.spec.replicas,
        }
        .unwrap_or_default()
    }

    /// The selector over Machines. MachinePools do not select Machines.
    pub fn selector(&self) -> Option<&Selector> {
        match self {
            Self::MachineSet(ms) => Some(&ms.selector),
            Self::MachineDeployment(md) => Some(&md.selector),
            Self::MachinePool(_) => None,
        }
    }

    pub fn bounds(&self) -> Result<Option<Bounds>, BoundsError> {
        annotations::parse_bounds(self.annotations())
    }

    pub fn is_machine_deployment_and_rolling_out(&self) -> bool {
        match self {
            Self::MachineDeployment(md) => md.is_rolling_out(),
            Self::MachineSet(_) | Self::MachinePool(_) => false,
        }
    }
}

impl From<MachineSet> for Scalable {
    fn from(ms: MachineSet) -> Self {
        Self::MachineSet(ms)
    }
}

impl From<MachineDeployment> for Scalable {
    fn from(md: MachineDeployment) -> Self {
        Self::MachineDeployment(md)
    }
}

impl From<MachinePool> for Scalable {
    fn from(mp: MachinePool) -> Self {
        Self::MachinePool(mp)
    }
}
