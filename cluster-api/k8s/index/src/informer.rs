use crate::{metrics::CacheMetrics, Index, SharedIndex};
use capi_autoscaler_provider_k8s_api::{
    DynamicObject, InvalidObject, Machine, MachineDeployment, MachinePool, MachineSet, Node,
    ObjectKey,
};
use kubert::index::{
    ClusterRemoved, IndexClusterResource, IndexNamespacedResource, NamespacedRemoved,
};
use parking_lot::RwLock;
use std::{marker::PhantomData, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, warn};

/// A CAPI kind that may be projected from a dynamic object into the cache.
pub trait Cached: for<'a> TryFrom<&'a DynamicObject, Error = InvalidObject> {
    const KIND: &'static str;

    fn apply(index: &mut Index, obj: Self);

    fn delete(index: &mut Index, key: &ObjectKey);

    fn len(index: &Index) -> usize;
}

/// Feeds watch events for a single CAPI kind into the shared index.
///
/// All CAPI kinds are watched as [`DynamicObject`]s, so each kind gets its own informer type to
/// dispatch on.
pub struct Informer<T> {
    index: SharedIndex,
    metrics: CacheMetrics,
    synced: watch::Sender<bool>,
    _kind: PhantomData<fn(T)>,
}

/// Feeds workload-cluster Node events into the shared index.
pub struct NodeInformer {
    index: SharedIndex,
    metrics: CacheMetrics,
    synced: watch::Sender<bool>,
}

/// Waits for a set of informers to complete their initial sync.
#[derive(Debug, Default)]
pub struct SyncWait(Vec<(&'static str, watch::Receiver<bool>)>);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("timed out waiting for caches to sync: {0:?}")]
    Timeout(Vec<&'static str>),

    #[error("{0} informer stopped before syncing")]
    Closed(&'static str),
}

// === impl Informer ===

impl<T: Cached> Informer<T> {
    pub fn new(index: SharedIndex, metrics: CacheMetrics, sync: &mut SyncWait) -> Self {
        let (synced, rx) = watch::channel(false);
        sync.0.push((T::KIND, rx));
        Self {
            index,
            metrics,
            synced,
            _kind: PhantomData,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn apply_one(index: &mut Index, obj: &DynamicObject) {
        match T::try_from(obj) {
            Ok(obj) => T::apply(index, obj),
            Err(error) => {
                warn!(%error, "Ignoring invalid {}", T::KIND);
                // Drop any previous version so lookups don't act on stale state.
                if let (Some(ns), Some(name)) = (&obj.metadata.namespace, &obj.metadata.name) {
                    T::delete(index, &ObjectKey::new(ns, name));
                }
            }
        }
    }
}

impl<T: Cached> IndexNamespacedResource<DynamicObject> for Informer<T> {
    fn apply(&mut self, obj: DynamicObject) {
        let mut index = self.index.write();
        Self::apply_one(&mut index, &obj);
        self.metrics.applied(T::KIND, T::len(&index));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let mut index = self.index.write();
        T::delete(&mut index, &ObjectKey { namespace, name });
        self.metrics.deleted(T::KIND, T::len(&index));
    }

    fn reset(&mut self, objs: Vec<DynamicObject>, removed: NamespacedRemoved) {
        {
            let mut index = self.index.write();
            for obj in &objs {
                Self::apply_one(&mut index, obj);
            }
            for (namespace, names) in removed {
                for name in names {
                    T::delete(&mut index, &ObjectKey::new(&namespace, name));
                }
            }
            self.metrics.reset(T::KIND, T::len(&index));
        }

        if !*self.synced.borrow() {
            debug!(objects = objs.len(), "{} cache synced", T::KIND);
        }
        self.synced.send_replace(true);
    }
}

// === impl NodeInformer ===

impl NodeInformer {
    const KIND: &'static str = "Node";

    pub fn new(index: SharedIndex, metrics: CacheMetrics, sync: &mut SyncWait) -> Self {
        let (synced, rx) = watch::channel(false);
        sync.0.push((Self::KIND, rx));
        Self {
            index,
            metrics,
            synced,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl IndexClusterResource<Node> for NodeInformer {
    fn apply(&mut self, node: Node) {
        let mut index = self.index.write();
        index.apply_node(node);
        self.metrics.applied(Self::KIND, index.nodes.len());
    }

    fn delete(&mut self, name: String) {
        let mut index = self.index.write();
        index.delete_node(&name);
        self.metrics.deleted(Self::KIND, index.nodes.len());
    }

    fn reset(&mut self, nodes: Vec<Node>, removed: ClusterRemoved) {
        let count = nodes.len();
        {
            let mut index = self.index.write();
            for node in nodes {
                index.apply_node(node);
            }
            for name in removed {
                index.delete_node(&name);
            }
            self.metrics.reset(Self::KIND, index.nodes.len());
        }

        if !*self.synced.borrow() {
            debug!(nodes = count, "Node cache synced");
        }
        self.synced.send_replace(true);
    }
}

// === impl SyncWait ===

impl SyncWait {
    /// Blocks until every registered informer has completed its initial list.
    pub async fn wait(mut self, timeout: Duration) -> Result<(), SyncError> {
        let wait = async {
            for (kind, rx) in self.0.iter_mut() {
                rx.wait_for(|synced| *synced)
                    .await
                    .map_err(|_| SyncError::Closed(*kind))?;
                debug!(%kind, "Synced");
            }
            Ok(())
        };
        if let Ok(res) = tokio::time::timeout(timeout, wait).await {
            return res;
        }

        let pending = self
            .0
            .iter()
            .filter(|(_, rx)| !*rx.borrow())
            .map(|(kind, _)| *kind)
            .collect();
        Err(SyncError::Timeout(pending))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// === impl Cached ===

impl Cached for Machine {
    const KIND: &'static str = Machine::KIND;

    fn apply(index: &mut Index, obj: Self) {
        index.apply_machine(obj)
    }

    fn delete(index: &mut Index, key: &ObjectKey) {
        index.delete_machine(key)
    }

    fn len(index: &Index) -> usize {
        index.machines.len()
    }
}

impl Cached for MachineSet {
    const KIND: &'static str = MachineSet::KIND;

    fn apply(index: &mut Index, obj: Self) {
        index.apply_machine_set(obj)
    }

    fn delete(index: &mut Index, key: &ObjectKey) {
        index.delete_machine_set(key)
    }

    fn len(index: &Index) -> usize {
        index.machine_sets.len()
    }
}

impl Cached for MachineDeployment {
    const KIND: &'static str = MachineDeployment::KIND;

    fn apply(index: &mut Index, obj: Self) {
        index.apply_machine_deployment(obj)
    }

    fn delete(index: &mut Index, key: &ObjectKey) {
        index.delete_machine_deployment(key)
    }

    fn len(index: &Index) -> usize {
        index.machine_deployments.len()
    }
}

impl Cached for MachinePool {
    const KIND: &'static str = MachinePool::KIND;

    fn apply(index: &mut Index, obj: Self) {
        index.apply_machine_pool(obj)
    }

    fn delete(index: &mut Index, key: &ObjectKey) {
        index.delete_machine_pool(key)
    }

    fn len(index: &Index) -> usize {
        index.machine_pools.len()
    }
}
