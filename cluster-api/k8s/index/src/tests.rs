mod sync;

use crate::{AutoDiscovery, CacheMetrics, Index, Informer, NodeInformer, SharedIndex, SyncWait};
use capi_autoscaler_provider_k8s_api::{
    annotations, DynamicObject, Machine, MachineDeployment, MachinePool, MachineSet, Node,
    NodeSpec, ObjectMeta, OwnerReference,
};
use kubert::index::{IndexClusterResource, IndexNamespacedResource};
use serde_json::json;

struct TestIndex {
    index: SharedIndex,
    machines: Informer<Machine>,
    machine_sets: Informer<MachineSet>,
    machine_deployments: Informer<MachineDeployment>,
    machine_pools: Informer<MachinePool>,
    nodes: NodeInformer,
    _tracing: tracing::subscriber::DefaultGuard,
}

impl TestIndex {
    fn new(discovery: AutoDiscovery) -> Self {
        let _tracing = init_tracing();
        let index = Index::shared(discovery);
        let metrics = CacheMetrics::default();
        let mut sync = SyncWait::default();
        Self {
            machines: Informer::new(index.clone(), metrics.clone(), &mut sync),
            machine_sets: Informer::new(index.clone(), metrics.clone(), &mut sync),
            machine_deployments: Informer::new(index.clone(), metrics.clone(), &mut sync),
            machine_pools: Informer::new(index.clone(), metrics.clone(), &mut sync),
            nodes: NodeInformer::new(index.clone(), metrics, &mut sync),
            index,
            _tracing,
        }
    }

    fn apply(&mut self, obj: DynamicObject) {
        let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        match kind.as_str() {
            Machine::KIND => self.machines.apply(obj),
            MachineSet::KIND => self.machine_sets.apply(obj),
            MachineDeployment::KIND => self.machine_deployments.apply(obj),
            MachinePool::KIND => self.machine_pools.apply(obj),
            kind => panic!("unexpected kind {kind}"),
        }
    }

    fn apply_node(&mut self, node: Node) {
        self.nodes.apply(node);
    }
}

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

fn mk_object(kind: &str, ns: &str, name: &str, data: serde_json::Value) -> DynamicObject {
    DynamicObject {
        types: Some(kube::core::TypeMeta {
            api_version: "cluster.x-k8s.io/v1beta1".to_string(),
            kind: kind.to_string(),
        }),
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        data,
    }
}

fn owned_by(mut obj: DynamicObject, kind: &str, name: &str) -> DynamicObject {
    obj.metadata
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(OwnerReference {
            api_version: "cluster.x-k8s.io/v1beta1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("{name}-uid"),
            controller: Some(true),
            ..Default::default()
        });
    obj
}

fn labeled(
    mut obj: DynamicObject,
    labels: impl IntoIterator<Item = (&'static str, &'static str)>,
) -> DynamicObject {
    obj.metadata
        .labels
        .get_or_insert_with(Default::default)
        .extend(labels.into_iter().map(|(k, v)| (k.to_string(), v.to_string())));
    obj
}

fn annotated(
    mut obj: DynamicObject,
    annotations: impl IntoIterator<Item = (&'static str, &'static str)>,
) -> DynamicObject {
    obj.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .extend(
            annotations
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
    obj
}

fn bounded(obj: DynamicObject, min: &'static str, max: &'static str) -> DynamicObject {
    annotated(
        obj,
        [(annotations::MIN_SIZE, min), (annotations::MAX_SIZE, max)],
    )
}

fn mk_machine_set(ns: &str, name: &str, replicas: i32, pool: &str) -> DynamicObject {
    mk_object(
        MachineSet::KIND,
        ns,
        name,
        json!({
            "spec": {
                "clusterName": "c0",
                "replicas": replicas,
                "selector": { "matchLabels": { "pool": pool } },
            },
        }),
    )
}

fn mk_machine_deployment(ns: &str, name: &str, replicas: i32, pool: &str) -> DynamicObject {
    mk_object(
        MachineDeployment::KIND,
        ns,
        name,
        json!({
            "spec": {
                "clusterName": "c0",
                "replicas": replicas,
                "selector": { "matchLabels": { "pool": pool } },
            },
            "status": {
                "replicas": replicas,
                "updatedReplicas": replicas,
                "availableReplicas": replicas,
            },
        }),
    )
}

fn mk_machine_pool(ns: &str, name: &str, replicas: i32, ids: &[&str]) -> DynamicObject {
    mk_object(
        MachinePool::KIND,
        ns,
        name,
        json!({
            "spec": {
                "clusterName": "c0",
                "replicas": replicas,
                "providerIDList": ids,
            },
        }),
    )
}

fn mk_machine(
    ns: &str,
    name: &str,
    provider_id: Option<&str>,
    pool: &'static str,
) -> DynamicObject {
    labeled(
        mk_object(
            Machine::KIND,
            ns,
            name,
            json!({
                "spec": { "clusterName": "c0", "providerID": provider_id },
            }),
        ),
        [("pool", pool)],
    )
}

fn mk_node(name: &str, provider_id: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(provider_id.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
