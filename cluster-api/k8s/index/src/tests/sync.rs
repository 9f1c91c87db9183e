use super::*;
use crate::SyncError;
use capi_autoscaler_provider_k8s_api::ObjectKey;
use kube::runtime::watcher;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[tokio::test(flavor = "current_thread")]
async fn informers_sync_from_watch_streams() {
    let _tracing = init_tracing();
    let index = Index::shared(AutoDiscovery::default());
    let metrics = CacheMetrics::default();
    let mut sync = SyncWait::default();

    let machines = Informer::<Machine>::new(index.clone(), metrics.clone(), &mut sync).shared();
    let nodes = NodeInformer::new(index.clone(), metrics, &mut sync).shared();
    assert_eq!(sync.len(), 2);

    let (machines_tx, machines_rx) = mpsc::unbounded_channel();
    let (nodes_tx, nodes_rx) = mpsc::unbounded_channel();
    tokio::spawn(kubert::index::namespaced(
        machines,
        UnboundedReceiverStream::new(machines_rx),
    ));
    tokio::spawn(kubert::index::cluster(
        nodes,
        UnboundedReceiverStream::new(nodes_rx),
    ));

    machines_tx
        .send(watcher::Event::Init)
        .expect("watch must be open");
    machines_tx
        .send(watcher::Event::InitApply(mk_machine(
            "default",
            "m0",
            Some("aws:///i-0"),
            "a",
        )))
        .expect("watch must be open");
    machines_tx
        .send(watcher::Event::InitDone)
        .expect("watch must be open");
    nodes_tx
        .send(watcher::Event::Init)
        .expect("watch must be open");
    nodes_tx
        .send(watcher::Event::InitApply(mk_node("n0", "aws:///i-0")))
        .expect("watch must be open");
    nodes_tx
        .send(watcher::Event::InitDone)
        .expect("watch must be open");

    sync.wait(Duration::from_secs(10))
        .await
        .expect("caches must sync");

    let index = index.read();
    assert!(index.machine(&ObjectKey::new("default", "m0")).is_some());
    assert!(index.node("n0").is_some());
    let machine = index
        .find_machine_for_node(&mk_node("n0", "aws:///i-0"))
        .expect("lookup must not fail")
        .expect("machine must be found");
    assert_eq!(machine.key, ObjectKey::new("default", "m0"));
}

#[tokio::test(flavor = "current_thread")]
async fn relist_removes_stale_objects() {
    let _tracing = init_tracing();
    let index = Index::shared(AutoDiscovery::default());
    let mut sync = SyncWait::default();
    let sets = Informer::<MachineSet>::new(index.clone(), CacheMetrics::default(), &mut sync)
        .shared();

    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(kubert::index::namespaced(
        sets,
        UnboundedReceiverStream::new(rx),
    ));
    for event in [
        watcher::Event::Init,
        watcher::Event::InitApply(mk_machine_set("default", "ms-0", 1, "a")),
        watcher::Event::InitApply(mk_machine_set("default", "ms-1", 1, "b")),
        watcher::Event::InitDone,
        // A relist that no longer includes ms-0.
        watcher::Event::Init,
        watcher::Event::InitApply(mk_machine_set("default", "ms-1", 1, "b")),
        watcher::Event::InitDone,
    ] {
        tx.send(event).expect("watch must be open");
    }
    drop(tx);
    task.await.expect("index task must complete");
    sync.wait(Duration::from_secs(1))
        .await
        .expect("caches must sync");

    let index = index.read();
    assert!(index
        .machine_set(&ObjectKey::new("default", "ms-0"))
        .is_none());
    assert!(index
        .machine_set(&ObjectKey::new("default", "ms-1"))
        .is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn sync_times_out() {
    let index = Index::shared(AutoDiscovery::default());
    let mut sync = SyncWait::default();
    let _machines = Informer::<Machine>::new(index, CacheMetrics::default(), &mut sync);
    match sync.wait(Duration::from_millis(10)).await {
        Err(SyncError::Timeout(pending)) => assert_eq!(pending, vec!["Machine"]),
        res => panic!("unexpected result: {res:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn sync_fails_when_informer_is_dropped() {
    let index = Index::shared(AutoDiscovery::default());
    let mut sync = SyncWait::default();
    drop(Informer::<MachinePool>::new(
        index,
        CacheMetrics::default(),
        &mut sync,
    ));
    assert!(matches!(
        sync.wait(Duration::from_secs(1)).await,
        Err(SyncError::Closed("MachinePool"))
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn sync_timeout_reports_only_unsynced_informers() {
    let _tracing = init_tracing();
    let index = Index::shared(AutoDiscovery::default());
    let metrics = CacheMetrics::default();
    let mut sync = SyncWait::default();
    let _machines = Informer::<Machine>::new(index.clone(), metrics.clone(), &mut sync);
    let nodes = NodeInformer::new(index, metrics, &mut sync).shared();

    // The node index only runs once the wait yields, so Nodes sync while it is pending.
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(kubert::index::cluster(
        nodes,
        UnboundedReceiverStream::new(rx),
    ));
    for event in [watcher::Event::Init, watcher::Event::InitDone] {
        tx.send(event).expect("watch must be open");
    }

    match sync.wait(Duration::from_millis(50)).await {
        Err(SyncError::Timeout(pending)) => assert_eq!(pending, vec!["Machine"]),
        res => panic!("unexpected result: {res:?}"),
    }
}
