use crate::{
    index::{
        AutoDiscovery, CacheMetrics, DiscoverySpec, Index, Informer, NodeInformer, SyncWait,
    },
    k8s::{
        self, duration, Api, ApiResource, CapiResources, Client, DynamicObject, Machine,
        MachineDeployment, MachinePool, MachineSet, Node,
    },
    nodegroup::{ClusterApiProvider, Controller, KubeManagementClient},
    status,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::{watcher, WatchStreamExt};
use prometheus_client::registry::Registry;
use std::{fmt::Debug, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "capi-autoscaler-provider",
    about = "Cluster API node groups for the cluster autoscaler"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "capi_autoscaler=info,warn",
        env = "CAPI_AUTOSCALER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The API group CAPI resources are discovered under.
    #[clap(long, env = "CAPI_GROUP", default_value = k8s::DEFAULT_CAPI_GROUP)]
    capi_group: String,

    /// A kubeconfig for the workload cluster.
    ///
    /// When unset, Nodes are read from the management cluster.
    #[clap(long)]
    workload_kubeconfig: Option<PathBuf>,

    /// Restricts CAPI watches to a single namespace.
    #[clap(long)]
    namespace: Option<String>,

    /// Limits node groups to the scalable resources matching a spec, e.g.
    /// `clusterapi:namespace=default,clusterName=c0,pool=a`. May be repeated.
    #[clap(long = "node-group-auto-discovery")]
    node_group_auto_discovery: Vec<DiscoverySpec>,

    #[clap(long, default_value = "60s", value_parser = duration::parse)]
    cache_sync_timeout: Duration,

    #[clap(long, default_value = "60s", value_parser = duration::parse)]
    status_interval: Duration,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            capi_group,
            workload_kubeconfig,
            namespace,
            node_group_auto_discovery,
            cache_sync_timeout,
            status_interval,
        } = self;

        let discovery = node_group_auto_discovery
            .into_iter()
            .collect::<AutoDiscovery>();

        let mut prom = <Registry>::default();
        let cache_metrics = CacheMetrics::register(prom.sub_registry_with_prefix("cache"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let management = runtime.client();
        let resources = CapiResources::discover(&management, &capi_group).await?;
        info!(group_version = %resources.group_version(), "Discovered CAPI resources");
        let workload = match workload_kubeconfig {
            Some(path) => workload_client(path).await?,
            None => management.clone(),
        };

        let index = Index::shared(discovery);
        let mut sync = SyncWait::default();
        let ns = namespace.as_deref();

        // Spawn resource watches.

        let machines = Informer::<Machine>::new(index.clone(), cache_metrics.clone(), &mut sync);
        tokio::spawn(
            kubert::index::namespaced(
                machines.shared(),
                watch(capi_api(&management, &resources.machines, ns)),
            )
            .instrument(info_span!("machines")),
        );

        let machine_sets =
            Informer::<MachineSet>::new(index.clone(), cache_metrics.clone(), &mut sync);
        tokio::spawn(
            kubert::index::namespaced(
                machine_sets.shared(),
                watch(capi_api(&management, &resources.machine_sets, ns)),
            )
            .instrument(info_span!("machinesets")),
        );

        if let Some(resource) = &resources.machine_deployments {
            let machine_deployments =
                Informer::<MachineDeployment>::new(index.clone(), cache_metrics.clone(), &mut sync);
            tokio::spawn(
                kubert::index::namespaced(
                    machine_deployments.shared(),
                    watch(capi_api(&management, resource, ns)),
                )
                .instrument(info_span!("machinedeployments")),
            );
        }

        if let Some(resource) = &resources.machine_pools {
            let machine_pools =
                Informer::<MachinePool>::new(index.clone(), cache_metrics.clone(), &mut sync);
            tokio::spawn(
                kubert::index::namespaced(
                    machine_pools.shared(),
                    watch(capi_api(&management, resource, ns)),
                )
                .instrument(info_span!("machinepools")),
            );
        }

        let nodes = NodeInformer::new(index.clone(), cache_metrics, &mut sync);
        tokio::spawn(
            kubert::index::cluster(nodes.shared(), watch(Api::<Node>::all(workload)))
                .instrument(info_span!("nodes")),
        );

        info!(informers = sync.len(), timeout = ?cache_sync_timeout, "Waiting for caches to sync");
        sync.wait(cache_sync_timeout)
            .await
            .context("failed to sync caches")?;
        info!("Caches synced");

        let client = KubeManagementClient::new(management, resources);
        let controller = Controller::new(index, Arc::new(client));
        let provider = ClusterApiProvider::new(controller);

        tokio::spawn(
            status::report(provider, status_interval, runtime.shutdown_handle())
                .instrument(info_span!("status")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background
        // tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

async fn workload_client(path: PathBuf) -> Result<Client> {
    let kubeconfig = kube::config::Kubeconfig::read_from(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let options = kube::config::KubeConfigOptions::default();
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
    info!(cluster_url = %config.cluster_url, "Using workload cluster");
    Ok(Client::try_from(config)?)
}

fn capi_api(
    client: &Client,
    resource: &ApiResource,
    namespace: Option<&str>,
) -> Api<DynamicObject> {
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, resource),
        None => Api::all_with(client.clone(), resource),
    }
}

/// Watches all objects in `api`, logging and dropping watch errors. The watch is retried with
/// backoff.
fn watch<T>(api: Api<T>) -> impl Stream<Item = watcher::Event<T>> + Send + 'static
where
    T: kube::Resource + Clone + Debug + serde::de::DeserializeOwned + Send + 'static,
{
    watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(|res| async move {
            match res {
                Ok(event) => Some(event),
                Err(error) => {
                    info!(%error, "Watch failed");
                    None
                }
            }
        })
}
