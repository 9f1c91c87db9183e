use crate::{
    core::{CloudProvider, NodeGroup},
    nodegroup::ClusterApiProvider,
};
use std::time::Duration;
use tracing::{info, warn};

/// Logs every published node group each `interval` until shutdown.
pub(crate) async fn report(provider: ClusterApiProvider, interval: Duration, drain: drain::Watch) {
    let shutdown = drain.signaled();
    tokio::pin!(shutdown);
    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            _release = &mut shutdown => return,
        }

        let groups = match provider.node_groups() {
            Ok(groups) => groups,
            Err(error) => {
                warn!(%error, "Failed to list node groups");
                continue;
            }
        };
        info!(count = groups.len(), "Node groups");
        for ng in groups {
            match ng.target_size().await {
                Ok(target_size) => info!(
                    id = %ng.id(),
                    min = ng.min_size(),
                    max = ng.max_size(),
                    target_size,
                    "Node group"
                ),
                Err(error) => warn!(id = %ng.id(), %error, "Failed to read target size"),
            }
        }
    }
}
