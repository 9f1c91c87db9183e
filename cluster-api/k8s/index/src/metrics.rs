use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Cache activity, labeled by the kind of object observed.
#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    size: Family<KindLabels, Gauge>,
    applies: Family<KindLabels, Counter>,
    deletes: Family<KindLabels, Counter>,
    resets: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: &'static str,
}

impl CacheMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "cache_size",
            "Gauge of the number of objects in the cache",
            metrics.size.clone(),
        );
        prom.register(
            "cache_applies",
            "Count of applies to the cache",
            metrics.applies.clone(),
        );
        prom.register(
            "cache_deletes",
            "Count of deletes from the cache",
            metrics.deletes.clone(),
        );
        prom.register(
            "cache_resets",
            "Count of resets of the cache",
            metrics.resets.clone(),
        );
        metrics
    }

    pub(crate) fn applied(&self, kind: &'static str, size: usize) {
        self.applies.get_or_create(&KindLabels { kind }).inc();
        self.set_size(kind, size);
    }

    pub(crate) fn deleted(&self, kind: &'static str, size: usize) {
        self.deletes.get_or_create(&KindLabels { kind }).inc();
        self.set_size(kind, size);
    }

    pub(crate) fn reset(&self, kind: &'static str, size: usize) {
        self.resets.get_or_create(&KindLabels { kind }).inc();
        self.set_size(kind, size);
    }

    fn set_size(&self, kind: &'static str, size: usize) {
        self.size.get_or_create(&KindLabels { kind }).set(size as i64);
    }
}
