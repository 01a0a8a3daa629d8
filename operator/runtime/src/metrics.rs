use prometheus_client::{metrics::counter::Counter, registry::Registry};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub reconciles: Counter,
    pub reconcile_failures: Counter,
    pub status_patches: Counter,
    pub revisions_pruned: Counter,
}

impl Metrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "reconciles",
            "Count of Mesh reconcile attempts",
            metrics.reconciles.clone(),
        );
        prom.register(
            "reconcile_failures",
            "Count of Mesh reconciles that ended in an error",
            metrics.reconcile_failures.clone(),
        );
        prom.register(
            "status_patches",
            "Count of Mesh status updates written",
            metrics.status_patches.clone(),
        );
        prom.register(
            "revisions_pruned",
            "Count of retired revisions deleted",
            metrics.revisions_pruned.clone(),
        );
        metrics
    }
}
