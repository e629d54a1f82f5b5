//! Prometheus metrics for the manager

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use metal3_common::Error;

/// Metric handles registered against a single registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Reconcile outcomes per controller ("success", "error", "requeue")
    pub reconciliations: IntCounterVec,
    /// Admission review outcomes per webhook path ("allowed", "denied")
    pub admission_reviews: IntCounterVec,
    /// 1 while this replica holds the leader lease
    pub leader: IntGauge,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register all metric families
    pub fn new() -> Result<Self, Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "capm3_reconciliations_total",
                "Reconcile invocations by controller and outcome",
            ),
            &["controller", "outcome"],
        )
        .map_err(|e| Error::internal("metrics", e.to_string()))?;

        let admission_reviews = IntCounterVec::new(
            Opts::new(
                "capm3_admission_reviews_total",
                "Admission reviews by webhook path and outcome",
            ),
            &["path", "outcome"],
        )
        .map_err(|e| Error::internal("metrics", e.to_string()))?;

        let leader = IntGauge::new(
            "capm3_leader",
            "Whether this replica currently holds the leader lease",
        )
        .map_err(|e| Error::internal("metrics", e.to_string()))?;

        registry
            .register(Box::new(reconciliations.clone()))
            .map_err(|e| Error::internal("metrics", e.to_string()))?;
        registry
            .register(Box::new(admission_reviews.clone()))
            .map_err(|e| Error::internal("metrics", e.to_string()))?;
        registry
            .register(Box::new(leader.clone()))
            .map_err(|e| Error::internal("metrics", e.to_string()))?;

        Ok(Self {
            registry,
            reconciliations,
            admission_reviews,
            leader,
        })
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, Error> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| Error::internal("metrics", e.to_string()))?;
        String::from_utf8(buf).map_err(|e| Error::internal("metrics", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics
            .reconciliations
            .with_label_values(&["Metal3Machine", "success"])
            .inc();
        metrics
            .admission_reviews
            .with_label_values(&["/validate-metal3machine", "denied"])
            .inc();

        let body = metrics.encode().unwrap();
        assert!(body.contains("capm3_reconciliations_total"));
        assert!(body.contains("Metal3Machine"));
        assert!(body.contains("capm3_admission_reviews_total"));
    }
}
