use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub match_attempts_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub offers_created_total: IntCounter,
    pub offer_transitions_total: IntCounterVec,
    pub reassignments_total: IntCounterVec,
    pub reassignment_queue_depth: IntGauge,
    pub driver_acceptance_rate: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let match_attempts_total = IntCounterVec::new(
            Opts::new("match_attempts_total", "Matching attempts by outcome"),
            &["outcome"],
        )
        .expect("valid match_attempts_total metric");

        let match_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_latency_seconds",
                "Latency of a matching attempt in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let offers_created_total =
            IntCounter::new("offers_created_total", "Assignment offers created")
                .expect("valid offers_created_total metric");

        let offer_transitions_total = IntCounterVec::new(
            Opts::new(
                "offer_transitions_total",
                "Offers leaving the pending state, by terminal status",
            ),
            &["status"],
        )
        .expect("valid offer_transitions_total metric");

        let reassignments_total = IntCounterVec::new(
            Opts::new("reassignments_total", "Processed reassignment items by outcome"),
            &["outcome"],
        )
        .expect("valid reassignments_total metric");

        let reassignment_queue_depth = IntGauge::new(
            "reassignment_queue_depth",
            "Reassignment items waiting to be processed",
        )
        .expect("valid reassignment_queue_depth metric");

        let driver_acceptance_rate = GaugeVec::new(
            Opts::new(
                "driver_acceptance_rate",
                "Weekly offer acceptance rate per driver [0..1]",
            ),
            &["driver_id"],
        )
        .expect("valid driver_acceptance_rate metric");

        registry
            .register(Box::new(match_attempts_total.clone()))
            .expect("register match_attempts_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(offers_created_total.clone()))
            .expect("register offers_created_total");
        registry
            .register(Box::new(offer_transitions_total.clone()))
            .expect("register offer_transitions_total");
        registry
            .register(Box::new(reassignments_total.clone()))
            .expect("register reassignments_total");
        registry
            .register(Box::new(reassignment_queue_depth.clone()))
            .expect("register reassignment_queue_depth");
        registry
            .register(Box::new(driver_acceptance_rate.clone()))
            .expect("register driver_acceptance_rate");

        Self {
            registry,
            match_attempts_total,
            match_latency_seconds,
            offers_created_total,
            offer_transitions_total,
            reassignments_total,
            reassignment_queue_depth,
            driver_acceptance_rate,
        }
    }

    pub fn record_match(&self, outcome: &str, elapsed_secs: f64) {
        self.match_attempts_total
            .with_label_values(&[outcome])
            .inc();
        self.match_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
    }

    pub fn record_transition(&self, status: &str) {
        self.offer_transitions_total
            .with_label_values(&[status])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
