use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_rounds_total: IntCounterVec,
    pub assignments_created_total: IntCounter,
    pub assignment_responses_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_rounds_total = IntCounterVec::new(
            Opts::new("dispatch_rounds_total", "Dispatch rounds by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("valid dispatch_rounds_total metric");

        let assignments_created_total = IntCounter::new(
            "assignments_created_total",
            "Total assignments offered to contractors",
        )
        .expect("valid assignments_created_total metric");

        let assignment_responses_total = IntCounterVec::new(
            Opts::new(
                "assignment_responses_total",
                "Assignments leaving the sent state, by decision",
            ),
            &["decision"],
        )
        .expect("valid assignment_responses_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of candidate selection plus assignment creation in seconds",
            ),
            &["kind"],
        )
        .expect("valid dispatch_latency_seconds metric");

        registry
            .register(Box::new(dispatch_rounds_total.clone()))
            .expect("register dispatch_rounds_total");
        registry
            .register(Box::new(assignments_created_total.clone()))
            .expect("register assignments_created_total");
        registry
            .register(Box::new(assignment_responses_total.clone()))
            .expect("register assignment_responses_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");

        Self {
            registry,
            dispatch_rounds_total,
            assignments_created_total,
            assignment_responses_total,
            dispatch_latency_seconds,
        }
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
