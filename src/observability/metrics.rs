use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub trip_matches_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub drivers_online: IntGauge,
    pub trips_created_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let trip_matches_total = IntCounterVec::new(
            Opts::new("trip_matches_total", "Trip matching attempts by outcome"),
            &["outcome"],
        )
        .expect("valid trip_matches_total metric");

        let match_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "match_latency_seconds",
                "Latency of trip matching in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let drivers_online = IntGauge::new("drivers_online", "Drivers currently online")
            .expect("valid drivers_online metric");

        let trips_created_total =
            IntCounter::new("trips_created_total", "Trips announced to dispatch")
                .expect("valid trips_created_total metric");

        registry
            .register(Box::new(trip_matches_total.clone()))
            .expect("register trip_matches_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(drivers_online.clone()))
            .expect("register drivers_online");
        registry
            .register(Box::new(trips_created_total.clone()))
            .expect("register trips_created_total");

        Self {
            registry,
            trip_matches_total,
            match_latency_seconds,
            drivers_online,
            trips_created_total,
        }
    }

    pub fn record_match(&self, outcome: &str, elapsed_secs: f64) {
        self.match_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
        self.trip_matches_total.with_label_values(&[outcome]).inc();
    }

    pub fn matches(&self, outcome: &str) -> u64 {
        self.trip_matches_total.with_label_values(&[outcome]).get()
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
