use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;

pub struct Metrics {
    predictions_total: Counter<u64>,
    prediction_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        // opentelemetry-prometheus lags the rest of the otel stack; swap it
        // for an OTLP push exporter once a collector is deployed.
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .unwrap();

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("morph_detection");
        global::set_meter_provider(provider);

        let predictions_total = meter
            .u64_counter("predictions_total")
            .with_description("Total number of scored uploads by outcome")
            .build();

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(vec![
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0,
            ])
            .with_description("End-to-end duration of one prediction in milliseconds")
            .build();

        Metrics {
            predictions_total,
            prediction_duration,
            registry,
        }
    }

    pub fn record_prediction(&self, outcome: &str, duration_ms: u64) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.predictions_total.add(1, &attributes);
        self.prediction_duration.record(duration_ms, &attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_predictions_reach_the_registry() {
        let metrics = Metrics::new();
        metrics.record_prediction("scored", 42);

        let families = metrics.registry.gather();
        assert!(families
            .iter()
            .any(|family| family.get_name().contains("predictions_total")));
        assert!(families
            .iter()
            .any(|family| family.get_name().contains("prediction_duration_ms")));
    }
}
