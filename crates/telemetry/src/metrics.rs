use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref LPR_RECOGNITIONS_TOTAL: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "lpr_recognitions_total",
                "Total number of plate recognition calls by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_STAGE_DURATION_SECONDS: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "lpr_stage_duration_seconds",
                "Duration of each recognition pipeline stage",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_MODELS_READY: IntGauge = {
        let metric = IntGauge::new(
            "lpr_models_ready",
            "Whether detector and recognizer models are loaded (1=ready, 0=loading)",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref LPR_MODEL_LOAD_DURATION_SECONDS: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "lpr_model_load_duration_seconds",
                "Time spent loading detector, recognizer and charset",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Record the time elapsed since `started` for a pipeline stage
pub fn observe_stage(stage: &str, started: Instant) {
    LPR_STAGE_DURATION_SECONDS
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64());
}

/// Count a finished recognition call
pub fn record_outcome(outcome: &str) {
    LPR_RECOGNITIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counter() {
        let before = LPR_RECOGNITIONS_TOTAL
            .with_label_values(&["metrics_test"])
            .get();
        record_outcome("metrics_test");
        assert_eq!(
            LPR_RECOGNITIONS_TOTAL
                .with_label_values(&["metrics_test"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn test_stage_histogram() {
        observe_stage("metrics_test_stage", Instant::now());
        assert!(
            LPR_STAGE_DURATION_SECONDS
                .with_label_values(&["metrics_test_stage"])
                .get_sample_count()
                >= 1
        );
    }

    #[test]
    fn test_encode_metrics_contains_lpr_families() {
        record_outcome("encode_test");
        LPR_MODELS_READY.set(0);
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("lpr_recognitions_total"));
        assert!(encoded.contains("lpr_models_ready"));
    }
}
