//! Engine instrumentation.
//!
//! Every engine keeps its own [`EngineStats`] so counts stay exact per
//! instance. The same events also feed process-wide prometheus collectors,
//! registered on [`REGISTRY`] and rendered by [`gather_metrics`].

mod stats;
pub use stats::*;


use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;

lazy_static! {
    pub static ref OPS_SUBMITTED: IntCounterVec = IntCounterVec::new(
        Opts::new("ops_submitted", "Operations handed to the engine"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref OPS_BLOCKED: IntCounterVec = IntCounterVec::new(
        Opts::new("ops_blocked", "Driver queue transitions into the blocked state"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref OPS_RETRIED: IntCounterVec = IntCounterVec::new(
        Opts::new("ops_retried", "Operations requeued after a driver asked to retry"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref OPS_ERRORED: IntCounterVec = IntCounterVec::new(
        Opts::new("ops_errored", "Operations completed with a non-success status"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref OP_STAGE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("op_stage_latency_us", "Per-stage operation latency in microseconds")
            .buckets(exponential_buckets(1.0, 2.0, 20).expect("valid buckets")),
        &["kind", "stage"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new_custom(Some("ocf".to_string()), None)
            .expect("registry can be created");
        register_custom_metrics(&registry);
        registry
    };
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(OPS_SUBMITTED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(OPS_BLOCKED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(OPS_RETRIED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(OPS_ERRORED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(OP_STAGE_LATENCY.clone()))
        .expect("collector can be registered");
}

/// Text exposition of every engine collector.
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode engine metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("engine metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
